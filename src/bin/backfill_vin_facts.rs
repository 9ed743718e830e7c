//! Utility to warm the vehicle-facts cache for VINs that have no decoded
//! row yet, 50 per provider call.
//!
//! Reads VINs from the command line, or from every lead in the database
//! when none are given.

use dealer_stressor::config::Config;
use dealer_stressor::fetcher::Fetcher;
use dealer_stressor::providers::VpicService;
use dealer_stressor::resolvers::backfill_vehicle_facts;
use dealer_stressor::storage::LeadStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;

    let mut vins: Vec<String> = std::env::args().skip(1).collect();
    if vins.is_empty() {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT vin FROM leads")
            .fetch_all(&pool)
            .await?;
        vins = rows.into_iter().map(|r| r.0).collect();
    }
    println!("Backfilling vehicle facts for {} VIN(s)", vins.len());

    let fetcher = Arc::new(Fetcher::new(config.provider_rps, config.retry_base_ms)?);
    let vpic = VpicService::new(&config, fetcher);
    let store = LeadStore::new(pool);

    let stored = backfill_vehicle_facts(&store, &vpic, &vins).await?;
    println!("Stored {} decoded VIN(s)", stored);

    Ok(())
}
