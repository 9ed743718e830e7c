//! Polling scheduler
//!
//! A single continuously-running loop per worker process: claim the
//! least-recently-updated pending lead, run the orchestrator to completion,
//! repeat. No external trigger is required; the `status = 'new'` row is
//! itself the queue entry. The claim (select then update) is not atomic, so
//! two workers can race onto the same lead; the orchestrator is idempotent
//! and duplicate scoring is tolerated.

use crate::config::{Config, ScenarioBinsConfig, ScoreConfig, ScoringMode};
use crate::enrich::score_and_persist_lead;
use crate::errors::ResultExt;
use crate::fetcher::Fetcher;
use crate::models::ZipGeo;
use crate::offers::OffersConfig;
use crate::storage::LeadStore;
use moka::future::Cache;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Everything the orchestrator needs, built once at startup. Configuration
/// is immutable for the process lifetime; a change requires a restart.
pub struct WorkerState {
    pub db: PgPool,
    pub config: Config,
    pub mode: ScoringMode,
    pub bins: ScenarioBinsConfig,
    pub score_config: ScoreConfig,
    pub offers: OffersConfig,
    pub fetcher: Arc<Fetcher>,
    pub geo_front_cache: Cache<String, Option<ZipGeo>>,
    pub holiday_cache: Cache<String, String>,
}

/// Runs forever. A failing lead backs the loop off and leaves the lead in
/// `processing`, where the pending query re-claims it on a later cycle —
/// at-least-once retry with no explicit lease mechanism.
pub async fn run_loop(state: Arc<WorkerState>) {
    let idle = Duration::from_millis(state.config.poll_idle_ms);
    let backoff = Duration::from_millis(state.config.error_backoff_ms);

    tracing::info!("Worker started (mode: {:?})", state.mode);
    loop {
        match tick(&state).await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(idle).await,
            Err(e) => {
                tracing::error!("Worker iteration failed: {}", e);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// One scheduler cycle. Returns `Ok(true)` when a lead was processed,
/// `Ok(false)` when the queue was empty.
async fn tick(state: &WorkerState) -> Result<bool, crate::errors::AppError> {
    let store = LeadStore::new(state.db.clone());

    let Some(lead_id) = store.next_pending_lead().await? else {
        return Ok(false);
    };

    store
        .claim_lead(&lead_id)
        .await
        .with_context(|| format!("claiming lead {}", lead_id))?;
    score_and_persist_lead(state, &lead_id).await?;
    Ok(true)
}
