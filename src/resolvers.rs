use crate::errors::AppError;
use crate::models::{RecallSummary, VehicleFacts, ZipGeo};
use crate::providers::{GeocoderService, NoaaService, RecallService, VpicService};
use crate::storage::LeadStore;
use crate::vin::mask_vin;
use moka::future::Cache;

/// Cache-or-fetch resolvers
///
/// Each resolver follows the same protocol: read the durable cache row,
/// return it on hit without any network call, otherwise fetch through the
/// rate-limited fetcher, upsert the full row in one statement, and return
/// the fresh value. Fetch failures propagate to the caller, which treats
/// each attribute as independently best-effort.

/// Postal code -> lat/lon/state, with an in-process moka layer in front of
/// the durable `zip_geo` row.
pub struct GeoResolver<'a> {
    store: &'a LeadStore,
    geocoder: &'a GeocoderService,
    front_cache: &'a Cache<String, Option<ZipGeo>>,
}

impl<'a> GeoResolver<'a> {
    pub fn new(
        store: &'a LeadStore,
        geocoder: &'a GeocoderService,
        front_cache: &'a Cache<String, Option<ZipGeo>>,
    ) -> Self {
        Self {
            store,
            geocoder,
            front_cache,
        }
    }

    pub async fn resolve(&self, zip: &str) -> Result<Option<ZipGeo>, AppError> {
        // 1. In-process cache
        if let Some(cached) = self.front_cache.get(zip).await {
            return Ok(cached);
        }

        // 2. Durable cache
        if let Some(row) = self.store.get_zip_geo(zip).await? {
            self.front_cache
                .insert(zip.to_string(), Some(row.clone()))
                .await;
            return Ok(Some(row));
        }

        // 3. Provider fetch + upsert
        let geo = self.geocoder.geocode_zip(zip).await?;
        if let Some(ref geo) = geo {
            self.store.upsert_zip_geo(geo).await?;
        }
        self.front_cache.insert(zip.to_string(), geo.clone()).await;
        Ok(geo)
    }
}

/// VIN -> decoded model year/make/model, fingerprinted on every write.
pub struct VehicleFactsResolver<'a> {
    store: &'a LeadStore,
    vpic: &'a VpicService,
}

impl<'a> VehicleFactsResolver<'a> {
    pub fn new(store: &'a LeadStore, vpic: &'a VpicService) -> Self {
        Self { store, vpic }
    }

    pub async fn resolve(&self, vin: &str) -> Result<VehicleFacts, AppError> {
        if let Some(row) = self.store.get_vehicle_facts(vin).await? {
            return Ok(row);
        }

        let decoded = self.vpic.decode_vin(vin).await?;
        let facts = self
            .store
            .upsert_vehicle_facts(
                vin,
                decoded.model_year,
                decoded.make.as_deref(),
                decoded.model.as_deref(),
                &decoded.raw,
            )
            .await?;
        Ok(facts)
    }
}

/// VIN -> open recall summary. Only consulted when the recall subsystem is
/// enabled; the orchestrator passes `None` context otherwise.
pub struct RecallResolver<'a> {
    store: &'a LeadStore,
    recalls: &'a RecallService,
}

impl<'a> RecallResolver<'a> {
    pub fn new(store: &'a LeadStore, recalls: &'a RecallService) -> Self {
        Self { store, recalls }
    }

    pub async fn resolve(&self, vin: &str) -> Result<RecallSummary, AppError> {
        if let Some(row) = self.store.get_recall_summary(vin).await? {
            return Ok(row);
        }

        let lookup = self.recalls.recalls_by_vin(vin).await?;
        self.store
            .upsert_recall_summary(vin, lookup.open_recall_count, &lookup.raw)
            .await?;
        Ok(RecallSummary {
            vin: vin.to_string(),
            open_recall_count: lookup.open_recall_count,
            recalls_json: lookup.raw,
        })
    }
}

/// Geo-bucket key -> NOAA station id. Fully best-effort; absence never
/// blocks scoring, the cache is only kept warm for future use.
pub struct StationResolver<'a> {
    store: &'a LeadStore,
    noaa: &'a NoaaService,
}

impl<'a> StationResolver<'a> {
    pub fn new(store: &'a LeadStore, noaa: &'a NoaaService) -> Self {
        Self { store, noaa }
    }

    /// Coarse bucket key so nearby points share a station row.
    pub fn geo_key(lat: f64, lon: f64) -> String {
        format!("{:.1},{:.1}", lat, lon)
    }

    pub async fn resolve(
        &self,
        lat: f64,
        lon: f64,
        start_date: &str,
        end_date: &str,
    ) -> Result<Option<String>, AppError> {
        let geo_key = Self::geo_key(lat, lon);
        if let Some(station_id) = self.store.get_station(&geo_key).await? {
            return Ok(Some(station_id));
        }

        let found = self.noaa.find_station(lat, lon, start_date, end_date).await?;
        match found {
            Some((station_id, coverage)) => {
                self.store
                    .upsert_station(&geo_key, &station_id, &coverage)
                    .await?;
                Ok(Some(station_id))
            }
            None => Ok(None),
        }
    }
}

/// Bulk-decode VINs that have no cached facts yet, 50 per provider call.
/// Operator-run backfill; the per-lead resolver stays the hot path.
pub async fn backfill_vehicle_facts(
    store: &LeadStore,
    vpic: &VpicService,
    vins: &[String],
) -> Result<usize, AppError> {
    let missing = store.vins_missing_facts(vins).await?;
    if missing.is_empty() {
        return Ok(0);
    }

    let mut stored = 0;
    for chunk in missing.chunks(50) {
        let decoded = match vpic.decode_vin_batch(chunk).await {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Batch decode failed for {} VINs: {}", chunk.len(), e);
                continue;
            }
        };
        for vin in chunk {
            let Some(d) = decoded.get(vin) else {
                tracing::warn!("Batch decode missing VIN {}", mask_vin(vin));
                continue;
            };
            store
                .upsert_vehicle_facts(
                    vin,
                    d.model_year,
                    d.make.as_deref(),
                    d.model.as_deref(),
                    &d.raw,
                )
                .await?;
            stored += 1;
        }
    }

    tracing::info!("Backfilled vehicle facts for {} VINs", stored);
    Ok(stored)
}
