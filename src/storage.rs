use crate::errors::AppError;
use crate::models::{
    FeatureVectorRecord, Lead, LeadScoreRecord, NeighborScoreRow, RecallSummary, TensorRow,
    VehicleFacts, ZipGeo,
};
use crate::vin::vin_fingerprint;
use serde_json::Value;
use sqlx::PgPool;

/// Database storage service for leads, caches, tensors and score records.
///
/// Every write is a single-statement atomic upsert; no multi-step
/// transaction spans an orchestrator run, so partial progress (geo cached,
/// score not yet written) is visible and expected.
pub struct LeadStore {
    pool: PgPool,
}

impl LeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---- leads ----

    pub async fn fetch_lead(&self, lead_id: &str) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            SELECT lead_id, vin, dealer_id, dealer_zip, lead_type, status, created_at, updated_at
            FROM leads
            WHERE lead_id = $1
            "#,
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(lead)
    }

    /// Least-recently-touched lead still needing a score. A lead stuck in
    /// `processing` reappears here, which is what gives the worker its
    /// at-least-once retry.
    pub async fn next_pending_lead(&self) -> Result<Option<String>, AppError> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT lead_id FROM leads
            WHERE status IN ('new', 'processing')
            ORDER BY updated_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(|r| r.0))
    }

    /// Claim is not atomic with the selection; concurrent workers can race
    /// and double-score a lead, which the idempotent orchestrator tolerates.
    pub async fn claim_lead(&self, lead_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET status = 'processing', updated_at = now() WHERE lead_id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    pub async fn mark_scored(&self, lead_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET status = 'scored', updated_at = now() WHERE lead_id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    // ---- geo cache ----

    pub async fn get_zip_geo(&self, zip: &str) -> Result<Option<ZipGeo>, AppError> {
        let row = sqlx::query_as::<_, ZipGeo>(
            "SELECT zip, lat, lon, state FROM zip_geo WHERE zip = $1",
        )
        .bind(zip)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row)
    }

    pub async fn upsert_zip_geo(&self, geo: &ZipGeo) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO zip_geo (zip, lat, lon, state, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (zip) DO UPDATE
            SET lat = EXCLUDED.lat,
                lon = EXCLUDED.lon,
                state = EXCLUDED.state,
                updated_at = now()
            "#,
        )
        .bind(&geo.zip)
        .bind(geo.lat)
        .bind(geo.lon)
        .bind(&geo.state)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    // ---- vehicle facts cache ----

    pub async fn get_vehicle_facts(&self, vin: &str) -> Result<Option<VehicleFacts>, AppError> {
        let row = sqlx::query_as::<_, VehicleFacts>(
            r#"
            SELECT vin, vin_hash, model_year, make, model, decoded_json
            FROM vehicle_facts
            WHERE vin = $1
            "#,
        )
        .bind(vin)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row)
    }

    /// Fingerprint is recomputed on every write so a changed hashing scheme
    /// converges without a backfill.
    pub async fn upsert_vehicle_facts(
        &self,
        vin: &str,
        model_year: Option<i32>,
        make: Option<&str>,
        model: Option<&str>,
        decoded_json: &Value,
    ) -> Result<VehicleFacts, AppError> {
        let vin_hash = vin_fingerprint(vin);
        sqlx::query(
            r#"
            INSERT INTO vehicle_facts (vin, vin_hash, model_year, make, model, decoded_json, decoded_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (vin) DO UPDATE
            SET vin_hash = EXCLUDED.vin_hash,
                model_year = EXCLUDED.model_year,
                make = EXCLUDED.make,
                model = EXCLUDED.model,
                decoded_json = EXCLUDED.decoded_json,
                decoded_at = now()
            "#,
        )
        .bind(vin)
        .bind(&vin_hash)
        .bind(model_year)
        .bind(make)
        .bind(model)
        .bind(decoded_json)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(VehicleFacts {
            vin: vin.to_string(),
            vin_hash,
            model_year,
            make: make.map(String::from),
            model: model.map(String::from),
            decoded_json: decoded_json.clone(),
        })
    }

    /// VINs from `vins` that have no decoded facts yet (batch backfill).
    pub async fn vins_missing_facts(&self, vins: &[String]) -> Result<Vec<String>, AppError> {
        if vins.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT v.vin FROM unnest($1::text[]) AS v(vin)
            LEFT JOIN vehicle_facts f ON f.vin = v.vin
            WHERE f.vin IS NULL
            "#,
        )
        .bind(vins)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    // ---- recall cache ----

    pub async fn get_recall_summary(&self, vin: &str) -> Result<Option<RecallSummary>, AppError> {
        let row = sqlx::query_as::<_, RecallSummary>(
            "SELECT vin, open_recall_count, recalls_json FROM vehicle_recalls WHERE vin = $1",
        )
        .bind(vin)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row)
    }

    pub async fn upsert_recall_summary(
        &self,
        vin: &str,
        open_recall_count: i32,
        recalls_json: &Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO vehicle_recalls (vin, open_recall_count, recalls_json, last_checked_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (vin) DO UPDATE
            SET open_recall_count = EXCLUDED.open_recall_count,
                recalls_json = EXCLUDED.recalls_json,
                last_checked_at = now()
            "#,
        )
        .bind(vin)
        .bind(open_recall_count)
        .bind(recalls_json)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    // ---- weather station cache ----

    pub async fn get_station(&self, geo_key: &str) -> Result<Option<String>, AppError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT station_id FROM noaa_station_cache WHERE geo_key = $1",
        )
        .bind(geo_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(|r| r.0))
    }

    pub async fn upsert_station(
        &self,
        geo_key: &str,
        station_id: &str,
        coverage_json: &Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO noaa_station_cache (geo_key, station_id, coverage_json, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (geo_key) DO UPDATE
            SET station_id = EXCLUDED.station_id,
                coverage_json = EXCLUDED.coverage_json,
                updated_at = now()
            "#,
        )
        .bind(geo_key)
        .bind(station_id)
        .bind(coverage_json)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    // ---- tensor / neighbors (read-only) ----

    pub async fn lookup_exact_score(
        &self,
        vehicle_class_id: &str,
        scenario_id: &str,
    ) -> Result<Option<TensorRow>, AppError> {
        let row = sqlx::query_as::<_, TensorRow>(
            r#"
            SELECT score, reasons, model_version, confidence
            FROM vehicle_scenario_scores
            WHERE vehicle_class_id = $1 AND scenario_id = $2
            "#,
        )
        .bind(vehicle_class_id)
        .bind(scenario_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row)
    }

    pub async fn lookup_neighbor_scores(
        &self,
        vehicle_class_id: &str,
        scenario_id: &str,
        limit: i64,
    ) -> Result<Vec<NeighborScoreRow>, AppError> {
        let rows = sqlx::query_as::<_, NeighborScoreRow>(
            r#"
            SELECT vss.score, vss.reasons, vss.model_version, n.similarity
            FROM vehicle_class_neighbors n
            JOIN vehicle_scenario_scores vss
              ON vss.vehicle_class_id = n.neighbor_vehicle_class_id
            WHERE n.vehicle_class_id = $1 AND vss.scenario_id = $2
            ORDER BY n.similarity DESC
            LIMIT $3
            "#,
        )
        .bind(vehicle_class_id)
        .bind(scenario_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    // ---- scoring output ----

    /// Append-only audit trail: one row per scoring run, never updated.
    pub async fn insert_feature_vector(
        &self,
        record: &FeatureVectorRecord,
    ) -> Result<uuid::Uuid, AppError> {
        let row: (uuid::Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO feature_vectors
                (feature_vector_id, lead_id, vin, vin_hash, dealer_zip, run_date, feature_version, features, inputs)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING feature_vector_id
            "#,
        )
        .bind(&record.lead_id)
        .bind(&record.vin)
        .bind(&record.vin_hash)
        .bind(&record.dealer_zip)
        .bind(record.run_date)
        .bind(&record.feature_version)
        .bind(&record.features)
        .bind(&record.inputs)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.0)
    }

    /// Current score for a lead; latest run wins.
    pub async fn upsert_lead_score(&self, record: &LeadScoreRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO lead_scores
                (lead_id, priority_score, bucket, reasons, offers, score_version, ab_variant, scored_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (lead_id) DO UPDATE
            SET priority_score = EXCLUDED.priority_score,
                bucket = EXCLUDED.bucket,
                reasons = EXCLUDED.reasons,
                offers = EXCLUDED.offers,
                score_version = EXCLUDED.score_version,
                ab_variant = EXCLUDED.ab_variant,
                scored_at = now()
            "#,
        )
        .bind(&record.lead_id)
        .bind(record.priority_score)
        .bind(&record.bucket)
        .bind(&record.reasons)
        .bind(&record.offers)
        .bind(&record.score_version)
        .bind(&record.ab_variant)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(())
    }
}
