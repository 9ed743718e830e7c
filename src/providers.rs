use crate::config::Config;
use crate::errors::AppError;
use crate::fetcher::Fetcher;
use crate::models::{DailyRecord, ForecastHour, GridPoint, ZipGeo};
use crate::vin::mask_vin;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const GEO_JSON_ACCEPT: (&str, &str) = ("Accept", "application/geo+json");

/// Postal-code geocoder (zippopotam.us).
pub struct GeocoderService {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl GeocoderService {
    pub fn new(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: config.geocoder_base_url.clone(),
        }
    }

    /// Resolves a US zip to lat/lon; `None` when the zip is unknown.
    pub async fn geocode_zip(&self, zip: &str) -> Result<Option<ZipGeo>, AppError> {
        let url = format!("{}/us/{}", self.base_url, urlencode(zip));
        tracing::debug!("Geocoding zip {}", zip);

        let json = match self.fetcher.fetch_json(&url).await {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Geocode failed for zip {}: {}", zip, e);
                return Ok(None);
            }
        };

        let place = match json.get("places").and_then(|p| p.as_array()).and_then(|p| p.first()) {
            Some(place) => place,
            None => return Ok(None),
        };

        let lat = place
            .get("latitude")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());
        let lon = place
            .get("longitude")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());
        let state = place
            .get("state abbreviation")
            .or_else(|| place.get("state"))
            .and_then(|v| v.as_str())
            .map(String::from);

        match (lat, lon) {
            (Some(lat), Some(lon)) => Ok(Some(ZipGeo {
                zip: zip.to_string(),
                lat,
                lon,
                state,
            })),
            _ => Ok(None),
        }
    }
}

/// Decoded VIN attributes plus the raw provider payload.
#[derive(Debug, Clone)]
pub struct VpicDecoded {
    pub model_year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub raw: Value,
}

/// NHTSA vPIC VIN decoder (single and batch).
pub struct VpicService {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl VpicService {
    pub fn new(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: config.vpic_base_url.clone(),
        }
    }

    pub async fn decode_vin(&self, vin: &str) -> Result<VpicDecoded, AppError> {
        let url = format!(
            "{}/api/vehicles/decodevinvaluesextended/{}?format=json",
            self.base_url,
            urlencode(vin)
        );
        tracing::info!("Decoding VIN {}", mask_vin(vin));

        let json = self.fetcher.fetch_json(&url).await?;
        let result = json
            .get("Results")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Self::parse_result(&result, json.clone()))
    }

    /// Batch decode, up to 50 VINs per call, keyed by VIN in the result.
    pub async fn decode_vin_batch(
        &self,
        vins: &[String],
    ) -> Result<HashMap<String, VpicDecoded>, AppError> {
        if vins.is_empty() {
            return Ok(HashMap::new());
        }
        let list = vins
            .iter()
            .take(50)
            .map(|v| urlencode(v))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/api/vehicles/DecodeVinValuesBatch/{}?format=json",
            self.base_url, list
        );
        tracing::info!("Batch decoding {} VINs", vins.len().min(50));

        let json = self.fetcher.fetch_json(&url).await?;
        let mut out = HashMap::new();
        for result in json
            .get("Results")
            .and_then(|r| r.as_array())
            .into_iter()
            .flatten()
        {
            let vin = result
                .get("VIN")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if vin.is_empty() {
                continue;
            }
            out.insert(vin, Self::parse_result(result, result.clone()));
        }
        Ok(out)
    }

    fn parse_result(result: &Value, raw: Value) -> VpicDecoded {
        let model_year = result
            .get("ModelYear")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<i32>().ok())
            .filter(|y| *y > 0);
        let make = result
            .get("Make")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from);
        let model = result
            .get("Model")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from);
        VpicDecoded {
            model_year,
            make,
            model,
            raw,
        }
    }
}

/// Open-recall summary for one VIN.
#[derive(Debug, Clone)]
pub struct RecallLookup {
    pub open_recall_count: i32,
    pub raw: Value,
}

/// NHTSA recall-by-VIN lookup.
pub struct RecallService {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl RecallService {
    pub fn new(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: config.recalls_base_url.clone(),
        }
    }

    pub async fn recalls_by_vin(&self, vin: &str) -> Result<RecallLookup, AppError> {
        let url = format!(
            "{}/recalls/recallsByVehicle?vin={}",
            self.base_url,
            urlencode(vin)
        );
        tracing::info!("Fetching recalls for VIN {}", mask_vin(vin));

        let json = self.fetcher.fetch_json(&url).await?;
        // Some datasets carry no status field; open count falls back to the
        // result array length
        let count = json
            .get("results")
            .or_else(|| json.get("Results"))
            .and_then(|r| r.as_array())
            .map(|r| r.len() as i32)
            .unwrap_or(0);

        Ok(RecallLookup {
            open_recall_count: count,
            raw: json,
        })
    }
}

/// National Weather Service: grid points, hourly forecasts, active alerts.
pub struct NwsService {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl NwsService {
    pub fn new(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: config.nws_base_url.clone(),
        }
    }

    pub async fn grid_point(&self, lat: f64, lon: f64) -> Result<GridPoint, AppError> {
        let url = format!("{}/points/{},{}", self.base_url, lat, lon);
        let json = self
            .fetcher
            .fetch_json_with_headers(&url, &[GEO_JSON_ACCEPT])
            .await?;
        let props = json.get("properties").cloned().unwrap_or(Value::Null);

        let grid_id = props
            .get("gridId")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| AppError::ExternalApiError("NWS point missing gridId".to_string()))?;
        let grid_x = props
            .get("gridX")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AppError::ExternalApiError("NWS point missing gridX".to_string()))?;
        let grid_y = props
            .get("gridY")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AppError::ExternalApiError("NWS point missing gridY".to_string()))?;

        Ok(GridPoint {
            grid_id,
            grid_x,
            grid_y,
        })
    }

    /// Hourly forecast periods normalized to °F and [0,1] precip probability.
    pub async fn hourly_forecast(&self, grid: &GridPoint) -> Result<Vec<ForecastHour>, AppError> {
        let url = format!(
            "{}/gridpoints/{}/{},{}/forecast/hourly",
            self.base_url, grid.grid_id, grid.grid_x, grid.grid_y
        );
        let json = self
            .fetcher
            .fetch_json_with_headers(&url, &[GEO_JSON_ACCEPT])
            .await?;

        let periods = json
            .get("properties")
            .and_then(|p| p.get("periods"))
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let hours = periods
            .iter()
            .map(|p| ForecastHour {
                start_time: p
                    .get("startTime")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                temp_f: p.get("temperature").and_then(|v| v.as_f64()).unwrap_or(f64::NAN),
                precip_prob: p
                    .get("probabilityOfPrecipitation")
                    .and_then(|v| v.get("value"))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0)
                    / 100.0,
            })
            .collect();

        Ok(hours)
    }

    /// Active alerts for a point; raw GeoJSON features.
    pub async fn active_alerts(&self, lat: f64, lon: f64) -> Result<Vec<Value>, AppError> {
        let url = format!("{}/alerts?point={},{}", self.base_url, lat, lon);
        let json = self
            .fetcher
            .fetch_json_with_headers(&url, &[GEO_JSON_ACCEPT])
            .await?;
        Ok(json
            .get("features")
            .and_then(|f| f.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

/// NOAA NCEI climate-data-online: daily history and station search.
/// Both require a token; without one the service degrades to empty results.
pub struct NoaaService {
    fetcher: Arc<Fetcher>,
    base_url: String,
    token: Option<String>,
}

impl NoaaService {
    pub fn new(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: config.noaa_base_url.clone(),
            token: config.noaa_token.clone(),
        }
    }

    /// Daily GHCND history (TMAX/TMIN/PRCP, standard units) for a date range.
    pub async fn daily_history(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<DailyRecord>, AppError> {
        let token = match &self.token {
            Some(token) => token.clone(),
            None => return Ok(Vec::new()),
        };

        let url = format!(
            "{}/cdo-web/api/v2/data?datasetid=GHCND&startdate={}&enddate={}&limit=1000&units=standard&datatypeid=TMAX&datatypeid=TMIN&datatypeid=PRCP",
            self.base_url, start_date, end_date
        );
        let json = self
            .fetcher
            .fetch_json_with_headers(&url, &[("token", token.as_str())])
            .await?;

        // CDO returns one row per (date, datatype); fold TMAX/TMIN pairs into
        // per-day records
        let mut days: HashMap<String, DailyRecord> = HashMap::new();
        for row in json
            .get("results")
            .and_then(|r| r.as_array())
            .into_iter()
            .flatten()
        {
            let date = match row.get("date").and_then(|v| v.as_str()) {
                Some(d) => d.split('T').next().unwrap_or(d).to_string(),
                None => continue,
            };
            let value = row.get("value").and_then(|v| v.as_f64());
            let entry = days.entry(date.clone()).or_insert_with(|| DailyRecord {
                date: Some(date),
                tmin_f: None,
                tmax_f: None,
            });
            match row.get("datatype").and_then(|v| v.as_str()) {
                Some("TMIN") => entry.tmin_f = value,
                Some("TMAX") => entry.tmax_f = value,
                _ => {}
            }
        }

        let mut records: Vec<DailyRecord> = days.into_values().collect();
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(records)
    }

    /// Nearest station with TMAX/TMIN/PRCP coverage inside a ±0.25° box.
    pub async fn find_station(
        &self,
        lat: f64,
        lon: f64,
        start_date: &str,
        end_date: &str,
    ) -> Result<Option<(String, Value)>, AppError> {
        let token = match &self.token {
            Some(token) => token.clone(),
            None => return Ok(None),
        };

        let delta = 0.25; // ~25km box
        let extent = format!(
            "{},{},{},{}",
            lat - delta,
            lon - delta,
            lat + delta,
            lon + delta
        );
        let url = format!(
            "{}/cdo-web/api/v2/stations?extent={}&datatypeid=TMAX&datatypeid=TMIN&datatypeid=PRCP&startdate={}&enddate={}&limit=25",
            self.base_url, extent, start_date, end_date
        );
        let json = self
            .fetcher
            .fetch_json_with_headers(&url, &[("token", token.as_str())])
            .await?;

        let station = match json
            .get("results")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
        {
            Some(station) => station.clone(),
            None => return Ok(None),
        };
        let station_id = station
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if station_id.is_empty() {
            return Ok(None);
        }
        Ok(Some((station_id, station)))
    }
}

/// Federal holiday calendar, served as a raw ICS text blob.
pub struct HolidayService {
    fetcher: Arc<Fetcher>,
    ics_url: String,
}

impl HolidayService {
    pub fn new(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            ics_url: config.holiday_ics_url.clone(),
        }
    }

    pub async fn federal_holidays_ics(&self) -> Result<String, AppError> {
        self.fetcher.fetch_text(&self.ics_url).await
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
