/// Integration tests with mocked external providers
/// Exercises the rate-limited fetcher and the provider clients without
/// hitting real external services
use dealer_stressor::config::Config;
use dealer_stressor::fetcher::{Fetcher, USER_AGENT};
use dealer_stressor::providers::{
    GeocoderService, HolidayService, NwsService, RecallService, VpicService,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create a test config with every provider pointed at
/// the mock server
fn create_test_config(base_url: String) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        scoring_mode: "lookup".to_string(),
        recalls_enabled: true,
        noaa_token: Some("test_noaa_token".to_string()),
        provider_rps: 50.0,
        retry_base_ms: 10,
        poll_idle_ms: 1000,
        error_backoff_ms: 1500,
        geocoder_base_url: base_url.clone(),
        vpic_base_url: base_url.clone(),
        recalls_base_url: base_url.clone(),
        nws_base_url: base_url.clone(),
        noaa_base_url: base_url.clone(),
        holiday_ics_url: format!("{}/ics", base_url),
    }
}

fn test_fetcher() -> Arc<Fetcher> {
    Arc::new(Fetcher::new(50.0, 10).unwrap())
}

#[tokio::test]
async fn test_fetcher_sends_identifying_user_agent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ua"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = test_fetcher();
    let result = fetcher.fetch_json(&format!("{}/ua", mock_server.uri())).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_fetcher_retries_then_succeeds() {
    let mock_server = MockServer::start().await;

    // First two attempts fail, third lands
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let fetcher = test_fetcher();
    let result = fetcher
        .fetch_json(&format!("{}/flaky", mock_server.uri()))
        .await;
    assert!(result.is_ok());
    assert_eq!(result.unwrap()["ok"], serde_json::json!(true));
}

#[tokio::test]
async fn test_fetcher_surfaces_error_after_retry_budget() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3) // initial attempt + 2 retries
        .mount(&mock_server)
        .await;

    let fetcher = test_fetcher();
    let result = fetcher
        .fetch_json(&format!("{}/down", mock_server.uri()))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_fetcher_rate_limits_per_host() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&mock_server)
        .await;

    // Bucket of 2 tokens: third call must wait for a refill
    let fetcher = Arc::new(Fetcher::new(2.0, 1).unwrap());
    let url = format!("{}/limited", mock_server.uri());

    let start = Instant::now();
    for _ in 0..3 {
        fetcher.fetch_json(&url).await.unwrap();
    }
    assert!(
        start.elapsed() >= Duration::from_millis(300),
        "third request should have been throttled, took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_geocoder_parses_place() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "post code": "80301",
        "places": [
            {"latitude": "40.0457", "longitude": "-105.2621", "state abbreviation": "CO"}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/us/80301"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let geocoder = GeocoderService::new(&config, test_fetcher());
    let geo = geocoder.geocode_zip("80301").await.unwrap().unwrap();

    assert!((geo.lat - 40.0457).abs() < 1e-9);
    assert!((geo.lon + 105.2621).abs() < 1e-9);
    assert_eq!(geo.state.as_deref(), Some("CO"));
}

#[tokio::test]
async fn test_geocoder_unknown_zip_degrades_to_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/us/00000"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let geocoder = GeocoderService::new(&config, test_fetcher());
    let geo = geocoder.geocode_zip("00000").await.unwrap();
    assert!(geo.is_none());
}

#[tokio::test]
async fn test_vpic_decodes_vin() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "Count": 1,
        "Results": [
            {"VIN": "1HGCM82633A004352", "ModelYear": "2021", "Make": "HONDA", "Model": "Accord"}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/api/vehicles/decodevinvaluesextended/1HGCM82633A004352"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let vpic = VpicService::new(&config, test_fetcher());
    let decoded = vpic.decode_vin("1HGCM82633A004352").await.unwrap();

    assert_eq!(decoded.model_year, Some(2021));
    assert_eq!(decoded.make.as_deref(), Some("HONDA"));
    assert_eq!(decoded.model.as_deref(), Some("Accord"));
}

#[tokio::test]
async fn test_vpic_batch_decode_keys_by_vin() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "Results": [
            {"VIN": "1HGCM82633A004352", "ModelYear": "2015", "Make": "HONDA", "Model": "Accord"},
            {"VIN": "5YJ3E1EA7KF317000", "ModelYear": "2019", "Make": "TESLA", "Model": "Model 3"}
        ]
    });
    Mock::given(method("GET"))
        .and(path(
            "/api/vehicles/DecodeVinValuesBatch/1HGCM82633A004352,5YJ3E1EA7KF317000",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let vpic = VpicService::new(&config, test_fetcher());
    let decoded = vpic
        .decode_vin_batch(&[
            "1HGCM82633A004352".to_string(),
            "5YJ3E1EA7KF317000".to_string(),
        ])
        .await
        .unwrap();

    assert_eq!(decoded.len(), 2);
    assert_eq!(
        decoded["5YJ3E1EA7KF317000"].make.as_deref(),
        Some("TESLA")
    );
}

#[tokio::test]
async fn test_recalls_count_falls_back_to_result_length() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "Count": 2,
        "results": [
            {"Component": "AIR BAGS"},
            {"Component": "BRAKES"}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/recalls/recallsByVehicle"))
        .and(query_param("vin", "1HGCM82633A004352"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let recalls = RecallService::new(&config, test_fetcher());
    let summary = recalls.recalls_by_vin("1HGCM82633A004352").await.unwrap();
    assert_eq!(summary.open_recall_count, 2);
}

#[tokio::test]
async fn test_nws_point_then_hourly_forecast() {
    let mock_server = MockServer::start().await;

    let point_body = serde_json::json!({
        "properties": {"gridId": "BOU", "gridX": 52, "gridY": 75}
    });
    Mock::given(method("GET"))
        .and(path("/points/40.01,-105.27"))
        .and(header("accept", "application/geo+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&point_body))
        .mount(&mock_server)
        .await;

    let forecast_body = serde_json::json!({
        "properties": {
            "periods": [
                {"startTime": "2024-01-17T13:00:00Z", "temperature": 15, "probabilityOfPrecipitation": {"value": 70}},
                {"startTime": "2024-01-17T14:00:00Z", "temperature": 18, "probabilityOfPrecipitation": {"value": null}}
            ]
        }
    });
    Mock::given(method("GET"))
        .and(path("/gridpoints/BOU/52,75/forecast/hourly"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&forecast_body))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let nws = NwsService::new(&config, test_fetcher());

    let grid = nws.grid_point(40.01, -105.27).await.unwrap();
    assert_eq!(grid.grid_id, "BOU");

    let hours = nws.hourly_forecast(&grid).await.unwrap();
    assert_eq!(hours.len(), 2);
    assert_eq!(hours[0].temp_f, 15.0);
    assert!((hours[0].precip_prob - 0.7).abs() < 1e-9);
    // null precipitation value normalizes to zero probability
    assert_eq!(hours[1].precip_prob, 0.0);
}

#[tokio::test]
async fn test_nws_alerts_returns_features() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "features": [
            {"properties": {"event": "Winter Storm Warning"}}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/alerts"))
        .and(query_param("point", "40.01,-105.27"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let nws = NwsService::new(&config, test_fetcher());
    let alerts = nws.active_alerts(40.01, -105.27).await.unwrap();
    assert_eq!(alerts.len(), 1);
}

#[tokio::test]
async fn test_holiday_ics_is_raw_text() {
    let mock_server = MockServer::start().await;

    let ics = "BEGIN:VCALENDAR\nDTSTART;VALUE=DATE:20240101\nEND:VCALENDAR";
    Mock::given(method("GET"))
        .and(path("/ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ics))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let holidays = HolidayService::new(&config, test_fetcher());
    let blob = holidays.federal_holidays_ics().await.unwrap();
    assert!(blob.contains("BEGIN:VCALENDAR"));
}
