use crate::circuit_breaker::{create_provider_circuit_breaker, ProviderCircuitBreaker};
use crate::errors::AppError;
use failsafe::futures::CircuitBreaker as _;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Identifying user-agent sent on every outbound request.
pub const USER_AGENT: &str = "DealerStressor/0.1 (+https://example.com)";

/// Bounded retry count after the initial attempt.
const MAX_RETRIES: u32 = 2;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    rps: f64,
    capacity: f64,
}

/// Process-wide token buckets keyed by hostname.
///
/// Acquisition blocks until a token is available; callers are slowed down,
/// never rejected. Token consumption is serialized across concurrent
/// in-process callers by the mutex.
pub struct HostRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    rps: f64,
}

impl HostRateLimiter {
    pub fn new(rps: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rps,
        }
    }

    /// Takes one token from `host`'s bucket, sleeping until one refills.
    pub async fn acquire(&self, host: &str) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let now = Instant::now();
                let bucket = buckets.entry(host.to_string()).or_insert_with(|| Bucket {
                    tokens: self.rps,
                    last_refill: now,
                    rps: self.rps,
                    capacity: self.rps,
                });

                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                let refill = elapsed * bucket.rps;
                if refill > 0.0 {
                    bucket.tokens = (bucket.tokens + refill).min(bucket.capacity);
                    bucket.last_refill = now;
                }

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64((deficit / bucket.rps).max(0.005)))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

/// Rate-limited, retrying JSON/text fetcher shared by every provider client.
///
/// No caching happens at this layer; resolvers own the durable caches.
pub struct Fetcher {
    client: Client,
    limiter: HostRateLimiter,
    breaker: ProviderCircuitBreaker,
    retry_base: Duration,
}

impl Fetcher {
    pub fn new(rps: f64, retry_base_ms: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter: HostRateLimiter::new(rps),
            breaker: create_provider_circuit_breaker(),
            retry_base: Duration::from_millis(retry_base_ms),
        })
    }

    /// GET `url` and parse the body as JSON.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, AppError> {
        self.fetch_json_with_headers(url, &[]).await
    }

    /// GET `url` with extra headers and parse the body as JSON.
    pub async fn fetch_json_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, AppError> {
        let body = self.fetch_with_retries(url, headers).await?;
        serde_json::from_str(&body).map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse response from {}: {}", url, e))
        })
    }

    /// GET `url` and return the raw body text (ICS calendars).
    pub async fn fetch_text(&self, url: &str) -> Result<String, AppError> {
        self.fetch_with_retries(url, &[]).await
    }

    async fn fetch_with_retries(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<String, AppError> {
        let host = reqwest::Url::parse(url)
            .map_err(|e| AppError::BadRequest(format!("Invalid URL {}: {}", url, e)))?
            .host_str()
            .unwrap_or("unknown")
            .to_string();

        let mut last_err = AppError::ExternalApiError(format!("request to {} never ran", host));
        for attempt in 0..=MAX_RETRIES {
            self.limiter.acquire(&host).await;

            match self.attempt(url, headers).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    tracing::warn!(
                        "Request to {} failed (attempt {}/{}): {}",
                        host,
                        attempt + 1,
                        MAX_RETRIES + 1,
                        e
                    );
                    last_err = e;
                }
            }

            // Linearly increasing delay between attempts
            tokio::time::sleep(self.retry_base * (attempt + 1)).await;
        }
        Err(last_err)
    }

    async fn attempt(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, AppError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let outcome = self
            .breaker
            .call(async {
                let response = request
                    .send()
                    .await
                    .map_err(|e| AppError::ExternalApiError(format!("request failed: {}", e)))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(AppError::ExternalApiError(format!(
                        "HTTP {}: {}",
                        status, error_text
                    )));
                }

                response
                    .text()
                    .await
                    .map_err(|e| AppError::ExternalApiError(format!("failed to read body: {}", e)))
            })
            .await;

        match outcome {
            Ok(body) => Ok(body),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "circuit open, request rejected".to_string(),
            )),
        }
    }
}
