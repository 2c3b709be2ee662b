use crate::ops::throttle;
use geoextent_core::error::{ExtentError, Result};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

const USER_AGENT: &str = concat!("geoextent/", env!("CARGO_PKG_VERSION"));
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_SECS: f64 = 0.5;

/// status codes worth retrying; everything else is returned to the caller
/// for provider-specific handling.
const RETRY_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// builds the per-provider HTTP client: keep-alive connection pool and
/// sane timeouts. retry policy lives in [`get_with_retry`].
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(20)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| ExtentError::TransientNetwork(format!("building HTTP client: {}", e)))
}

/// GET with up to three retries on transient statuses, exponential backoff
/// between attempts, and rate-limit honoring. a 429 always enters the
/// throttle path, even when `honor_rate_limits` is off.
pub async fn get_with_retry(client: &Client, url: &str, honor_rate_limits: bool) -> Result<Response> {
    let mut attempt: u32 = 0;
    loop {
        let outcome = client.get(url).send().await;
        match outcome {
            Ok(response) => {
                let status = response.status();
                if RETRY_STATUS.contains(&status.as_u16()) {
                    if attempt >= MAX_RETRIES {
                        return Err(ExtentError::TransientNetwork(format!(
                            "HTTP {} for {} after {} retries",
                            status, url, MAX_RETRIES
                        )));
                    }
                    attempt += 1;
                    log::debug!("HTTP {} for {}, retry {}/{}", status, url, attempt, MAX_RETRIES);
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        throttle::throttle(response.headers(), status.as_u16()).await;
                    } else {
                        backoff(attempt).await;
                    }
                    continue;
                }
                if honor_rate_limits {
                    throttle::throttle(response.headers(), status.as_u16()).await;
                }
                return Ok(response);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    return Err(ExtentError::TransientNetwork(format!("{}: {}", url, e)));
                }
                attempt += 1;
                log::debug!("request error for {} ({}), retry {}/{}", url, e, attempt, MAX_RETRIES);
                backoff(attempt).await;
            }
        }
    }
}

async fn backoff(attempt: u32) {
    let wait = BACKOFF_BASE_SECS * f64::from(2_u32.pow(attempt - 1));
    tokio::time::sleep(Duration::from_secs_f64(wait)).await;
}

/// maps a non-success response to the error taxonomy: 401/403 signal a
/// closed record, everything else is a provider API failure.
pub fn error_for_status(response: &Response, provider: &str) -> Option<ExtentError> {
    let status = response.status();
    if status.is_success() {
        return None;
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Some(ExtentError::access_denied(
            provider,
            format!("HTTP {} for {}", status, response.url()),
        ))
    } else {
        Some(ExtentError::provider(
            provider,
            format!("HTTP {} for {}", status, response.url()),
        ))
    }
}
