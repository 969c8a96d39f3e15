//! Retry with exponential backoff for idempotent ledger reads.
//!
//! Only transport errors that are not timeouts are retried; a timed-out call
//! has already spent its budget. Transaction submission never goes through
//! here: a POST that reached the ledger but lost its response must not be
//! sent twice.

use std::time::Duration;

/// Retry attempts after the initial request.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries (200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

/// Send a GET with retry on connection-level failures.
///
/// The caller inspects the status code of whatever response comes back.
pub(crate) async fn retry_get<F, Fut>(
    endpoint: &str,
    f: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_timeout() => return Err(e),
            Err(e) => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                tracing::warn!(
                    endpoint,
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    "ledger read failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}
