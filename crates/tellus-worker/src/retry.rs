// Transient/permanent failure classification and retry loop
//
// Transient: network timeouts and HTTP 408/502/503/504. Permanent: any
// other 4xx, or an explicit permanentFail from the backend.

use std::future::Future;
use tellus_core::{EngineError, Result, RetryPolicy};
use tracing::warn;

/// HTTP statuses retried with backoff
const TRANSIENT_STATUSES: &[u16] = &[408, 502, 503, 504];

pub fn is_transient_status(status: u16) -> bool {
    TRANSIENT_STATUSES.contains(&status)
}

/// Whether an engine error is worth retrying. Communication failures are
/// transient unless they carry a permanent HTTP status; everything else is
/// permanent.
pub fn is_transient(error: &EngineError) -> bool {
    let EngineError::CommunicationFailure(message) = error else {
        return false;
    };
    // clients stamp response failures as "HTTP status NNN"; anything else
    // (connect failure, timeout, reset) stays transient
    if let Some(rest) = message.split("HTTP status ").nth(1) {
        if let Ok(status) = rest.get(..3).unwrap_or("").parse::<u16>() {
            return is_transient_status(status);
        }
    }
    true
}

/// Run `op` with the retry policy, backing off exponentially between
/// transient failures.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.count && is_transient(&error) => {
                attempt += 1;
                let backoff = policy.backoff(attempt);
                warn!(
                    label,
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    error = %error,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(error) => return Err(error),
        }
    }
}
