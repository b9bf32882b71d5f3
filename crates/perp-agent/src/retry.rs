use std::future::Future;
use std::time::Duration;

use anyhow::Result;

/// Fixed retry budget for collaborator calls.
pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Run a fallible collaborator call up to `RETRY_ATTEMPTS` times with a
/// fixed inter-attempt delay; the last error propagates once the budget is
/// spent. This is the loop's only suspension point besides the end-of-cycle
/// sleep.
pub async fn with_retry<T, F, Fut>(op: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < RETRY_ATTEMPTS => {
                tracing::warn!(
                    op,
                    attempt,
                    max = RETRY_ATTEMPTS,
                    error = %e,
                    "collaborator call failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(op, attempts = RETRY_ATTEMPTS, error = %e, "retries exhausted");
                return Err(e);
            }
        }
    }
}
