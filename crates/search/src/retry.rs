use std::future::Future;
use std::time::Duration;

/// Run an async operation with exponential backoff: the delay starts at
/// `base_delay` and doubles per attempt. The last error is returned once
/// `max_attempts` is exhausted.
pub async fn with_retry<T, E, F, Fut>(
    max_attempts: usize,
    base_delay: Duration,
    mut op: F,
) -> std::result::Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < max_attempts => {
                let delay = base_delay * 2u32.saturating_pow(attempt as u32);
                log::warn!(
                    "Retry {}/{} in {:?}: {}",
                    attempt + 1,
                    max_attempts,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
