use anyhow::{Error, Result, anyhow};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Runs `operation` up to `retries + 1` times, sleeping `delay` between
/// attempts, and returns the last error when every attempt fails.
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    retries: usize,
    delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Error: From<E>,
{
    let mut attempt = 0;
    loop {
        match operation().await.map_err(Error::from) {
            Ok(val) => return Ok(val),
            Err(err) if attempt < retries => {
                attempt += 1;
                debug!("Attempt {}/{} failed: {}. Retrying...", attempt, retries + 1, err);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fetches `url` and returns the body of a successful response.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow!("Request error: {} for URL: {}", e, url))?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("HTTP error: {} for URL: {}", status, url));
    }

    Ok(response.text().await?)
}
