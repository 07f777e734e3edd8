//! Bounded polling of an instance's readiness probe.

use std::time::{Duration, Instant};

use tracing::debug;

/// Per-request timeout for a single probe attempt.
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `GET {base_url}/health` at a fixed interval until it returns 200 OK
/// or `timeout` elapses.
///
/// Non-200 responses and transport errors both count as not-yet-ready. The
/// function returns within `timeout` plus at most one probe attempt.
pub async fn wait_for_health(
    client: &reqwest::Client,
    base_url: &str,
    timeout: Duration,
    interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    let url = format!("{base_url}/health");

    loop {
        match client
            .get(&url)
            .timeout(PROBE_REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status() == reqwest::StatusCode::OK => return true,
            Ok(response) => {
                debug!("Health probe for {} returned {}", base_url, response.status());
            }
            Err(e) => {
                debug!("Health probe for {} failed: {}", base_url, e);
            }
        }

        if Instant::now() + interval > deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}
