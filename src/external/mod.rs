pub mod geocoder;
pub mod identity;
pub mod notifier;
pub mod payments;

use std::env;
use std::time::Duration;

use crate::error::Error;

const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 10;

/// HTTP client for upstream collaborators. Every external call runs under a
/// bounded timeout; a hung collaborator surfaces as an upstream failure.
pub(crate) fn http_client() -> Result<reqwest::Client, Error> {
    let timeout = env::var("UPSTREAM_TIMEOUT_SECONDS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECONDS);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()?;

    Ok(client)
}
