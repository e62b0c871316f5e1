//! Provider strategy implementations.

use std::time::Duration;

pub mod github;
pub mod google;
pub mod wechat;

/// Build the HTTP client shared by a strategy's calls.
///
/// The timeout applies per request and surfaces as an error, never a silent
/// hang; retry policy belongs to the caller.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}
