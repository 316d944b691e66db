//! Shared HTTP client and request headers for the OBS.
//!
//! The OBS frontend is a browser SPA; its JSON endpoints reject requests that
//! do not look like they come from that frontend, so every request carries
//! the same header set the browser sends.

use crate::config::ObsConfig;
use crate::error::FetchError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER};
use std::time::Duration;

/// Build a [`reqwest::Client`] configured for the OBS.
///
/// The client has:
/// - Timeout from config
/// - The configured browser User-Agent
/// - Brotli and gzip decompression
///
/// No cookie store: the session cookie is per user and sent explicitly
/// with [`request_headers`].
///
/// # Errors
///
/// Returns [`FetchError::Config`] if the client cannot be constructed.
pub fn build_client(config: &ObsConfig) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {e}")))
}

/// Per-request headers carrying the user's session cookie.
///
/// # Errors
///
/// Returns [`FetchError::Config`] if the cookie contains bytes that are not
/// valid in a header value. The cookie itself is not echoed in the error.
pub fn request_headers(config: &ObsConfig, cookie: &str) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    let mut cookie_value = HeaderValue::from_str(cookie.trim())
        .map_err(|_| FetchError::Config("cookie is not a valid header value".into()))?;
    cookie_value.set_sensitive(true);
    headers.insert(COOKIE, cookie_value);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
    let referer = HeaderValue::from_str(&config.referer())
        .map_err(|_| FetchError::Config("base_url is not a valid header value".into()))?;
    headers.insert(REFERER, referer);
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    Ok(headers)
}
