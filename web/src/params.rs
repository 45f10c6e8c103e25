//! Per-request parameter resolution for the streaming endpoint.

use axum::http::header::HeaderName;
use axum::http::{HeaderMap, Uri};
use log::*;
use service::config::{Config, MIN_PING_INTERVAL, MIN_REFRESH_INTERVAL};
use sse::StreamMode;

pub const REFRESH_INTERVAL_HEADER: &str = "esp-refresh-interval";
pub const PING_INTERVAL_HEADER: &str = "esp-ping-interval";
pub const MODE_HEADER: &str = "esp-mode";

/// Streaming parameters resolved from the request URI, the esp-* request
/// headers and the configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    /// The upstream URL: request path and query minus the leading slash.
    pub upstream: String,
    /// Poll interval in seconds, floored to 5.
    pub refresh_interval: u64,
    /// Heartbeat interval in seconds, floored to 20.
    pub ping_interval: u64,
    pub mode: StreamMode,
}

impl StreamParams {
    pub fn resolve(uri: &Uri, headers: &HeaderMap, config: &Config) -> Self {
        let upstream = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .trim_start_matches('/')
            .to_owned();

        let refresh_interval = header_u64(headers, REFRESH_INTERVAL_HEADER)
            .unwrap_or(config.refresh_interval)
            .max(MIN_REFRESH_INTERVAL);
        let ping_interval = header_u64(headers, PING_INTERVAL_HEADER)
            .unwrap_or(config.ping_interval)
            .max(MIN_PING_INTERVAL);

        // an unrecognized mode header falls back to patch, not to the
        // configured default
        let mode = match header_str(headers, MODE_HEADER) {
            Some(mode) => mode.parse().unwrap_or(StreamMode::Patch),
            None => config.mode,
        };

        Self {
            upstream,
            refresh_interval,
            ping_interval,
            mode,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|value| value.parse().ok())
}

/// Select the request headers forwarded upstream, per the configured
/// allow-list.
pub fn forward_headers(headers: &HeaderMap, pass_headers: &[String]) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for name in pass_headers {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        match name.parse::<HeaderName>() {
            Ok(header_name) => {
                if let Some(value) = headers.get(&header_name) {
                    forwarded.insert(header_name, value.clone());
                }
            }
            Err(err) => warn!("Ignoring invalid pass-through header name \"{name}\": {err}"),
        }
    }
    forwarded
}
