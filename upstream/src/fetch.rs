use crate::error::{Error, ErrorKind};
use log::*;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;

/// HTTP client for polling upstream resources. One `Fetcher` is shared by
/// every poller in the process; connection pooling is handled by the inner
/// `reqwest::Client`.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .use_rustls_tls()
                .timeout(timeout)
                .build()?,
        })
    }

    /// Perform a single GET against `url`, forwarding `headers`, and parse
    /// the response body as JSON.
    pub async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<Value, Error> {
        trace!("Fetching upstream resource \"{url}\".");
        let parsed = reqwest::Url::parse(url).map_err(|err| Error {
            source: Some(Box::new(err)),
            kind: ErrorKind::InvalidUrl,
        })?;
        let host = parsed.host_str().unwrap_or("unknown").to_owned();

        let response = self
            .client
            .get(parsed)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|err| Error {
                source: Some(Box::new(err)),
                kind: ErrorKind::Unreachable { host: host.clone() },
            })?;

        let status = response.status();
        let version = format!("{:?}", response.version());
        if !status.is_success() {
            return Err(Error {
                source: None,
                kind: ErrorKind::HttpStatus {
                    code: status.as_u16(),
                    status: status.canonical_reason().unwrap_or("Unknown").to_owned(),
                    version,
                },
            });
        }

        let body = response.text().await.map_err(|err| Error {
            source: Some(Box::new(err)),
            kind: ErrorKind::Unreachable { host },
        })?;
        serde_json::from_str(&body).map_err(|err| Error {
            source: Some(Box::new(err)),
            kind: ErrorKind::InvalidJson,
        })
    }
}
