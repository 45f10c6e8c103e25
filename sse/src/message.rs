use axum::response::sse::Event;
use chrono::Utc;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use upstream::ErrorKind;

/// A single RFC 6902 patch operation addressed by a JSON Pointer path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

/// Payload of the terminal `error` frame sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorFrame {
    pub code: u16,
    pub status: String,
    pub reason: String,
    pub message: String,
    /// Epoch milliseconds at classification time.
    pub timestamp: i64,
}

impl ErrorFrame {
    /// Map a classified fetch failure to the client-facing error payload.
    pub fn from_fetch_error(err: &upstream::Error, url: &str) -> Self {
        let timestamp = Utc::now().timestamp_millis();
        match &err.kind {
            ErrorKind::InvalidUrl => Self {
                code: 400,
                status: "Bad Request".to_owned(),
                reason: format!("Invalid URL. {err}"),
                message: "The request URL is invalid and cannot be proxified. \
                          Please type in a valid URL."
                    .to_owned(),
                timestamp,
            },
            ErrorKind::InvalidJson => Self {
                code: 400,
                status: "Bad Request".to_owned(),
                reason: format!("An error occurred while streaming \"{url}\". {err}"),
                message: "The request URL is not responding with a valid JSON content. \
                          Please type in an URL responding with valid JSON."
                    .to_owned(),
                timestamp,
            },
            ErrorKind::HttpStatus {
                code,
                status,
                version,
            } => Self {
                code: *code,
                status: status.clone(),
                reason: format!(
                    "An error occurred while streaming \"{url}\". {version} {code} {status}"
                ),
                message: "HTTP error. The HTTP response cannot be processed.".to_owned(),
                timestamp,
            },
            ErrorKind::Unreachable { host } => Self {
                code: 502,
                status: "Bad Gateway".to_owned(),
                reason: format!(
                    "An error occurred while streaming \"{url}\". \
                     \"{host}\": Name or service not known"
                ),
                message: "The URL refers to an unknown host. Please check your URL.".to_owned(),
                timestamp,
            },
        }
    }
}

/// A frame ready to be written to one client's SSE connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keep-alive comment line, ignored by SSE clients.
    Heartbeat,
    /// Full value of the upstream resource, labeled `data`.
    Snapshot(Value),
    /// Diff against the last value sent to this client, labeled `patch`.
    Patch(Vec<PatchOperation>),
    /// Terminal failure payload; the stream ends after this frame.
    Error(ErrorFrame),
}

impl Frame {
    /// Convert to the wire-level event. Serializing values that came out of
    /// `serde_json` cannot fail in practice; the comment fallback keeps the
    /// wire well-formed regardless.
    pub fn into_event(self) -> Event {
        match self {
            Frame::Heartbeat => Event::default().comment(""),
            Frame::Snapshot(value) => named_event("data", &value),
            Frame::Patch(ops) => named_event("patch", &ops),
            Frame::Error(frame) => named_event("error", &frame),
        }
    }
}

fn named_event<T: Serialize>(name: &str, payload: &T) -> Event {
    match serde_json::to_string(payload) {
        Ok(json) => Event::default().event(name).data(json),
        Err(err) => {
            error!("Failed to serialize SSE {name} event: {err}");
            Event::default().comment("")
        }
    }
}
