//! Error types for the `upstream` layer.
use std::error::Error as StdError;
use std::fmt;

/// Failure raised while fetching the upstream resource.
///
/// Modeled as a source + kind pair: `kind` carries the classification that
/// the streaming layer maps to an SSE error frame, while `source` holds the
/// underlying error for logging and diagnostics.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub kind: ErrorKind,
}

/// Classification of upstream fetch failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested upstream URL could not be parsed.
    InvalidUrl,
    /// The upstream response body was not valid JSON.
    InvalidJson,
    /// The upstream responded with a non-2xx status.
    HttpStatus {
        code: u16,
        status: String,
        version: String,
    },
    /// The upstream could not be reached at all (DNS failure, connection
    /// refused, timeout).
    Unreachable { host: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::InvalidUrl => write!(f, "The upstream URL cannot be parsed")?,
            ErrorKind::InvalidJson => write!(f, "The upstream response is not valid JSON")?,
            ErrorKind::HttpStatus {
                code,
                status,
                version,
            } => write!(f, "{version} {code} {status}")?,
            ErrorKind::Unreachable { host } => {
                write!(f, "\"{host}\": Name or service not known")?
            }
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| err.as_ref() as &(dyn StdError + 'static))
    }
}
