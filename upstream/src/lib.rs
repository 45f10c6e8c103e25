//! Upstream fetch gateway.
//!
//! Performs a single HTTP GET against an upstream JSON resource and
//! classifies every possible failure so the streaming layer can translate it
//! into a client-facing error frame. No retry logic lives here; a poller
//! treats any returned error as terminal.

pub mod error;
pub mod fetch;

pub use error::{Error, ErrorKind};
pub use fetch::Fetcher;
