//! Server-Sent Events core for the upstream polling proxy.
//!
//! This crate turns a pull-based upstream JSON resource into a push-based,
//! multi-client SSE stream.
//!
//! # Architecture
//!
//! - **Shared pollers**: Clients asking for the same upstream URL at the
//!   same poll interval share a single polling loop. The `StreamRegistry`
//!   guarantees at most one active poller per (url, interval) key.
//! - **Explicit fan-out**: A poller pushes each fetched value to every
//!   attached subscriber over an unbounded channel, so a slow client never
//!   stalls the polling loop or other clients.
//! - **Per-client diffing**: Each session tracks the last value it sent and
//!   computes RFC 6902 patches against it, independent of other clients'
//!   delivery timing. The first frame of a session is always a full
//!   snapshot.
//! - **Terminal failures**: Any fetch failure stops the poller, notifies
//!   every subscriber exactly once with a structured error frame, and
//!   evicts the poller so a reconnecting client gets a fresh one.
//! - **RAII teardown**: Dropping a `Subscription` detaches it; the poller's
//!   timer is cancelled when its last subscriber is gone.
//!
//! # Modules
//!
//! - `registry`: shared-poller cache with acquire/release lifecycle
//! - `poller`: the polling loop task and subscriber fan-out
//! - `diff`: structural JSON comparison producing patch operations
//! - `session`: per-client frame state machine (snapshot/patch/heartbeat)
//! - `message`: frame and error payload types, conversion to wire events

pub mod diff;
pub mod message;
pub mod poller;
pub mod registry;
pub mod session;

pub use registry::{PollerKey, StreamRegistry, Subscription};
pub use session::StreamMode;
