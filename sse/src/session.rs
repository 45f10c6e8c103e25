//! Per-client streaming state machine.

use crate::diff;
use crate::message::Frame;
use crate::registry::{PollerUpdate, Subscription};
use async_stream::stream;
use futures::Stream;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Delivery mode for frames after the initial snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Send RFC 6902 diffs; deeply equal consecutive values send nothing.
    Patch,
    /// Send the full value for every poll result.
    Data,
}

#[derive(Debug, PartialEq, Eq)]
pub struct StreamModeParseError;

impl FromStr for StreamMode {
    type Err = StreamModeParseError;
    fn from_str(mode: &str) -> Result<StreamMode, Self::Err> {
        match mode.to_lowercase().as_str() {
            "patch" => Ok(StreamMode::Patch),
            "data" => Ok(StreamMode::Data),
            _ => Err(StreamModeParseError),
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamMode::Patch => write!(f, "patch"),
            StreamMode::Data => write!(f, "data"),
        }
    }
}

/// Turn a poller subscription into the frame sequence for one client.
///
/// The first value is always delivered as a full snapshot regardless of
/// `mode`; afterwards the mode decides between diffs and snapshots. A
/// heartbeat comment is emitted every `ping_interval` on its own timer,
/// independent of poll activity. The subscription is released when the
/// returned stream is dropped, on any exit path.
pub fn stream_frames(
    mut subscription: Subscription,
    mode: StreamMode,
    ping_interval: Duration,
) -> impl Stream<Item = Frame> {
    stream! {
        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_sent = Value::Object(Map::new());
        let mut snapshot_pending = true;

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    yield Frame::Heartbeat;
                }
                update = subscription.recv() => match update {
                    Some(PollerUpdate::Value(value)) => {
                        if snapshot_pending {
                            snapshot_pending = false;
                            last_sent = (*value).clone();
                            yield Frame::Snapshot(last_sent.clone());
                        } else {
                            match mode {
                                StreamMode::Patch => {
                                    let ops = diff::diff(&last_sent, &value);
                                    if !ops.is_empty() {
                                        last_sent = (*value).clone();
                                        yield Frame::Patch(ops);
                                    }
                                }
                                StreamMode::Data => {
                                    last_sent = (*value).clone();
                                    yield Frame::Snapshot(last_sent.clone());
                                }
                            }
                        }
                    }
                    Some(PollerUpdate::Failed(frame)) => {
                        yield Frame::Error(frame);
                        break;
                    }
                    // poller gone without a failure notification
                    None => break,
                }
            }
        }
    }
}
