//! The polling loop: fetch, fan out, sleep; terminal on any failure.

use crate::message::ErrorFrame;
use crate::registry::{PollerShared, PollerUpdate, StreamRegistry};
use axum::http::HeaderMap;
use log::*;
use std::sync::{Arc, Weak};
use upstream::Fetcher;

/// Run one poller until it terminates.
///
/// The loop fetches immediately on start, publishes the value to every
/// subscriber, then sleeps for the key's interval. Any fetch failure is
/// terminal: subscribers are notified exactly once and the poller evicts
/// itself from the registry so a later acquire builds a fresh one.
pub(crate) async fn run(
    registry: Weak<StreamRegistry>,
    shared: Arc<PollerShared>,
    fetcher: Fetcher,
    headers: HeaderMap,
) {
    let url = shared.key.url().to_owned();
    loop {
        match fetcher.fetch(&url, &headers).await {
            Ok(value) => {
                publish(&shared, PollerUpdate::Value(Arc::new(value)));
                if shared.subscribers.is_empty() {
                    // every receiver hung up; stop instead of polling for
                    // nobody, unless a new subscriber attached in the
                    // meantime (re-checked under the shard lock)
                    let Some(registry) = registry.upgrade() else {
                        return;
                    };
                    if registry.evict_if_abandoned(&shared) {
                        return;
                    }
                }
                tokio::time::sleep(shared.key.interval()).await;
            }
            Err(err) => {
                error!("Error fetching data from upstream server \"{url}\". {err}");
                // evicted before the notify: an acquire racing with this
                // teardown builds a fresh poller instead of attaching to
                // the dying one, while senders already on `shared` still
                // receive the failure frame below
                if let Some(registry) = registry.upgrade() {
                    registry.evict(&shared);
                }
                let frame = ErrorFrame::from_fetch_error(&err, &url);
                publish(&shared, PollerUpdate::Failed(frame));
                return;
            }
        }
    }
}

/// Send an update to every subscriber, pruning channels whose receiver hung
/// up. Sends are unbounded and never block, so a slow client cannot stall
/// the loop.
fn publish(shared: &PollerShared, update: PollerUpdate) {
    let mut dead = Vec::new();
    for entry in shared.subscribers.iter() {
        if entry.value().send(update.clone()).is_err() {
            dead.push(entry.key().clone());
        }
    }
    for id in dead {
        shared.subscribers.remove(&id);
    }
}
