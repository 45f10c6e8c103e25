//! Shared-poller registry: at most one active poller per (url, interval).

use crate::message::ErrorFrame;
use crate::poller;
use axum::http::HeaderMap;
use dashmap::DashMap;
use log::*;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use upstream::Fetcher;

/// Identity of a shareable poller: clients asking for the same URL at the
/// same poll interval share one upstream polling loop. The same URL at a
/// different interval is a distinct poller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PollerKey {
    url: String,
    interval: Duration,
}

impl PollerKey {
    pub fn new(url: impl Into<String>, interval: Duration) -> Self {
        Self {
            url: url.into(),
            interval,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Unique identifier for one subscription (server-generated).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Update pushed from a poller to each of its subscribers.
#[derive(Debug, Clone)]
pub enum PollerUpdate {
    /// A freshly fetched value of the upstream resource.
    Value(Arc<Value>),
    /// Terminal failure; the poller has stopped and evicted itself.
    Failed(ErrorFrame),
}

/// State shared between the registry and a running poller task.
pub(crate) struct PollerShared {
    pub(crate) key: PollerKey,
    pub(crate) subscribers: DashMap<SubscriptionId, UnboundedSender<PollerUpdate>>,
}

struct PollerEntry {
    shared: Arc<PollerShared>,
    task: tokio::task::JoinHandle<()>,
}

/// Process-wide cache of active pollers.
///
/// All lifecycle mutation goes through `acquire` and `Subscription::drop`;
/// the DashMap entry lock serializes creation and destruction per key, so a
/// poller is never created twice or torn down while a new subscriber is
/// attaching.
pub struct StreamRegistry {
    pollers: DashMap<PollerKey, PollerEntry>,
    fetcher: Fetcher,
}

impl StreamRegistry {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            pollers: DashMap::new(),
            fetcher,
        }
    }

    /// Number of live pollers, for observability.
    pub fn active_pollers(&self) -> usize {
        self.pollers.len()
    }

    /// Attach a subscriber to the poller for `key`, creating and starting
    /// the poller if none is running. `headers` are forwarded upstream by
    /// the poller; they are captured from the subscriber that creates it.
    pub fn acquire(self: &Arc<Self>, key: PollerKey, headers: HeaderMap) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId::new();

        let entry = self.pollers.entry(key.clone()).or_insert_with(|| {
            info!(
                "Starting upstream poller for \"{}\" at a {} seconds poll interval.",
                key.url(),
                key.interval().as_secs()
            );
            let shared = Arc::new(PollerShared {
                key: key.clone(),
                subscribers: DashMap::new(),
            });
            let task = tokio::spawn(poller::run(
                Arc::downgrade(self),
                Arc::clone(&shared),
                self.fetcher.clone(),
                headers,
            ));
            PollerEntry { shared, task }
        });
        entry.shared.subscribers.insert(id.clone(), tx);
        drop(entry);
        debug!(
            "Registered subscription {} for \"{}\" ({} active pollers).",
            id.as_str(),
            key.url(),
            self.active_pollers()
        );

        Subscription {
            registry: Arc::clone(self),
            key,
            id,
            receiver: rx,
        }
    }

    /// Detach one subscriber; tears the poller down when it was the last.
    fn detach(&self, key: &PollerKey, id: &SubscriptionId) {
        if let Some(entry) = self.pollers.get(key) {
            entry.shared.subscribers.remove(id);
        }
        // re-checked under the shard lock: a concurrent acquire wins and
        // keeps the poller alive
        if let Some((_, entry)) = self
            .pollers
            .remove_if(key, |_, entry| entry.shared.subscribers.is_empty())
        {
            info!("Stopping upstream poller for \"{}\".", key.url());
            entry.task.abort();
        }
    }

    /// Remove a terminally failed poller. Identity-checked so a newer poller
    /// registered under the same key is never torn down. Callers evict
    /// before notifying subscribers; senders already registered on `shared`
    /// keep working, so every attached subscriber still receives the frame.
    pub(crate) fn evict(&self, shared: &Arc<PollerShared>) {
        let removed = self
            .pollers
            .remove_if(&shared.key, |_, entry| Arc::ptr_eq(&entry.shared, shared));
        if removed.is_some() {
            info!("Stopping upstream poller for \"{}\".", shared.key.url());
        }
    }

    /// Remove a poller whose subscribers have all hung up. Identity-checked
    /// like `evict`, and emptiness is re-checked under the shard lock so a
    /// subscriber attaching concurrently is never orphaned. Returns whether
    /// the poller was removed.
    pub(crate) fn evict_if_abandoned(&self, shared: &Arc<PollerShared>) -> bool {
        let removed = self.pollers.remove_if(&shared.key, |_, entry| {
            Arc::ptr_eq(&entry.shared, shared) && entry.shared.subscribers.is_empty()
        });
        if removed.is_some() {
            info!("Stopping upstream poller for \"{}\".", shared.key.url());
        }
        removed.is_some()
    }
}

/// A live attachment to a shared poller. Dropping the subscription releases
/// it; the poller stops as soon as its last subscription is gone.
pub struct Subscription {
    pub(crate) registry: Arc<StreamRegistry>,
    pub(crate) key: PollerKey,
    pub(crate) id: SubscriptionId,
    pub(crate) receiver: UnboundedReceiver<PollerUpdate>,
}

impl Subscription {
    /// Next update from the poller; `None` once the poller is gone.
    pub async fn recv(&mut self) -> Option<PollerUpdate> {
        self.receiver.recv().await
    }

    pub fn key(&self) -> &PollerKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(
            "A client is unsubscribing from the stream for \"{}\".",
            self.key.url()
        );
        self.registry.detach(&self.key, &self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn registry() -> Arc<StreamRegistry> {
        let fetcher = Fetcher::new(Duration::from_secs(2)).expect("failed to build test fetcher");
        Arc::new(StreamRegistry::new(fetcher))
    }

    async fn recv_update(subscription: &mut Subscription) -> PollerUpdate {
        timeout(Duration::from_secs(2), subscription.recv())
            .await
            .expect("timed out waiting for poller update")
            .expect("poller channel closed unexpectedly")
    }

    #[tokio::test]
    async fn clients_with_same_key_share_one_poller() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/resource")
            .with_body(r#"{"x":1}"#)
            .expect(1)
            .create_async()
            .await;

        let registry = registry();
        let key = PollerKey::new(format!("{}/resource", server.url()), Duration::from_secs(60));
        let mut first = registry.acquire(key.clone(), HeaderMap::new());
        let mut second = registry.acquire(key, HeaderMap::new());
        assert_eq!(registry.active_pollers(), 1);

        assert!(matches!(
            recv_update(&mut first).await,
            PollerUpdate::Value(_)
        ));
        assert!(matches!(
            recv_update(&mut second).await,
            PollerUpdate::Value(_)
        ));

        // a single upstream hit served both clients
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn same_url_with_different_intervals_gets_distinct_pollers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/resource")
            .with_body("{}")
            .expect(2)
            .create_async()
            .await;

        let registry = registry();
        let url = format!("{}/resource", server.url());
        let mut slow = registry.acquire(
            PollerKey::new(url.clone(), Duration::from_secs(60)),
            HeaderMap::new(),
        );
        let mut fast = registry.acquire(
            PollerKey::new(url, Duration::from_secs(90)),
            HeaderMap::new(),
        );
        assert_eq!(registry.active_pollers(), 2);

        assert!(matches!(
            recv_update(&mut slow).await,
            PollerUpdate::Value(_)
        ));
        assert!(matches!(
            recv_update(&mut fast).await,
            PollerUpdate::Value(_)
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn poller_repolls_on_its_interval() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/resource")
            .with_body(r#"{"tick":true}"#)
            .expect_at_least(2)
            .create_async()
            .await;

        let registry = registry();
        let key = PollerKey::new(
            format!("{}/resource", server.url()),
            Duration::from_millis(50),
        );
        let mut subscription = registry.acquire(key, HeaderMap::new());

        assert!(matches!(
            recv_update(&mut subscription).await,
            PollerUpdate::Value(_)
        ));
        assert!(matches!(
            recv_update(&mut subscription).await,
            PollerUpdate::Value(_)
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn last_release_stops_and_removes_the_poller() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/resource")
            .with_body("{}")
            .create_async()
            .await;

        let registry = registry();
        let key = PollerKey::new(format!("{}/resource", server.url()), Duration::from_secs(60));
        let mut first = registry.acquire(key.clone(), HeaderMap::new());
        let second = registry.acquire(key, HeaderMap::new());

        assert!(matches!(
            recv_update(&mut first).await,
            PollerUpdate::Value(_)
        ));

        drop(first);
        assert_eq!(registry.active_pollers(), 1);
        drop(second);
        assert_eq!(registry.active_pollers(), 0);
    }

    #[tokio::test]
    async fn terminal_failure_notifies_and_evicts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/resource")
            .with_status(503)
            .create_async()
            .await;

        let registry = registry();
        let key = PollerKey::new(format!("{}/resource", server.url()), Duration::from_secs(60));
        let mut subscription = registry.acquire(key, HeaderMap::new());

        match recv_update(&mut subscription).await {
            PollerUpdate::Failed(frame) => assert_eq!(frame.code, 503),
            other => panic!("expected Failed, got {other:?}"),
        }

        // the failed poller is gone and the channel drains to closed
        let closed = timeout(Duration::from_secs(2), subscription.recv())
            .await
            .expect("timed out waiting for channel close");
        assert!(closed.is_none());
        assert_eq!(registry.active_pollers(), 0);
    }

    #[tokio::test]
    async fn reacquire_after_failure_starts_a_fresh_fetch_sequence() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/resource")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let registry = registry();
        let key = PollerKey::new(format!("{}/resource", server.url()), Duration::from_secs(60));

        let mut subscription = registry.acquire(key.clone(), HeaderMap::new());
        assert!(matches!(
            recv_update(&mut subscription).await,
            PollerUpdate::Failed(_)
        ));
        drop(subscription);

        let mut subscription = registry.acquire(key, HeaderMap::new());
        assert!(matches!(
            recv_update(&mut subscription).await,
            PollerUpdate::Failed(_)
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn eviction_does_not_sever_already_attached_subscribers() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/resource")
            .with_body("{}")
            .create_async()
            .await;

        let registry = registry();
        let key = PollerKey::new(format!("{}/resource", server.url()), Duration::from_secs(60));
        let mut subscription = registry.acquire(key.clone(), HeaderMap::new());
        assert!(matches!(
            recv_update(&mut subscription).await,
            PollerUpdate::Value(_)
        ));

        let (shared, sender) = {
            let entry = registry.pollers.get(&key).expect("poller should be cached");
            let sender = entry
                .shared
                .subscribers
                .iter()
                .next()
                .expect("subscriber should be registered")
                .value()
                .clone();
            (Arc::clone(&entry.shared), sender)
        };
        registry.evict(&shared);
        assert_eq!(registry.active_pollers(), 0);

        // a frame published after the eviction still reaches the subscriber
        let error = ErrorFrame {
            code: 503,
            status: "Service Unavailable".to_owned(),
            reason: "reason".to_owned(),
            message: "message".to_owned(),
            timestamp: 1,
        };
        sender
            .send(PollerUpdate::Failed(error))
            .expect("channel should stay open after eviction");
        assert!(matches!(
            recv_update(&mut subscription).await,
            PollerUpdate::Failed(_)
        ));
    }

    #[tokio::test]
    async fn abandoned_eviction_spares_a_poller_with_a_live_subscriber() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/resource")
            .with_body("{}")
            .create_async()
            .await;

        let registry = registry();
        let key = PollerKey::new(format!("{}/resource", server.url()), Duration::from_secs(60));
        let mut subscription = registry.acquire(key.clone(), HeaderMap::new());
        assert!(matches!(
            recv_update(&mut subscription).await,
            PollerUpdate::Value(_)
        ));

        let shared = Arc::clone(
            &registry
                .pollers
                .get(&key)
                .expect("poller should be cached")
                .shared,
        );

        // a live subscriber keeps the poller mapped
        assert!(!registry.evict_if_abandoned(&shared));
        assert_eq!(registry.active_pollers(), 1);

        // once every subscriber is gone the eviction goes through
        shared.subscribers.clear();
        assert!(registry.evict_if_abandoned(&shared));
        assert_eq!(registry.active_pollers(), 0);
    }

    #[tokio::test]
    async fn forwards_headers_captured_at_poller_creation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/resource")
            .match_header("authorization", "Bearer secret")
            .with_body("{}")
            .create_async()
            .await;

        let registry = registry();
        let key = PollerKey::new(format!("{}/resource", server.url()), Duration::from_secs(60));
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        let mut subscription = registry.acquire(key, headers);

        assert!(matches!(
            recv_update(&mut subscription).await,
            PollerUpdate::Value(_)
        ));
        mock.assert_async().await;
    }
}
