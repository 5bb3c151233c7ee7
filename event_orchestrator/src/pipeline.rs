use crate::snapshot::EventsSnapshot;
use crate::tracker::{EventsQuery, EventsTracker, Generation, StreamUpdate};
use allowance_core::{
    ChainId, ImplicitApprovalPolicy, LogFetcher, LogStream, ProxyResolver, SecondaryEventSource,
};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Drives every fetch of a request concurrently and republishes the snapshot
/// each time one of them settles.
///
/// Starting a new request supersedes the running one: its outstanding results
/// are discarded and its `load` call returns `None`.
pub struct EventsPipeline {
    fetcher: Arc<dyn LogFetcher>,
    resolver: Arc<dyn ProxyResolver>,
    secondary: Arc<dyn SecondaryEventSource>,
    tracker: Arc<Mutex<EventsTracker>>,
    updates: watch::Sender<EventsSnapshot>,
}

impl EventsPipeline {
    pub fn new(
        fetcher: Arc<dyn LogFetcher>,
        resolver: Arc<dyn ProxyResolver>,
        secondary: Arc<dyn SecondaryEventSource>,
        policies: HashMap<ChainId, ImplicitApprovalPolicy>,
    ) -> Self {
        let (updates, _) = watch::channel(EventsSnapshot::idle());
        Self {
            fetcher,
            resolver,
            secondary,
            tracker: Arc::new(Mutex::new(EventsTracker::new(policies))),
            updates,
        }
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<EventsSnapshot> {
        self.updates.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> EventsSnapshot {
        self.updates.borrow().clone()
    }

    pub async fn current_generation(&self) -> Generation {
        self.tracker.lock().await.generation()
    }

    /// Load the approval history of `query.account` on `query.chain_id`.
    ///
    /// Returns the settled snapshot, or `None` if another request started
    /// before this one finished.
    pub async fn load(&self, query: EventsQuery) -> Option<EventsSnapshot> {
        let generation = {
            let mut tracker = self.tracker.lock().await;
            let generation = tracker.start(query);
            self.updates.send_replace(tracker.snapshot());
            generation
        };

        info!(
            "Loading approval history for {} on chain {} (generation {})",
            query.account,
            query.chain_id,
            generation.value()
        );

        let mut pending = self.spawn_fetches(query);
        // Last snapshot taken under the same guard as a successful apply
        let mut settled = None;

        while let Some(update) = pending.next().await {
            if let Some(error) = update_error(&update) {
                warn!("Fetch failed for {}: {}", query.account, error);
            }

            let mut tracker = self.tracker.lock().await;
            if !tracker.apply(generation, update) {
                debug!(
                    "Generation {} superseded, dropping {} outstanding fetches",
                    generation.value(),
                    pending.len()
                );
                return None;
            }
            let snapshot = tracker.snapshot();
            self.updates.send_replace(snapshot.clone());
            settled = Some(snapshot);
        }

        let snapshot = settled?;
        info!(
            "Finished generation {}: complete={} error={:?}",
            generation.value(),
            snapshot.is_complete(),
            snapshot.error.as_ref().map(ToString::to_string)
        );
        Some(snapshot)
    }

    fn spawn_fetches(
        &self,
        query: EventsQuery,
    ) -> FuturesUnordered<BoxFuture<'static, StreamUpdate>> {
        let pending = FuturesUnordered::new();

        for stream in LogStream::ALL {
            let fetcher = Arc::clone(&self.fetcher);
            pending.push(
                async move {
                    let result = match stream.filter(query.account) {
                        Ok(filter) => {
                            fetcher
                                .fetch_logs(stream.label(), query.chain_id, &filter)
                                .await
                        }
                        Err(e) => Err(e),
                    };
                    StreamUpdate::Logs(stream, result)
                }
                .boxed(),
            );
        }

        let resolver = Arc::clone(&self.resolver);
        pending.push(
            async move {
                let result = resolver.resolve_proxy(query.chain_id, query.account).await;
                StreamUpdate::Proxy(result)
            }
            .boxed(),
        );

        let secondary = Arc::clone(&self.secondary);
        pending.push(
            async move {
                let result = secondary.fetch_events(query.account, query.chain_id).await;
                StreamUpdate::Secondary(result)
            }
            .boxed(),
        );

        pending
    }
}

fn update_error(update: &StreamUpdate) -> Option<&allowance_core::EventsError> {
    match update {
        StreamUpdate::Logs(_, result) => result.as_ref().err(),
        StreamUpdate::Proxy(result) => result.as_ref().err(),
        StreamUpdate::Secondary(result) => result.as_ref().err(),
    }
}
