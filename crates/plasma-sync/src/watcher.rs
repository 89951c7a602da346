//! Finality-delayed anchor event polling.

use crate::SyncResult;
use parking_lot::RwLock;
use plasma_chain::SyncCursorStore;
use plasma_providers::{AnchorClient, AnchorEvent};
use plasma_services::{Service, ServiceResult};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Subscriber-driven poller over anchor contract events.
///
/// One cooperative loop serves every subscribed event name. Each cycle
/// reads the anchor head, holds events back until they are `finality_depth`
/// blocks deep, filters out identities the cursor store has seen, records
/// the survivors and only then delivers them - so a crash between marking
/// and delivery re-delivers nothing. Within one event name, deliveries
/// are ordered by `(block_number, log_index)` and never duplicated.
pub struct EventWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    anchor: Arc<dyn AnchorClient>,
    cursors: Arc<SyncCursorStore>,
    poll_interval: Duration,
    finality_depth: u64,
    subscriptions: RwLock<HashMap<String, Vec<mpsc::Sender<Vec<AnchorEvent>>>>>,
    started: AtomicBool,
    loop_running: AtomicBool,
}

impl EventWatcher {
    /// Create a watcher.
    pub fn new(
        anchor: Arc<dyn AnchorClient>,
        cursors: Arc<SyncCursorStore>,
        poll_interval: Duration,
        finality_depth: u64,
    ) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                anchor,
                cursors,
                poll_interval,
                finality_depth,
                subscriptions: RwLock::new(HashMap::new()),
                started: AtomicBool::new(false),
                loop_running: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to an event name with a bounded delivery buffer.
    ///
    /// The poll loop starts lazily with the first subscription once the
    /// service is started. Dropping the receiver unsubscribes; when the
    /// last receiver for a name goes away, that name is no longer polled.
    pub fn subscribe(&self, event_name: &str, capacity: usize) -> mpsc::Receiver<Vec<AnchorEvent>> {
        let (tx, rx) = mpsc::channel(capacity);
        self.inner
            .subscriptions
            .write()
            .entry(event_name.to_string())
            .or_default()
            .push(tx);
        self.maybe_spawn_loop();
        rx
    }

    /// Run one polling cycle across all subscribed event names.
    ///
    /// Exposed so tests and callers can drive the watcher without timers.
    pub async fn poll_once(&self) -> SyncResult<()> {
        WatcherInner::poll_once(&self.inner).await
    }

    fn maybe_spawn_loop(&self) {
        if !self.inner.started.load(Ordering::SeqCst) {
            return;
        }
        if self.inner.subscriptions.read().is_empty() {
            return;
        }
        if self.inner.loop_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            debug!("Event poll loop started");
            while inner.started.load(Ordering::SeqCst) {
                if let Err(e) = WatcherInner::poll_once(&inner).await {
                    warn!(error = %e, "Event poll cycle failed");
                }
                tokio::time::sleep(inner.poll_interval).await;
            }
            inner.loop_running.store(false, Ordering::SeqCst);
            debug!("Event poll loop stopped");
        });
    }
}

impl WatcherInner {
    async fn poll_once(inner: &Arc<WatcherInner>) -> SyncResult<()> {
        // Prune dead subscribers; names with none left stop being polled.
        let names: Vec<String> = {
            let mut subscriptions = inner.subscriptions.write();
            for senders in subscriptions.values_mut() {
                senders.retain(|s| !s.is_closed());
            }
            subscriptions.retain(|_, senders| !senders.is_empty());
            subscriptions.keys().cloned().collect()
        };
        if names.is_empty() {
            return Ok(());
        }

        let head = inner.anchor.head_block_number().await?;
        let final_head = head.saturating_sub(inner.finality_depth);

        for name in names {
            let from = inner
                .cursors
                .last_logged_event_block(&name)?
                .map(|block| block + 1)
                .unwrap_or(0);
            if from > final_head {
                continue;
            }

            let mut events = inner.anchor.events(&name, from, final_head).await?;
            events.sort_by_key(|e| (e.block_number, e.log_index));

            let mut fresh = Vec::with_capacity(events.len());
            for event in events {
                if !inner.cursors.has_event(&event)? {
                    fresh.push(event);
                }
            }
            // Mark before delivering: re-delivery after a crash is worse
            // than a listener missing a batch it can re-derive.
            inner.cursors.add_events(&fresh)?;

            if !fresh.is_empty() {
                let senders = inner
                    .subscriptions
                    .read()
                    .get(&name)
                    .cloned()
                    .unwrap_or_default();
                for sender in senders {
                    if sender.send(fresh.clone()).await.is_err() {
                        debug!(event = name.as_str(), "Subscriber dropped during delivery");
                    }
                }
                debug!(event = name.as_str(), count = fresh.len(), "Events delivered");
            }

            inner.cursors.set_last_logged_event_block(&name, final_head)?;
        }
        Ok(())
    }
}

impl Service for EventWatcher {
    fn name(&self) -> &'static str {
        "event-watcher"
    }

    fn start(&self) -> ServiceResult<()> {
        self.inner.started.store(true, Ordering::SeqCst);
        self.maybe_spawn_loop();
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        self.inner.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
