//! Applies domain events to the chain service.

use crate::events::{
    ChainEvent, EventFanout, BLOCK_SUBMITTED_EVENT, DEPOSIT_EVENT, EXIT_FINALIZED_EVENT,
    EXIT_STARTED_EVENT,
};
use crate::{EventWatcher, SyncResult};
use plasma_chain::ChainService;
use plasma_providers::AnchorEvent;
use plasma_services::{Service, ServiceResult};
use plasma_state::Address;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Buffer size for watcher subscriptions and local signals.
const CHANNEL_CAPACITY: usize = 64;

/// Lifts raw anchor events to domain events and applies them.
///
/// Deposits land in head state, block submissions record commitments and
/// bump the latest block, exit starts blank their range, finalisations
/// persist the finalised mark. Every applied event is re-emitted on the
/// local `event:{Name}` signal for in-process subscribers. A malformed or
/// failing event is logged and skipped; it never stalls the stream.
pub struct EventHandler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    watcher: Arc<EventWatcher>,
    chain: Arc<ChainService>,
    ownership_predicate: Address,
    fanout: EventFanout,
    started: AtomicBool,
}

impl EventHandler {
    /// Create a handler.
    pub fn new(
        watcher: Arc<EventWatcher>,
        chain: Arc<ChainService>,
        ownership_predicate: Address,
    ) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                watcher,
                chain,
                ownership_predicate,
                fanout: EventFanout::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to a local `event:{Name}` signal.
    pub fn subscribe(&self, signal: &str) -> tokio::sync::mpsc::Receiver<ChainEvent> {
        self.inner.fanout.subscribe(signal, CHANNEL_CAPACITY)
    }

    /// Lift and apply one raw anchor event.
    pub async fn handle_raw_event(&self, event: &AnchorEvent) -> SyncResult<()> {
        HandlerInner::handle_raw_event(&self.inner, event).await
    }
}

impl HandlerInner {
    async fn handle_raw_event(inner: &Arc<HandlerInner>, event: &AnchorEvent) -> SyncResult<()> {
        let lifted = ChainEvent::from_anchor(event, inner.ownership_predicate)?;
        match &lifted {
            ChainEvent::Deposit(deposit) => {
                inner.chain.add_deposits(vec![deposit.clone()]).await?;
            }
            ChainEvent::BlockSubmitted { number, root } => {
                inner.chain.chain_store().set_block_header(number, *root)?;
                inner.chain.chain_store().set_latest_block(number).await?;
            }
            ChainEvent::ExitStarted(exit) => {
                inner.chain.add_exit(exit.clone()).await?;
            }
            ChainEvent::ExitFinalized { token, start, end } => {
                inner.chain.chain_store().mark_finalized(token, start, end)?;
            }
        }
        debug!(signal = lifted.signal(), "Domain event applied");
        inner.fanout.emit(lifted).await;
        Ok(())
    }

    fn spawn_consumer(inner: &Arc<HandlerInner>, event_name: &'static str) {
        let mut receiver = inner.watcher.subscribe(event_name, CHANNEL_CAPACITY);
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            while let Some(batch) = receiver.recv().await {
                if !inner.started.load(Ordering::SeqCst) {
                    break;
                }
                for event in &batch {
                    if let Err(e) = HandlerInner::handle_raw_event(&inner, event).await {
                        warn!(
                            event = event.name.as_str(),
                            block = event.block_number,
                            error = %e,
                            "Event application failed"
                        );
                    }
                }
            }
            debug!(event = event_name, "Event consumer stopped");
        });
    }
}

impl Service for EventHandler {
    fn name(&self) -> &'static str {
        "event-handler"
    }

    fn dependencies(&self) -> &[&'static str] {
        &["chain", "event-watcher"]
    }

    fn start(&self) -> ServiceResult<()> {
        self.inner.started.store(true, Ordering::SeqCst);
        for event_name in [
            DEPOSIT_EVENT,
            BLOCK_SUBMITTED_EVENT,
            EXIT_STARTED_EVENT,
            EXIT_FINALIZED_EVENT,
        ] {
            HandlerInner::spawn_consumer(&self.inner, event_name);
        }
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
