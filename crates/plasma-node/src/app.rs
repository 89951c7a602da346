//! Client assembly.

use crate::config::{ClientConfig, StorageKind};
use anyhow::{Context, Result};
use plasma_api::{ChainMethods, Dispatcher, OperatorMethods, WalletMethods};
use plasma_chain::{ChainService, ChainStore, SyncCursorStore};
use plasma_proof::OwnershipEvaluator;
use plasma_providers::{
    AnchorClient, MockAnchorClient, MockOperatorClient, MockSigner, OperatorClient, WalletSigner,
};
use plasma_services::{Service, ServiceGraph};
use plasma_state::Address;
use plasma_storage::{Database, MemoryStorage, Storage};
use plasma_sync::{EventHandler, EventWatcher, SyncPipeline};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The provider set the client runs against.
///
/// Transports are external collaborators; anything implementing the
/// provider traits plugs in here. [`Providers::mock`] wires the
/// deterministic in-memory providers used by tests and dev runs.
pub struct Providers {
    /// Anchor chain contract client.
    pub anchor: Arc<dyn AnchorClient>,
    /// Operator client.
    pub operator: Arc<dyn OperatorClient>,
    /// Wallet signer.
    pub signer: Arc<dyn WalletSigner>,
}

impl Providers {
    /// In-memory mock providers.
    pub fn mock() -> Self {
        Self {
            anchor: Arc::new(MockAnchorClient::new()),
            operator: Arc::new(MockOperatorClient::new()),
            signer: Arc::new(MockSigner::with_accounts(1)),
        }
    }
}

/// The assembled plasma client.
pub struct PlasmaClient {
    graph: Arc<ServiceGraph>,
    dispatcher: Arc<Dispatcher>,
    chain: Arc<ChainService>,
    operator: Arc<dyn OperatorClient>,
    ping_interval: Duration,
    running: Arc<AtomicBool>,
}

impl PlasmaClient {
    /// Build a client with mock providers.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_providers(config, Providers::mock())
    }

    /// Build a client with the given providers.
    pub fn with_providers(config: ClientConfig, providers: Providers) -> Result<Self> {
        let storage: Arc<dyn Storage> = match config.storage {
            StorageKind::Rocksdb => {
                std::fs::create_dir_all(&config.data_dir)
                    .context("Failed to create data directory")?;
                Arc::new(Database::open(config.data_dir.join("db"))?)
            }
            StorageKind::Memory => Arc::new(MemoryStorage::new()),
        };

        let chain_store = Arc::new(ChainStore::new(Arc::clone(&storage)));
        let cursors = Arc::new(SyncCursorStore::new(Arc::clone(&storage)));

        let ownership_predicate = match &config.ownership_predicate {
            Some(text) => text
                .parse::<Address>()
                .context("Bad ownership predicate address")?,
            None => Address::zero(),
        };
        // The built-in ownership predicate is evaluated locally and has
        // no deployed bytecode to fetch.
        if chain_store.get_predicate_bytecode(ownership_predicate)?.is_none() {
            chain_store.set_predicate_bytecode(ownership_predicate, &[])?;
        }

        let chain = Arc::new(ChainService::new(
            chain_store,
            cursors.clone(),
            Arc::clone(&providers.anchor),
            Arc::clone(&providers.operator),
            Arc::new(OwnershipEvaluator::new()),
        ));

        let watcher = Arc::new(EventWatcher::new(
            Arc::clone(&providers.anchor),
            cursors,
            Duration::from_millis(config.event_poll_interval_ms),
            config.finality_depth,
        ));
        let handler = Arc::new(EventHandler::new(
            Arc::clone(&watcher),
            Arc::clone(&chain),
            ownership_predicate,
        ));
        let pipeline = Arc::new(SyncPipeline::new(
            Arc::clone(&chain),
            Arc::clone(&providers.operator),
            Arc::clone(&providers.signer),
            Duration::from_millis(config.transaction_poll_interval_ms),
        ));

        let graph = Arc::new(ServiceGraph::new());
        graph.register(Arc::clone(&chain) as Arc<dyn Service>)?;
        graph.register(Arc::clone(&watcher) as Arc<dyn Service>)?;
        graph.register(Arc::clone(&handler) as Arc<dyn Service>)?;
        graph.register(Arc::clone(&pipeline) as Arc<dyn Service>)?;

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&ChainMethods::new(Arc::clone(&graph)));
        dispatcher.register(&WalletMethods::new(Arc::clone(&providers.signer)));
        dispatcher.register(&OperatorMethods::new(
            Arc::clone(&graph),
            Arc::clone(&providers.anchor),
            Arc::clone(&providers.operator),
        ));

        Ok(Self {
            graph,
            dispatcher: Arc::new(dispatcher),
            chain,
            operator: providers.operator,
            ping_interval: Duration::from_millis(config.operator_ping_interval_ms),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start every service in dependency order.
    pub fn start(&self) -> Result<()> {
        self.graph.start()?;
        self.running.store(true, Ordering::SeqCst);
        self.spawn_operator_ping();
        info!(methods = self.dispatcher.method_names().len(), "Client started");
        Ok(())
    }

    /// Stop services in reverse start order.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.graph.stop();
        info!("Client stopped");
    }

    /// The request dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The service registry.
    pub fn graph(&self) -> &Arc<ServiceGraph> {
        &self.graph
    }

    /// The chain service.
    pub fn chain(&self) -> &Arc<ChainService> {
        &self.chain
    }

    fn spawn_operator_ping(&self) {
        let operator = Arc::clone(&self.operator);
        let running = Arc::clone(&self.running);
        let interval = self.ping_interval;
        tokio::spawn(async move {
            let mut was_online = true;
            while running.load(Ordering::SeqCst) {
                let online = operator.is_online().await;
                if online != was_online {
                    if online {
                        info!("Operator is back online");
                    } else {
                        warn!("Operator is offline");
                    }
                    was_online = online;
                }
                tokio::time::sleep(interval).await;
            }
        });
    }
}
