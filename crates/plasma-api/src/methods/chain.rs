//! Chain method table.

use super::{
    address_param, balances_json, biguint_param, bytes_param, exit_record_json, hash_param,
    internal, receipt_json, resolve_chain, state_object_json, transaction_json, PREFIX,
};
use crate::dispatcher::{handler, MethodHandler, MethodTable};
use crate::rpc::RpcError;
use plasma_proof::Transaction;
use plasma_services::ServiceGraph;
use serde_json::{json, Value};
use std::sync::Arc;

/// The chain surface: queries over stored material plus deposits, exits,
/// spends and proof-checked imports.
pub struct ChainMethods {
    graph: Arc<ServiceGraph>,
}

impl ChainMethods {
    /// Create the chain table over the service registry.
    pub fn new(graph: Arc<ServiceGraph>) -> Self {
        Self { graph }
    }
}

impl MethodTable for ChainMethods {
    fn prefix(&self) -> &'static str {
        PREFIX
    }

    fn methods(&self) -> Vec<(&'static str, MethodHandler)> {
        let graph = Arc::clone(&self.graph);
        let get_block_header = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let block = biguint_param(&params, 0)?;
                let root = chain.get_block_header(&block).map_err(internal)?;
                Ok(json!(format!("0x{}", hex::encode(root))))
            }
        });

        let graph = Arc::clone(&self.graph);
        let get_transaction = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let hash = hash_param(&params, 0)?;
                let transaction = chain.get_transaction(&hash).map_err(internal)?;
                Ok(transaction_json(&transaction))
            }
        });

        let graph = Arc::clone(&self.graph);
        let get_last_synced = handler(move |_params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let block = chain.last_synced_block().map_err(internal)?;
                Ok(block
                    .map(|b| json!(b.to_string()))
                    .unwrap_or(Value::Null))
            }
        });

        let graph = Arc::clone(&self.graph);
        let send_transaction = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let encoded = bytes_param(&params, 0)?;
                let transaction = Transaction::decode(&encoded)
                    .map_err(|e| RpcError::invalid_params(e.to_string()))?;
                let receipt = chain
                    .send_transaction(&transaction)
                    .await
                    .map_err(internal)?;
                Ok(json!(receipt))
            }
        });

        let graph = Arc::clone(&self.graph);
        let pick_ranges = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let owner = address_param(&params, 0)?;
                let token = biguint_param(&params, 1)?;
                let amount = biguint_param(&params, 2)?;
                let picked = chain
                    .pick_ranges(owner, &token, &amount)
                    .map_err(internal)?;
                Ok(json!(picked.iter().map(state_object_json).collect::<Vec<_>>()))
            }
        });

        let graph = Arc::clone(&self.graph);
        let start_exit = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let owner = address_param(&params, 0)?;
                let token = biguint_param(&params, 1)?;
                let amount = biguint_param(&params, 2)?;
                let receipts = chain
                    .start_exit(owner, &token, &amount)
                    .await
                    .map_err(internal)?;
                Ok(json!(receipts.iter().map(receipt_json).collect::<Vec<_>>()))
            }
        });

        let graph = Arc::clone(&self.graph);
        let finalize_exits = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let owner = address_param(&params, 0)?;
                let receipts = chain.finalize_exits(owner).await.map_err(internal)?;
                Ok(json!(receipts.iter().map(receipt_json).collect::<Vec<_>>()))
            }
        });

        let graph = Arc::clone(&self.graph);
        let get_exits = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let owner = address_param(&params, 0)?;
                let records = chain.get_exits(owner).await.map_err(internal)?;
                Ok(json!(records.iter().map(exit_record_json).collect::<Vec<_>>()))
            }
        });

        let graph = Arc::clone(&self.graph);
        let get_balances = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let owner = address_param(&params, 0)?;
                let balances = chain.get_balances(owner).map_err(internal)?;
                Ok(balances_json(&balances))
            }
        });

        vec![
            ("getBlockHeader", get_block_header),
            ("getTransaction", get_transaction),
            ("getLastSyncedBlock", get_last_synced),
            ("sendTransaction", send_transaction),
            ("pickRanges", pick_ranges),
            ("startExit", start_exit),
            ("finalizeExits", finalize_exits),
            ("getExits", get_exits),
            ("getBalances", get_balances),
        ]
    }
}
