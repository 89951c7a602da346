//! Operator and anchor method table.

use super::{
    address_param, biguint_param, hash_param, internal, receipt_json, resolve_chain,
    string_param, PREFIX,
};
use crate::dispatcher::{handler, MethodHandler, MethodTable};
use plasma_providers::{AnchorClient, OperatorClient};
use plasma_services::ServiceGraph;
use serde_json::{json, Value};
use std::sync::Arc;

/// The operator-facing surface: anchor info, block commitments, deposits
/// and the operator's token registry.
pub struct OperatorMethods {
    graph: Arc<ServiceGraph>,
    anchor: Arc<dyn AnchorClient>,
    operator: Arc<dyn OperatorClient>,
}

impl OperatorMethods {
    /// Create the operator table.
    pub fn new(
        graph: Arc<ServiceGraph>,
        anchor: Arc<dyn AnchorClient>,
        operator: Arc<dyn OperatorClient>,
    ) -> Self {
        Self {
            graph,
            anchor,
            operator,
        }
    }
}

impl MethodTable for OperatorMethods {
    fn prefix(&self) -> &'static str {
        PREFIX
    }

    fn methods(&self) -> Vec<(&'static str, MethodHandler)> {
        let anchor = Arc::clone(&self.anchor);
        let get_eth_info = handler(move |_params: Value| {
            let anchor = Arc::clone(&anchor);
            async move {
                let online = anchor.is_online().await;
                let head = anchor.head_block_number().await.map_err(internal)?;
                let challenge_period = anchor.challenge_period().await.map_err(internal)?;
                Ok(json!({
                    "online": online,
                    "headBlock": head,
                    "challengePeriod": challenge_period,
                }))
            }
        });

        let operator = Arc::clone(&self.operator);
        let get_next_block = handler(move |_params: Value| {
            let operator = Arc::clone(&operator);
            async move {
                let block = operator.next_block_number().await.map_err(internal)?;
                Ok(json!(block.to_string()))
            }
        });

        let operator = Arc::clone(&self.operator);
        let get_current_block = handler(move |_params: Value| {
            let operator = Arc::clone(&operator);
            async move {
                let block = operator.current_block_number().await.map_err(internal)?;
                Ok(json!(block.to_string()))
            }
        });

        let anchor = Arc::clone(&self.anchor);
        let submit_block = handler(move |params: Value| {
            let anchor = Arc::clone(&anchor);
            async move {
                let root = hash_param(&params, 0)?;
                let receipt = anchor.submit_block(root).await.map_err(internal)?;
                Ok(receipt_json(&receipt))
            }
        });

        let graph = Arc::clone(&self.graph);
        let deposit = handler(move |params: Value| {
            let graph = Arc::clone(&graph);
            async move {
                let chain = resolve_chain(&graph)?;
                let owner = address_param(&params, 0)?;
                let token = biguint_param(&params, 1)?;
                let amount = biguint_param(&params, 2)?;
                let receipt = chain
                    .deposit(owner, &token, &amount)
                    .await
                    .map_err(internal)?;
                Ok(receipt_json(&receipt))
            }
        });

        let operator = Arc::clone(&self.operator);
        let get_token_id = handler(move |params: Value| {
            let operator = Arc::clone(&operator);
            async move {
                let ticker = string_param(&params, 0)?;
                let id = operator.token_id(&ticker).await.map_err(internal)?;
                Ok(json!(id.to_string()))
            }
        });

        let operator = Arc::clone(&self.operator);
        let list_token = handler(move |_params: Value| {
            let operator = Arc::clone(&operator);
            async move {
                let tokens = operator.list_tokens().await.map_err(internal)?;
                Ok(json!(tokens
                    .iter()
                    .map(|t| json!({"id": t.id.to_string(), "ticker": t.ticker}))
                    .collect::<Vec<_>>()))
            }
        });

        let anchor = Arc::clone(&self.anchor);
        let get_current_eth_block = handler(move |_params: Value| {
            let anchor = Arc::clone(&anchor);
            async move {
                let head = anchor.head_block_number().await.map_err(internal)?;
                Ok(json!(head))
            }
        });

        let anchor = Arc::clone(&self.anchor);
        let get_eth_balance = handler(move |params: Value| {
            let anchor = Arc::clone(&anchor);
            async move {
                let address = address_param(&params, 0)?;
                let balance = anchor.balance(address).await.map_err(internal)?;
                Ok(json!(balance.to_string()))
            }
        });

        vec![
            ("getEthInfo", get_eth_info),
            ("getNextBlock", get_next_block),
            ("getCurrentBlock", get_current_block),
            ("submitBlock", submit_block),
            ("deposit", deposit),
            ("getTokenId", get_token_id),
            ("listToken", list_token),
            ("getCurrentEthBlock", get_current_eth_block),
            ("getEthBalance", get_eth_balance),
        ]
    }
}
