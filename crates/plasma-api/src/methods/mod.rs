//! Method tables exposed under the `pg_` prefix.

mod chain;
mod operator;
mod wallet;

pub use chain::ChainMethods;
pub use operator::OperatorMethods;
pub use wallet::WalletMethods;

use crate::rpc::RpcError;
use num_bigint::BigUint;
use plasma_chain::{ChainService, ExitRecord};
use plasma_proof::Transaction;
use plasma_providers::AnchorReceipt;
use plasma_services::ServiceGraph;
use plasma_state::{Address, StateObject};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

/// The method prefix shared by every table.
pub(crate) const PREFIX: &str = "pg_";

/// Map a service failure to the internal-error code.
pub(crate) fn internal<E: Display>(error: E) -> RpcError {
    RpcError::internal(error.to_string())
}

/// Resolve the started chain service through the registry.
///
/// A not-yet-started service surfaces as an internal error; callables
/// never reach a half-wired sibling.
pub(crate) fn resolve_chain(graph: &Arc<ServiceGraph>) -> Result<Arc<ChainService>, RpcError> {
    graph.get_as::<ChainService>("chain").map_err(internal)
}

// --- Positional parameter extraction ---

pub(crate) fn positional(params: &Value, index: usize) -> Result<Value, RpcError> {
    params
        .as_array()
        .and_then(|array| array.get(index))
        .cloned()
        .ok_or_else(|| RpcError::invalid_params(format!("Missing parameter {}", index)))
}

pub(crate) fn string_param(params: &Value, index: usize) -> Result<String, RpcError> {
    positional(params, index)?
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| RpcError::invalid_params(format!("Parameter {} must be a string", index)))
}

pub(crate) fn address_param(params: &Value, index: usize) -> Result<Address, RpcError> {
    string_param(params, index)?
        .parse()
        .map_err(|_| RpcError::invalid_params(format!("Parameter {} is not an address", index)))
}

pub(crate) fn biguint_param(params: &Value, index: usize) -> Result<BigUint, RpcError> {
    let value = positional(params, index)?;
    if let Some(number) = value.as_u64() {
        return Ok(BigUint::from(number));
    }
    if let Some(text) = value.as_str() {
        let parsed = if let Some(hex_digits) = text.strip_prefix("0x") {
            BigUint::parse_bytes(hex_digits.as_bytes(), 16)
        } else {
            BigUint::parse_bytes(text.as_bytes(), 10)
        };
        if let Some(parsed) = parsed {
            return Ok(parsed);
        }
    }
    Err(RpcError::invalid_params(format!(
        "Parameter {} is not an integer",
        index
    )))
}

pub(crate) fn bytes_param(params: &Value, index: usize) -> Result<Vec<u8>, RpcError> {
    let text = string_param(params, index)?;
    hex::decode(text.strip_prefix("0x").unwrap_or(&text))
        .map_err(|_| RpcError::invalid_params(format!("Parameter {} is not hex data", index)))
}

pub(crate) fn hash_param(params: &Value, index: usize) -> Result<[u8; 32], RpcError> {
    bytes_param(params, index)?
        .as_slice()
        .try_into()
        .map_err(|_| RpcError::invalid_params(format!("Parameter {} is not a 32-byte hash", index)))
}

// --- Result serialisation ---

pub(crate) fn state_object_json(object: &StateObject) -> Value {
    json!({
        "start": object.start.to_string(),
        "end": object.end.to_string(),
        "block": object.block.to_string(),
        "predicate": object.predicate.to_string(),
        "state": format!("0x{}", hex::encode(&object.state)),
    })
}

pub(crate) fn transaction_json(transaction: &Transaction) -> Value {
    json!({
        "hash": format!("0x{}", hex::encode(transaction.hash())),
        "block": transaction.block.to_string(),
        "witness": format!("0x{}", hex::encode(&transaction.witness)),
        "newState": state_object_json(&transaction.new_state),
    })
}

pub(crate) fn exit_record_json(record: &ExitRecord) -> Value {
    json!({
        "id": record.exit.id.to_string(),
        "owner": record.exit.owner.to_string(),
        "token": record.exit.token.to_string(),
        "start": record.exit.start.to_string(),
        "end": record.exit.end.to_string(),
        "block": record.exit.block.to_string(),
        "completed": record.completed,
        "finalized": record.finalized,
    })
}

pub(crate) fn receipt_json(receipt: &AnchorReceipt) -> Value {
    json!({
        "transactionHash": format!("0x{}", hex::encode(receipt.transaction_hash)),
        "blockNumber": receipt.block_number,
    })
}

pub(crate) fn balances_json(balances: &BTreeMap<BigUint, BigUint>) -> Value {
    let mut map = Map::new();
    for (token, amount) in balances {
        map.insert(token.to_string(), json!(amount.to_string()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dispatcher, INTERNAL_ERROR, INVALID_PARAMS};
    use plasma_chain::{ChainStore, SyncCursorStore};
    use plasma_proof::{OwnershipEvaluator, OwnershipState};
    use plasma_providers::{
        AnchorClient, MockAnchorClient, MockOperatorClient, MockSigner, OperatorClient,
        WalletSigner,
    };
    use plasma_services::Service;
    use plasma_storage::MemoryStorage;
    use serde_json::json;

    fn alice() -> Address {
        Address::new([0xa1; 20])
    }

    struct Fixture {
        dispatcher: Dispatcher,
        chain: Arc<ChainService>,
        anchor: Arc<MockAnchorClient>,
    }

    fn fixture(start_chain: bool) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let chain_store = Arc::new(ChainStore::new(
            Arc::clone(&storage) as Arc<dyn plasma_storage::Storage>
        ));
        let cursors = Arc::new(SyncCursorStore::new(
            Arc::clone(&storage) as Arc<dyn plasma_storage::Storage>
        ));
        let anchor = Arc::new(MockAnchorClient::new());
        let operator = Arc::new(MockOperatorClient::new());
        operator.add_token(BigUint::from(0u8), "ETH");
        let signer = Arc::new(MockSigner::with_accounts(1));

        let chain = Arc::new(ChainService::new(
            chain_store,
            cursors,
            Arc::clone(&anchor) as Arc<dyn AnchorClient>,
            Arc::clone(&operator) as Arc<dyn OperatorClient>,
            Arc::new(OwnershipEvaluator::new()),
        ));

        let graph = Arc::new(ServiceGraph::new());
        graph.register(Arc::clone(&chain) as Arc<dyn Service>).unwrap();
        if start_chain {
            graph.start().unwrap();
        }

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&ChainMethods::new(Arc::clone(&graph)));
        dispatcher.register(&WalletMethods::new(
            Arc::clone(&signer) as Arc<dyn WalletSigner>
        ));
        dispatcher.register(&OperatorMethods::new(
            Arc::clone(&graph),
            Arc::clone(&anchor) as Arc<dyn AnchorClient>,
            Arc::clone(&operator) as Arc<dyn OperatorClient>,
        ));

        Fixture {
            dispatcher,
            chain,
            anchor,
        }
    }

    async fn seed_deposit(fx: &Fixture) {
        let deposit = StateObject::new(
            0u32,
            100u32,
            1u32,
            Address::new([0xee; 20]),
            OwnershipState::new(alice(), 0u32).encode().unwrap(),
        );
        fx.chain.add_deposits(vec![deposit]).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_balances() {
        let fx = fixture(true);
        seed_deposit(&fx).await;

        let result = fx
            .dispatcher
            .dispatch("pg_getBalances", json!([alice().to_string()]))
            .await
            .unwrap();
        assert_eq!(result, json!({"0": "100"}));
    }

    #[tokio::test]
    async fn test_unstarted_chain_is_internal_error() {
        let fx = fixture(false);
        let error = fx
            .dispatcher
            .dispatch("pg_getBalances", json!([alice().to_string()]))
            .await
            .unwrap_err();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert!(error.message.contains("not started"));
    }

    #[tokio::test]
    async fn test_bad_address_is_invalid_params() {
        let fx = fixture(true);
        let error = fx
            .dispatcher
            .dispatch("pg_getBalances", json!(["0x1234"]))
            .await
            .unwrap_err();
        assert_eq!(error.code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_pick_ranges_and_insufficient_balance() {
        let fx = fixture(true);
        seed_deposit(&fx).await;

        let result = fx
            .dispatcher
            .dispatch("pg_pickRanges", json!([alice().to_string(), "0", "60"]))
            .await
            .unwrap();
        let ranges = result.as_array().unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0]["start"], "0");
        assert_eq!(ranges[0]["end"], "60");

        let error = fx
            .dispatcher
            .dispatch("pg_pickRanges", json!([alice().to_string(), "0", "500"]))
            .await
            .unwrap_err();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert!(error.message.contains("Insufficient"));
    }

    #[tokio::test]
    async fn test_wallet_surface() {
        let fx = fixture(true);

        let accounts = fx
            .dispatcher
            .dispatch("pg_getAccounts", json!([]))
            .await
            .unwrap();
        assert_eq!(accounts.as_array().unwrap().len(), 1);
        let account = accounts[0].as_str().unwrap().to_string();

        let created = fx
            .dispatcher
            .dispatch("pg_createAccount", json!([]))
            .await
            .unwrap();
        assert_ne!(created, accounts[0]);

        let signature = fx
            .dispatcher
            .dispatch("pg_sign", json!([account, "0xdeadbeef"]))
            .await
            .unwrap();
        assert!(signature.as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_operator_surface() {
        let fx = fixture(true);
        fx.anchor.set_head(77);

        let head = fx
            .dispatcher
            .dispatch("pg_getCurrentEthBlock", json!([]))
            .await
            .unwrap();
        assert_eq!(head, json!(77));

        let info = fx
            .dispatcher
            .dispatch("pg_getEthInfo", json!([]))
            .await
            .unwrap();
        assert_eq!(info["headBlock"], 77);
        assert_eq!(info["online"], true);

        let tokens = fx
            .dispatcher
            .dispatch("pg_listToken", json!([]))
            .await
            .unwrap();
        assert_eq!(tokens[0]["ticker"], "ETH");

        let token_id = fx
            .dispatcher
            .dispatch("pg_getTokenId", json!(["ETH"]))
            .await
            .unwrap();
        assert_eq!(token_id, json!("0"));
    }

    #[tokio::test]
    async fn test_deposit_and_submit_block() {
        let fx = fixture(true);

        let receipt = fx
            .dispatcher
            .dispatch("pg_deposit", json!([alice().to_string(), "0", "100"]))
            .await
            .unwrap();
        assert!(receipt["transactionHash"].as_str().unwrap().starts_with("0x"));

        let root = format!("0x{}", hex::encode([0x7c; 32]));
        fx.dispatcher
            .dispatch("pg_submitBlock", json!([root]))
            .await
            .unwrap();
        assert_eq!(fx.anchor.submitted_roots(), vec![[0x7c; 32]]);
    }

    #[tokio::test]
    async fn test_exit_surface() {
        let fx = fixture(true);
        seed_deposit(&fx).await;
        fx.anchor.set_head(1000);

        let receipts = fx
            .dispatcher
            .dispatch("pg_startExit", json!([alice().to_string(), "0", "40"]))
            .await
            .unwrap();
        assert_eq!(receipts.as_array().unwrap().len(), 1);
        assert_eq!(fx.anchor.started_exits().len(), 1);

        let exits = fx
            .dispatcher
            .dispatch("pg_getExits", json!([alice().to_string()]))
            .await
            .unwrap();
        // Exit records appear once the anchor event is applied; starting
        // an exit only sends the contract call.
        assert_eq!(exits, json!([]));
    }

    #[tokio::test]
    async fn test_get_block_header_and_last_synced() {
        let fx = fixture(true);
        fx.chain
            .chain_store()
            .set_block_header(&BigUint::from(3u8), [0x11; 32])
            .unwrap();

        let header = fx
            .dispatcher
            .dispatch("pg_getBlockHeader", json!(["3"]))
            .await
            .unwrap();
        assert_eq!(header, json!(format!("0x{}", hex::encode([0x11; 32]))));

        let missing = fx
            .dispatcher
            .dispatch("pg_getBlockHeader", json!(["4"]))
            .await
            .unwrap_err();
        assert_eq!(missing.code, INTERNAL_ERROR);

        let synced = fx
            .dispatcher
            .dispatch("pg_getLastSyncedBlock", json!([]))
            .await
            .unwrap();
        assert_eq!(synced, Value::Null);
    }

    #[tokio::test]
    async fn test_full_method_surface_is_registered() {
        let fx = fixture(true);
        let names = fx.dispatcher.method_names();
        for expected in [
            "pg_getAccounts",
            "pg_sign",
            "pg_createAccount",
            "pg_getBlockHeader",
            "pg_getTransaction",
            "pg_getLastSyncedBlock",
            "pg_sendTransaction",
            "pg_pickRanges",
            "pg_startExit",
            "pg_finalizeExits",
            "pg_getExits",
            "pg_getBalances",
            "pg_getEthInfo",
            "pg_getNextBlock",
            "pg_submitBlock",
            "pg_deposit",
            "pg_getCurrentBlock",
            "pg_getTokenId",
            "pg_listToken",
            "pg_getCurrentEthBlock",
            "pg_getEthBalance",
        ] {
            assert!(names.contains(&expected.to_string()), "{} missing", expected);
        }
    }
}
