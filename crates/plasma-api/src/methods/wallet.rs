//! Wallet method table.

use super::{address_param, bytes_param, internal, PREFIX};
use crate::dispatcher::{handler, MethodHandler, MethodTable};
use plasma_providers::WalletSigner;
use serde_json::{json, Value};
use std::sync::Arc;

/// `pg_getAccounts`, `pg_createAccount`, `pg_sign`.
pub struct WalletMethods {
    signer: Arc<dyn WalletSigner>,
}

impl WalletMethods {
    /// Create the wallet table.
    pub fn new(signer: Arc<dyn WalletSigner>) -> Self {
        Self { signer }
    }
}

impl MethodTable for WalletMethods {
    fn prefix(&self) -> &'static str {
        PREFIX
    }

    fn methods(&self) -> Vec<(&'static str, MethodHandler)> {
        let signer = Arc::clone(&self.signer);
        let get_accounts = handler(move |_params: Value| {
            let signer = Arc::clone(&signer);
            async move {
                let accounts = signer.accounts().await.map_err(internal)?;
                Ok(json!(accounts
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()))
            }
        });

        let signer = Arc::clone(&self.signer);
        let create_account = handler(move |_params: Value| {
            let signer = Arc::clone(&signer);
            async move {
                let account = signer.create_account().await.map_err(internal)?;
                Ok(json!(account.to_string()))
            }
        });

        let signer = Arc::clone(&self.signer);
        let sign = handler(move |params: Value| {
            let signer = Arc::clone(&signer);
            async move {
                let address = address_param(&params, 0)?;
                let message = bytes_param(&params, 1)?;
                let signature = signer.sign(address, &message).await.map_err(internal)?;
                Ok(json!(format!("0x{}", hex::encode(signature))))
            }
        });

        vec![
            ("getAccounts", get_accounts),
            ("createAccount", create_account),
            ("sign", sign),
        ]
    }
}
