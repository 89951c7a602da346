//! Method dispatch over assembled method tables.

use crate::rpc::{RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a method call.
pub type MethodResult = Result<Value, RpcError>;

/// An async method handler over positional JSON parameters.
pub type MethodHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, MethodResult> + Send + Sync>;

/// A group of methods sharing a prefix.
pub trait MethodTable: Send + Sync {
    /// Prefix prepended to every method name in the table.
    fn prefix(&self) -> &'static str;

    /// Method names and their handlers.
    fn methods(&self) -> Vec<(&'static str, MethodHandler)>;
}

/// Request-reply dispatch over named methods.
#[derive(Default)]
pub struct Dispatcher {
    methods: HashMap<String, MethodHandler>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a method table into the global method map.
    pub fn register(&mut self, table: &dyn MethodTable) {
        for (name, handler) in table.methods() {
            let full = format!("{}{}", table.prefix(), name);
            debug!(method = full.as_str(), "Method registered");
            self.methods.insert(full, handler);
        }
    }

    /// All registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// Call a method by its full name.
    pub async fn dispatch(&self, method: &str, params: Value) -> MethodResult {
        let handler = self.methods.get(method).ok_or_else(|| {
            RpcError::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
        })?;
        handler(params).await
    }

    /// Serve a parsed request, producing the response envelope.
    pub async fn dispatch_request(&self, request: RpcRequest) -> RpcResponse {
        if request.jsonrpc != JSONRPC_VERSION {
            return RpcResponse::failure(
                request.id,
                RpcError::new(
                    crate::rpc::INVALID_REQUEST,
                    "jsonrpc version must be \"2.0\"",
                ),
            );
        }
        match self.dispatch(&request.method, request.params).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(error) => RpcResponse::failure(request.id, error),
        }
    }

    /// Serve a raw request body.
    pub async fn dispatch_raw(&self, body: &str) -> RpcResponse {
        match serde_json::from_str::<RpcRequest>(body) {
            Ok(request) => self.dispatch_request(request).await,
            Err(e) => RpcResponse::failure(
                Value::Null,
                RpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
            ),
        }
    }
}

/// Wrap an async closure as a [`MethodHandler`].
pub(crate) fn handler<F, Fut>(call: F) -> MethodHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = MethodResult> + Send + 'static,
{
    Arc::new(move |params| Box::pin(call(params)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{INVALID_REQUEST, INVALID_PARAMS};
    use serde_json::json;

    struct EchoTable;

    impl MethodTable for EchoTable {
        fn prefix(&self) -> &'static str {
            "pg_"
        }

        fn methods(&self) -> Vec<(&'static str, MethodHandler)> {
            vec![
                ("echo", handler(|params: Value| async move { Ok(params) })),
                (
                    "fail",
                    handler(|_params| async move {
                        Err(RpcError::invalid_params("always wrong"))
                    }),
                ),
            ]
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&EchoTable);
        dispatcher
    }

    #[tokio::test]
    async fn test_dispatch_resolves_prefixed_name() {
        let result = dispatcher().dispatch("pg_echo", json!([1, 2])).await.unwrap();
        assert_eq!(result, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let error = dispatcher().dispatch("pg_ghost", json!([])).await.unwrap_err();
        assert_eq!(error.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_request_envelope_success() {
        let response = dispatcher()
            .dispatch_request(RpcRequest {
                jsonrpc: "2.0".to_string(),
                method: "pg_echo".to_string(),
                params: json!(["x"]),
                id: json!(42),
            })
            .await;
        assert_eq!(response.result, Some(json!(["x"])));
        assert_eq!(response.id, json!(42));
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_wrong_version_is_invalid_request() {
        let response = dispatcher()
            .dispatch_request(RpcRequest {
                jsonrpc: "1.0".to_string(),
                method: "pg_echo".to_string(),
                params: json!([]),
                id: json!(1),
            })
            .await;
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let response = dispatcher()
            .dispatch_request(RpcRequest {
                jsonrpc: "2.0".to_string(),
                method: "pg_fail".to_string(),
                params: json!([]),
                id: json!(1),
            })
            .await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_raw_parse_error() {
        let response = dispatcher().dispatch_raw("{not json").await;
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
        assert_eq!(response.id, Value::Null);
    }

    #[tokio::test]
    async fn test_method_names_are_sorted() {
        let names = dispatcher().method_names();
        assert_eq!(names, vec!["pg_echo", "pg_fail"]);
    }
}
