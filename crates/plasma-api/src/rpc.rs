//! JSON-RPC 2.0 request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Malformed JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Structurally invalid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// No such method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Parameters do not match the method.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal failure while serving the call.
pub const INTERNAL_ERROR: i64 = -32603;

/// Protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version; must be `"2.0"`.
    #[serde(default)]
    pub jsonrpc: String,
    /// Fully prefixed method name.
    pub method: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Value,
    /// Caller-chosen correlation id.
    #[serde(default)]
    pub id: Value,
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Stable error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl RpcError {
    /// Create an error.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// An invalid-params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// An internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    /// Call result, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error object, present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Correlation id echoed from the request.
    pub id: Value,
}

impl RpcResponse {
    /// A success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// A failure response.
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_serialisation_omits_error() {
        let response = RpcResponse::success(json!(1), json!("ok"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["result"], "ok");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failure_serialisation_omits_result() {
        let response = RpcResponse::failure(json!(7), RpcError::new(METHOD_NOT_FOUND, "nope"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["code"], -32601);
        assert!(value.get("result").is_none());
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_request_defaults() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"pg_getAccounts"}"#).unwrap();
        assert_eq!(request.params, Value::Null);
        assert_eq!(request.id, Value::Null);
    }
}
