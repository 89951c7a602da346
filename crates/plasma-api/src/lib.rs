//! # plasma-api
//!
//! The request/reply boundary of the client: JSON-RPC 2.0 request and
//! response shapes with their stable error codes, a [`Dispatcher`] that
//! assembles prefixed method tables into one method map, and the
//! `pg_`-prefixed tables exposing the wallet, chain and operator
//! surfaces. Wire framing (HTTP or otherwise) stays outside; callers
//! hand the dispatcher a parsed request or a raw body string.

mod dispatcher;
mod methods;
mod rpc;

pub use dispatcher::{Dispatcher, MethodHandler, MethodResult, MethodTable};
pub use methods::{ChainMethods, OperatorMethods, WalletMethods};
pub use rpc::{
    RpcError, RpcRequest, RpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
