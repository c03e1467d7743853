//! JSON-RPC 2.0 envelope types and the published A2A method/error tables.

use crate::error::A2aError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes published to clients. Stable once shipped.
pub mod code {
    pub const NOT_AUTHENTICATED: i64 = -32000;
    pub const AGENT_NOT_FOUND: i64 = -32001;
    pub const MARKET_NOT_FOUND: i64 = -32002;
    pub const COALITION_NOT_FOUND: i64 = -32003;
    pub const PAYMENT_FAILED: i64 = -32004;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Method names accepted by the router.
pub mod method {
    pub const DISCOVER_AGENTS: &str = "a2a.discover";
    pub const GET_AGENT_INFO: &str = "a2a.getInfo";
    pub const GET_MARKET_DATA: &str = "a2a.getMarketData";
    pub const GET_MARKET_PRICES: &str = "a2a.getMarketPrices";
    pub const SUBSCRIBE_MARKET: &str = "a2a.subscribeMarket";
    pub const PROPOSE_COALITION: &str = "a2a.proposeCoalition";
    pub const JOIN_COALITION: &str = "a2a.joinCoalition";
    pub const COALITION_MESSAGE: &str = "a2a.coalitionMessage";
    pub const LEAVE_COALITION: &str = "a2a.leaveCoalition";
    pub const SHARE_ANALYSIS: &str = "a2a.shareAnalysis";
    pub const REQUEST_ANALYSIS: &str = "a2a.requestAnalysis";
    pub const GET_ANALYSES: &str = "a2a.getAnalyses";
    pub const PAYMENT_REQUEST: &str = "a2a.paymentRequest";
    pub const PAYMENT_RECEIPT: &str = "a2a.paymentReceipt";
}

/// Inbound request, already parsed by the transport.
///
/// `id` may be a string, a number, or null; it is echoed verbatim in the
/// response either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &A2aError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code: error.rpc_code(),
                message: error.to_string(),
            }),
        }
    }
}
