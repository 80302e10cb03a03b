//! JSON-RPC 2.0 client for device endpoints.
//!
//! Devices expose a single `POST http://{ip}/rpc` endpoint. Transport
//! failures, non-200 statuses and JSON-RPC error bodies are distinct error
//! variants so callers can report them accurately.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Engine;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug)]
pub enum RpcError {
    /// The action's `params` string is not valid JSON.
    Params(serde_json::Error),
    /// Connect, write or read failure, including the 10s timeout.
    Transport(reqwest::Error),
    /// The device answered with a non-200 HTTP status.
    Status(u16),
    /// The 200 body did not decode as a JSON-RPC response.
    Decode(reqwest::Error),
    /// The device answered with a JSON-RPC error object.
    Rpc {
        error: JsonRpcError,
        response: JsonRpcResponse,
    },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Params(e) => write!(f, "parsing action params: {}", e),
            RpcError::Transport(e) => write!(f, "calling device: {}", e),
            RpcError::Status(status) => write!(f, "device returned status {}", status),
            RpcError::Decode(e) => write!(f, "decoding device response: {}", e),
            RpcError::Rpc { error, .. } => {
                write!(f, "device returned error {}: {}", error.code, error.message)
            }
        }
    }
}

impl std::error::Error for RpcError {}

impl Engine {
    /// Frames and sends one JSON-RPC 2.0 request. `params` is decoded into
    /// the request when non-empty and omitted entirely otherwise. The id is
    /// always 1: device endpoints are request/response, one at a time.
    pub(crate) async fn call_json_rpc(
        &self,
        ip: &str,
        method: &str,
        params: &str,
    ) -> Result<JsonRpcResponse, RpcError> {
        let mut parsed = None;
        if !params.is_empty() {
            parsed = Some(serde_json::from_str(params).map_err(RpcError::Params)?);
        }

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: parsed,
            id: 1,
        };

        let url = format!("http://{}/rpc", ip);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(RpcError::Transport)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RpcError::Status(status.as_u16()));
        }

        let decoded: JsonRpcResponse = response.json().await.map_err(RpcError::Decode)?;
        if let Some(error) = decoded.error.clone() {
            return Err(RpcError::Rpc {
                error,
                response: decoded,
            });
        }

        Ok(decoded)
    }
}
