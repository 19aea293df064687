//! JSON-RPC 2.0 transport
//!
//! Posts one request per call to the chart server endpoint and unwraps the
//! response envelope. No retries: retry policy belongs to the caller.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use chartsync_common::config::{DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SERVER_URL};
use chartsync_common::{Error, Result};

const JSONRPC_VERSION: &str = "2.0";
const REQUEST_ID: u64 = 1;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

/// Server-side error carried by a response envelope
#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Stateless JSON-RPC client bound to one endpoint
#[derive(Debug, Clone)]
pub struct RpcClient {
    http_client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RpcClient {
    /// Create a client for `endpoint` with a per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    /// Client for the default local chart server
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            DEFAULT_SERVER_URL,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke `method` and deserialize its result
    ///
    /// # Errors
    /// - `Error::Transport` on connection failure, timeout or non-2xx status
    /// - `Error::Protocol` on a malformed envelope or a server error object
    /// - `Error::EmptyResult` when the server reports success without a result
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: REQUEST_ID,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| Error::Protocol(format!("failed to encode request: {}", e)))?;

        debug!(method = %method, endpoint = %self.endpoint, "Sending JSON-RPC request");

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transport(describe_send_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                self.endpoint,
                error_text
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        decode_envelope(method, &text)
    }
}

/// Unwrap a response envelope into its result payload
fn decode_envelope<T: DeserializeOwned>(method: &str, text: &str) -> Result<T> {
    let envelope: RpcResponse<T> = serde_json::from_str(text).map_err(|e| {
        Error::Protocol(format!("failed to parse response to '{}': {}", method, e))
    })?;

    if let Some(error) = envelope.error {
        let mut message = format!("JSON-RPC error {}: {}", error.code, error.message);
        if let Some(data) = error.data.filter(|d| !d.is_null()) {
            message.push_str(&format!(" ({})", data));
        }
        return Err(Error::Protocol(message));
    }

    envelope
        .result
        .ok_or_else(|| Error::EmptyResult(method.to_string()))
}

fn describe_send_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {}", error)
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}
