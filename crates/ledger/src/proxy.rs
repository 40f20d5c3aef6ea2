//! Review submission through a signer-proxy service.
//!
//! The proxy owns the ledger signing key. It receives review operations as
//! `ledger_submitReview` JSON-RPC calls, wraps them into a transaction
//! envelope, signs it and submits it to the ledger.

use crate::review::{ReviewOp, SubmitError, SubmitResult};
use serde::{Deserialize, Serialize};

/// Client of the ledger signer-proxy.
///
/// # Example
///
/// ```ignore
/// let proxy = SignerProxy::new("http://localhost:9061");
/// let result = proxy.submit(&op, true).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SignerProxy {
    client: reqwest::Client,
    proxy_url: String,
}

impl SignerProxy {
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), proxy_url)
    }

    /// Creates a proxy client reusing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, proxy_url: impl Into<String>) -> Self {
        Self {
            client,
            proxy_url: proxy_url.into(),
        }
    }

    /// Signs and submits a review operation.
    pub async fn submit(
        &self,
        op: &ReviewOp,
        wait_for_result: bool,
    ) -> Result<SubmitResult, SubmitError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "ledger_submitReview",
            params: (op, SubmitOptions { wait_for_result }),
            id: op.request_id,
        };

        let response = self
            .client
            .post(&self.proxy_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(SubmitError::Transport(format!(
                "signer-proxy returned {status}: {body}"
            )));
        }

        let rpc_response: JsonRpcResponse<SubmitResult> = response
            .json()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        rpc_response.into_result()
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

#[derive(Debug, Serialize)]
struct SubmitOptions {
    wait_for_result: bool,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<ResultCodes>,
}

/// Ledger result codes forwarded by the proxy when a transaction fails.
#[derive(Debug, Default, Deserialize)]
struct ResultCodes {
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default)]
    operations: Vec<String>,
}

impl<T> JsonRpcResponse<T> {
    fn into_result(self) -> Result<T, SubmitError> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(result),
            (_, Some(error)) => {
                let codes = error.data.unwrap_or_default();
                Err(SubmitError::Refused {
                    code: error.code,
                    message: error.message,
                    tx_code: codes.transaction,
                    op_codes: codes.operations,
                })
            }
            (None, None) => Err(SubmitError::Transport(
                "signer-proxy returned neither result nor error".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Result<SubmitResult, SubmitError> {
        serde_json::from_value::<JsonRpcResponse<SubmitResult>>(value)
            .unwrap()
            .into_result()
    }

    #[test]
    fn test_decode_success() {
        let result = decode(json!({ "jsonrpc": "2.0", "id": 1, "result": { "tx_hash": "abc" } }));
        assert_eq!(
            result,
            Ok(SubmitResult {
                tx_hash: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_decode_refusal_with_codes() {
        let result = decode(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32010,
                "message": "transaction failed",
                "data": { "transaction": "tx_failed", "operations": ["op_invalid_request_hash"] }
            }
        }));

        assert_eq!(
            result,
            Err(SubmitError::Refused {
                code: -32010,
                message: "transaction failed".to_string(),
                tx_code: Some("tx_failed".to_string()),
                op_codes: vec!["op_invalid_request_hash".to_string()],
            })
        );
    }

    #[test]
    fn test_decode_refusal_without_codes() {
        let result = decode(json!({ "error": { "code": 1, "message": "bad" } }));
        assert!(matches!(result, Err(SubmitError::Refused { tx_code: None, .. })));
    }

    #[test]
    fn test_decode_empty_response() {
        let result = decode(json!({ "jsonrpc": "2.0", "id": 1 }));
        assert!(matches!(result, Err(SubmitError::Transport(_))));
    }

    #[test]
    fn test_request_shape() {
        let op = ReviewOp {
            request_id: 9,
            request_hash: "h".to_string(),
            source: "G".to_string(),
            action: crate::review::ReviewAction::PermanentReject {
                reason: "Transfer failed".to_string(),
            },
        };
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "ledger_submitReview",
            params: (&op, SubmitOptions { wait_for_result: true }),
            id: op.request_id,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["method"], "ledger_submitReview");
        assert_eq!(wire["params"][0]["action"], "permanent_reject");
        assert_eq!(wire["params"][1]["wait_for_result"], true);
        assert_eq!(wire["id"], 9);
    }
}
