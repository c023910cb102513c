//! JSON-RPC transport for the Solana rail.
//!
//! The chain-state client talks to the network through [`ChainRpc`], so
//! tests substitute a stub chain and the HTTP client stays a thin wrapper:
//! one envelope helper, one typed method per RPC call, errors classified
//! into retryable and terminal kinds with the raw network message kept.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RailError;
use crate::types::{Address, Blockhash, CommitmentLevel, LatestBlockhash};

/// Transaction status as reported by the network.
#[derive(Clone, Debug)]
pub struct TxStatus {
    /// `processed` / `confirmed` / `finalized`, when known.
    pub confirmation_status: Option<String>,
    /// Execution error, if the transaction landed and failed.
    pub err: Option<String>,
}

/// The network surface the chain-state client needs.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Fetch a fresh transaction anchor and its validity window.
    async fn latest_blockhash(&self) -> Result<LatestBlockhash, RailError>;

    /// Current block height at the configured commitment.
    async fn block_height(&self) -> Result<u64, RailError>;

    /// Raw account data, or `None` if the account does not exist.
    async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, RailError>;

    /// Submit signed transaction wire bytes; returns the signature.
    async fn send_transaction(&self, wire: &[u8]) -> Result<String, RailError>;

    /// Status of a submitted signature, or `None` if the network has not
    /// seen it.
    async fn signature_status(&self, signature: &str) -> Result<Option<TxStatus>, RailError>;
}

/// Classify a network-reported error message.
///
/// The raw message is always preserved inside the classified kind so
/// operators can tell configuration errors from transient conditions.
pub(crate) fn classify_rpc_error(message: &str) -> RailError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("already in use") {
        RailError::CloudIdCollision(message.to_string())
    } else if lower.contains("insufficient") || lower.contains("debit an account") {
        RailError::InsufficientFunds(message.to_string())
    } else if lower.contains("invalid instruction") || lower.contains("instruction data") {
        RailError::MalformedInstruction(message.to_string())
    } else if lower.contains("blockhash not found") {
        RailError::AnchorExpired
    } else if lower.contains("node is unhealthy")
        || lower.contains("timed out")
        || lower.contains("too many requests")
    {
        RailError::NetworkTransient(message.to_string())
    } else {
        RailError::Rpc(message.to_string())
    }
}

/// Reqwest-backed JSON-RPC 2.0 client.
pub struct HttpRpcClient {
    rpc_url: String,
    commitment: CommitmentLevel,
    client: reqwest::Client,
}

impl HttpRpcClient {
    pub fn new(rpc_url: impl Into<String>, commitment: CommitmentLevel) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            commitment,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RailError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, "rpc call");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    RailError::NetworkTransient(format!("{method}: {e}"))
                } else {
                    RailError::Rpc(format!("{method}: {e}"))
                }
            })?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RailError::Rpc(format!("{method}: invalid response body: {e}")))?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error");
            return Err(classify_rpc_error(message));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| RailError::Rpc(format!("{method}: missing result in response")))
    }

    fn commitment_param(&self) -> Value {
        json!({ "commitment": self.commitment.as_str() })
    }
}

#[async_trait]
impl ChainRpc for HttpRpcClient {
    async fn latest_blockhash(&self) -> Result<LatestBlockhash, RailError> {
        let result = self
            .call("getLatestBlockhash", json!([self.commitment_param()]))
            .await?;
        let value = &result["value"];
        let blockhash: Blockhash = value["blockhash"]
            .as_str()
            .ok_or_else(|| RailError::Rpc("missing blockhash in response".into()))?
            .parse()?;
        let last_valid_block_height = value["lastValidBlockHeight"]
            .as_u64()
            .ok_or_else(|| RailError::Rpc("missing lastValidBlockHeight in response".into()))?;
        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, RailError> {
        let result = self
            .call("getBlockHeight", json!([self.commitment_param()]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| RailError::Rpc("non-numeric block height".into()))
    }

    async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, RailError> {
        let params = json!([
            address.to_base58(),
            { "encoding": "base64", "commitment": self.commitment.as_str() },
        ]);
        let result = self.call("getAccountInfo", params).await?;
        let value = &result["value"];
        if value.is_null() {
            return Ok(None);
        }
        let encoded = value["data"][0]
            .as_str()
            .ok_or_else(|| RailError::Rpc("missing account data in response".into()))?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| RailError::Rpc(format!("account data is not base64: {e}")))?;
        Ok(Some(bytes))
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String, RailError> {
        let params = json!([
            BASE64.encode(wire),
            {
                "encoding": "base64",
                "preflightCommitment": self.commitment.as_str(),
                "skipPreflight": false,
            },
        ]);
        let result = self.call("sendTransaction", params).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RailError::Rpc("non-string transaction signature".into()))
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<TxStatus>, RailError> {
        let params = json!([[signature], { "searchTransactionHistory": false }]);
        let result = self.call("getSignatureStatuses", params).await?;
        let value = &result["value"][0];
        if value.is_null() {
            return Ok(None);
        }
        let confirmation_status = value["confirmationStatus"].as_str().map(str::to_string);
        let err = match &value["err"] {
            Value::Null => None,
            other => Some(other.to_string()),
        };
        Ok(Some(TxStatus {
            confirmation_status,
            err,
        }))
    }
}

impl std::fmt::Debug for HttpRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRpcClient")
            .field("rpc_url", &self.rpc_url)
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}
