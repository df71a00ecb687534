//! Relayer submission over JSON-RPC
//!
//! Request:
//! `{"jsonrpc":"2.0","id":<unix ms>,"method":"mixer_mix","params":[signal, proof, recipient, fee, publicSignals]}`
//!
//! Response: `{"result":{"txHash":...}}` or `{"error":{"data":{"name":...}}}`.
//! No retries happen here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ErrorKind, PRE_BROADCAST_INVALID};
use crate::types::ProofPackage;

pub const MIX_METHOD: &str = "mixer_mix";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("response is not JSON: {0}")]
    Body(String),
}

/// Sends one JSON-RPC body and returns the decoded response body
#[async_trait]
pub trait RelayerTransport: Send + Sync {
    async fn post(&self, body: &Value) -> Result<Value, TransportError>;
}

pub struct HttpRelayerTransport {
    url: String,
    client: reqwest::Client,
}

impl HttpRelayerTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl RelayerTransport for HttpRelayerTransport {
    async fn post(&self, body: &Value) -> Result<Value, TransportError> {
        // Error responses carry structured JSON too, so the status code is not checked
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed relayer response: {0}")]
    Malformed(String),

    #[error("relayer rejected the proof before broadcast")]
    PreBroadcastCheckFailed,

    #[error("relayer returned error {name}")]
    Rejected { name: String },
}

impl SubmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmissionError::Transport(_) | SubmissionError::Malformed(_) => {
                ErrorKind::NetworkOrContract
            }
            SubmissionError::PreBroadcastCheckFailed => ErrorKind::PreBroadcastCheckFailed,
            SubmissionError::Rejected { name } => ErrorKind::from_relayer_error(name),
        }
    }
}

pub struct SubmissionClient {
    transport: Arc<dyn RelayerTransport>,
}

impl SubmissionClient {
    pub fn new(transport: Arc<dyn RelayerTransport>) -> Self {
        Self { transport }
    }

    /// JSON-RPC body for a package, params in wire order
    pub fn build_request(package: &ProofPackage, id: i64) -> Result<Value, SubmissionError> {
        let params = serde_json::to_value((
            &package.signal,
            &package.proof,
            &package.recipient_address,
            &package.fee_wei,
            &package.public_signals,
        ))
        .map_err(|e| SubmissionError::Malformed(e.to_string()))?;

        Ok(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": MIX_METHOD,
            "params": params,
        }))
    }

    /// Submit a package and return the transaction hash
    pub async fn submit(&self, package: ProofPackage) -> Result<String, SubmissionError> {
        let id = chrono::Utc::now().timestamp_millis();
        let request = Self::build_request(&package, id)?;

        info!(id, recipient = %package.recipient_address, "submitting withdrawal to relayer");
        let response = self.transport.post(&request).await?;

        let outcome = Self::interpret(&response);
        match &outcome {
            Ok(tx_hash) => info!(%tx_hash, "relayer accepted withdrawal"),
            Err(e) => warn!(error = %e, "relayer did not accept withdrawal"),
        }
        outcome
    }

    pub fn interpret(response: &Value) -> Result<String, SubmissionError> {
        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            let name = error
                .pointer("/data/name")
                .and_then(Value::as_str)
                .or_else(|| error.get("message").and_then(Value::as_str))
                .unwrap_or("unknown");

            if name == PRE_BROADCAST_INVALID {
                return Err(SubmissionError::PreBroadcastCheckFailed);
            }
            return Err(SubmissionError::Rejected {
                name: name.to_string(),
            });
        }

        match response.pointer("/result/txHash").and_then(Value::as_str) {
            Some(tx_hash) if !tx_hash.is_empty() => Ok(tx_hash.to_string()),
            _ => Err(SubmissionError::Malformed(
                "response has no result.txHash".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Proof, PublicSignals};

    fn package() -> ProofPackage {
        ProofPackage {
            signal: "0xsignal".to_string(),
            signal_hash: Field::from(9),
            proof: Proof {
                pi_a: vec![Field::from(1), Field::from(2)],
                pi_b: vec![vec![Field::from(3), Field::from(4)]],
                pi_c: vec![Field::from(5)],
                protocol: "groth16".to_string(),
            },
            public_signals: PublicSignals(vec![Field::from(6), Field::from(7)]),
            recipient_address: "0x1111111111111111111111111111111111111111".to_string(),
            fee_wei: Field::parse("1500000000000000000000000").unwrap(),
        }
    }

    #[test]
    fn test_request_params_order() {
        let request = SubmissionClient::build_request(&package(), 1_609_459_200_000).unwrap();

        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["id"], 1_609_459_200_000i64);
        assert_eq!(request["method"], "mixer_mix");

        let params = request["params"].as_array().unwrap();
        assert_eq!(params.len(), 5);
        assert_eq!(params[0], "0xsignal");
        assert_eq!(params[1]["pi_a"], json!(["1", "2"]));
        assert_eq!(params[2], "0x1111111111111111111111111111111111111111");
        // Exact decimal, no float rounding
        assert_eq!(params[3], "1500000000000000000000000");
        assert_eq!(params[4], json!(["6", "7"]));
    }

    #[test]
    fn test_interpret_success() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": {"txHash": "0xabc"}});
        assert_eq!(SubmissionClient::interpret(&response).unwrap(), "0xabc");
    }

    #[test]
    fn test_interpret_pre_broadcast_failure() {
        let response = json!({"error": {"data": {"name": "BACKEND_MIX_PROOF_PRE_BROADCAST_INVALID"}}});
        let err = SubmissionClient::interpret(&response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreBroadcastCheckFailed);
    }

    #[test]
    fn test_interpret_unclassified_error_names() {
        let named = json!({"error": {"code": -32000, "data": {"name": "BACKEND_MIX_GAS"}}});
        assert_eq!(
            SubmissionClient::interpret(&named).unwrap_err().kind(),
            ErrorKind::Unclassified("BACKEND_MIX_GAS".into())
        );

        let message_only = json!({"error": {"code": -32601, "message": "Method not found"}});
        assert_eq!(
            SubmissionClient::interpret(&message_only).unwrap_err().kind(),
            ErrorKind::Unclassified("Method not found".into())
        );

        let bare = json!({"error": {}});
        assert_eq!(
            SubmissionClient::interpret(&bare).unwrap_err().kind(),
            ErrorKind::Unclassified("unknown".into())
        );
    }

    #[test]
    fn test_interpret_malformed_responses() {
        for response in [json!({}), json!({"result": {}}), json!({"result": {"txHash": ""}}), json!("ok")] {
            let err = SubmissionClient::interpret(&response).unwrap_err();
            assert!(matches!(err, SubmissionError::Malformed(_)), "{}", response);
            assert_eq!(err.kind(), ErrorKind::NetworkOrContract);
        }
    }
}
