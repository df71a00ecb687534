//! Integration tests for the mixer CLI
//!
//! These tests verify complete end-to-end flows:
//! - Identity → encrypted vault → withdrawal → recorded tx hash
//! - Proof pipeline over real development primitives and artifact files
//! - JSON-RPC node and relayer clients against a local HTTP server

#[cfg(test)]
mod e2e_tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use zeroize::Zeroizing;

    use crate::artifacts::ArtifactFetcher;
    use crate::chain::{function_selector, ChainContext, ChainError, ConnectionError, JsonRpcChain};
    use crate::commands::dev_artifacts::write_artifacts;
    use crate::config::ArtifactsConfig;
    use crate::crypto::{generate_identity, DevArtifacts, DevPrimitives};
    use crate::error::{ErrorKind, PRE_BROADCAST_INVALID};
    use crate::orchestrator::{
        AttemptState, OrchestratorSettings, Trigger, TriggerOutcome, WithdrawalOrchestrator,
    };
    use crate::pipeline::ProofPipeline;
    use crate::primitives::CryptoPrimitives;
    use crate::relayer::{HttpRelayerTransport, SubmissionClient, SubmissionError};
    use crate::secure_storage::DepositVault;
    use crate::store::{DepositRecord, DepositRecordStore};
    use crate::tests::support::{
        error_response, success_response, RecordingTransport, StubChain, BROADCASTER, MIXER,
    };
    use crate::timer::SystemClock;
    use crate::types::Field;

    const DEPTH: usize = 5;
    const PASSWORD: &str = "Test@Password123";
    const RECIPIENT: &str = "0x3333333333333333333333333333333333333333";

    // ==================== Helpers ====================

    fn new_record(days_ago: i64) -> (DepositRecord, Field) {
        let (private_key, nullifier) = generate_identity();
        let primitives = DevPrimitives::new(DEPTH);
        let public_key = primitives.derive_public_key(&private_key).unwrap();
        let commitment = primitives
            .derive_identity_commitment(&nullifier, &public_key)
            .unwrap();
        let record = DepositRecord::new(
            private_key,
            nullifier,
            RECIPIENT,
            Utc::now() - chrono::Duration::days(days_ago),
        );
        (record, commitment)
    }

    fn artifacts_on_disk(dir: &Path) -> ArtifactsConfig {
        let [circuit, proving_key, verification_key] =
            write_artifacts(&DevArtifacts::generate(DEPTH), dir).unwrap();
        ArtifactsConfig {
            circuit: circuit.to_string_lossy().into_owned(),
            proving_key: proving_key.to_string_lossy().into_owned(),
            verification_key: verification_key.to_string_lossy().into_owned(),
            tree_depth: DEPTH,
        }
    }

    fn orchestrator(
        record: DepositRecord,
        chain: Arc<dyn ChainContext>,
        artifacts: &ArtifactsConfig,
        submission: SubmissionClient,
        store: Arc<dyn DepositRecordStore>,
    ) -> WithdrawalOrchestrator {
        let pipeline = ProofPipeline::new(
            Arc::new(DevPrimitives::new(DEPTH)),
            chain,
            Arc::new(ArtifactFetcher::new(artifacts, Duration::from_secs(5)).unwrap()),
            BROADCASTER,
            Field::parse("1000000000000000").unwrap(),
        );
        WithdrawalOrchestrator::new(
            record,
            pipeline,
            submission,
            store,
            Arc::new(SystemClock),
            OrchestratorSettings::default(),
        )
    }

    fn node_client(url: &str, chain_id: u64) -> JsonRpcChain {
        JsonRpcChain::new(url, chain_id, MIXER, Duration::from_secs(5)).unwrap()
    }

    fn word(value: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&value.to_be_bytes());
        w
    }

    fn abi_uint256_array(values: &[Field]) -> String {
        let mut data = Vec::new();
        data.extend_from_slice(&word(32));
        data.extend_from_slice(&word(values.len() as u64));
        for value in values {
            data.extend_from_slice(&value.to_bytes32().unwrap());
        }
        format!("0x{}", hex::encode(data))
    }

    // ==================== Local HTTP server ====================

    type Responder = dyn Fn(&Value) -> (u16, Value) + Send + Sync;

    /// Serve JSON over HTTP/1.1, one request per connection
    async fn serve_json(respond: Arc<Responder>) -> (String, Arc<Mutex<Vec<Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let respond = respond.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let body = read_body(&mut socket).await;
                    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                    log.lock().unwrap().push(request.clone());

                    let (status, response) = respond(&request);
                    let payload = response.to_string();
                    let reason = if status == 200 { "OK" } else { "Internal Server Error" };
                    let head = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        reason,
                        payload.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(payload.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (url, seen)
    }

    async fn read_body(socket: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return Vec::new(),
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let body_start = header_end + 4;
        while buf.len() < body_start + length {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        buf[body_start..(body_start + length).min(buf.len())].to_vec()
    }

    /// A node on chain 1337 with the mixer deployed and the given leaves
    fn mock_node(leaves: Vec<Field>) -> Arc<Responder> {
        Arc::new(move |request: &Value| {
            let result = match request["method"].as_str().unwrap_or_default() {
                "eth_chainId" => json!("0x539"),
                "eth_getCode" => json!("0x6080604052"),
                "eth_call" => json!(abi_uint256_array(&leaves)),
                "eth_getBalance" => json!("0xde0b6b3a7640000"),
                other => {
                    return (
                        200,
                        json!({ "jsonrpc": "2.0", "id": request["id"], "error": { "code": -32601, "message": other } }),
                    )
                }
            };
            (200, json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }))
        })
    }

    // ==================== Vault + orchestrator ====================

    /// identity → vault → withdrawal → tx hash persisted on disk
    #[tokio::test]
    async fn test_withdrawal_persists_tx_hash_in_vault() {
        let dir = tempdir().unwrap();
        let vault_path = dir.path().join("deposits.enc");
        let artifacts = artifacts_on_disk(&dir.path().join("artifacts"));

        let (record, commitment) = new_record(0);
        let id = record.id();
        let vault = Arc::new(
            DepositVault::open(vault_path.clone(), Zeroizing::new(PASSWORD.to_string())).unwrap(),
        );
        vault.insert(record.clone()).unwrap();

        let chain = Arc::new(StubChain::new(vec![Field::from(1), commitment, Field::from(2)]));
        let transport = Arc::new(RecordingTransport::replying(success_response("0xfeed")));
        let orchestrator = orchestrator(
            record,
            chain,
            &artifacts,
            SubmissionClient::new(transport.clone()),
            vault,
        );

        orchestrator.activate(Utc::now());
        let outcome = orchestrator.trigger(Trigger::Manual).await;
        assert_eq!(
            outcome,
            TriggerOutcome::Started(AttemptState::Succeeded { tx_hash: "0xfeed".into() })
        );
        assert_eq!(transport.requests().len(), 1);

        let reopened = DepositVault::open(vault_path, Zeroizing::new(PASSWORD.to_string())).unwrap();
        let stored = reopened.get(&id).unwrap();
        assert_eq!(stored.withdrawal_tx_hash.as_deref(), Some("0xfeed"));
    }

    /// A reloaded, already-withdrawn record never reaches the relayer again
    #[tokio::test]
    async fn test_withdrawn_record_is_not_resubmitted() {
        let dir = tempdir().unwrap();
        let artifacts = artifacts_on_disk(dir.path());
        let (mut record, commitment) = new_record(3);
        record.withdrawal_tx_hash = Some("0xold".into());

        let transport = Arc::new(RecordingTransport::replying(success_response("0xnew")));
        let store = Arc::new(crate::store::MemoryStore::new(vec![record.clone()]));
        let orchestrator = orchestrator(
            record,
            Arc::new(StubChain::new(vec![commitment])),
            &artifacts,
            SubmissionClient::new(transport.clone()),
            store,
        );

        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        let state = orchestrator.run(rx).await;

        assert_eq!(state, AttemptState::Succeeded { tx_hash: "0xold".into() });
        assert!(transport.requests().is_empty());
    }

    /// Artifacts from a different key set make the local proof check fail
    #[tokio::test]
    async fn test_mismatched_verification_key_is_invalid_proof() {
        let dir = tempdir().unwrap();
        let mut artifacts = artifacts_on_disk(&dir.path().join("a"));
        let other = artifacts_on_disk(&dir.path().join("b"));
        artifacts.verification_key = other.verification_key;

        let (record, commitment) = new_record(0);
        let transport = Arc::new(RecordingTransport::replying(success_response("0x1")));
        let store = Arc::new(crate::store::MemoryStore::new(vec![record.clone()]));
        let orchestrator = orchestrator(
            record,
            Arc::new(StubChain::new(vec![commitment])),
            &artifacts,
            SubmissionClient::new(transport.clone()),
            store.clone(),
        );

        orchestrator.activate(Utc::now());
        let outcome = orchestrator.trigger(Trigger::Manual).await;

        assert_eq!(
            outcome,
            TriggerOutcome::Started(AttemptState::Failed(ErrorKind::InvalidProof))
        );
        assert!(transport.requests().is_empty());
        assert_eq!(store.withdrawal_writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_file_is_network_error() {
        let dir = tempdir().unwrap();
        let mut artifacts = artifacts_on_disk(dir.path());
        artifacts.proving_key = dir.path().join("absent.bin").to_string_lossy().into_owned();

        let (record, commitment) = new_record(0);
        let transport = Arc::new(RecordingTransport::replying(success_response("0x1")));
        let orchestrator = orchestrator(
            record.clone(),
            Arc::new(StubChain::new(vec![commitment])),
            &artifacts,
            SubmissionClient::new(transport.clone()),
            Arc::new(crate::store::MemoryStore::new(vec![record])),
        );

        orchestrator.activate(Utc::now());
        let outcome = orchestrator.trigger(Trigger::Manual).await;

        assert_eq!(
            outcome,
            TriggerOutcome::Started(AttemptState::Failed(ErrorKind::NetworkOrContract))
        );
        assert!(transport.requests().is_empty());
    }

    // ==================== HTTP clients ====================

    #[tokio::test]
    async fn test_json_rpc_chain_against_local_node() {
        let leaves = vec![Field::from(5), Field::from(6), Field::from(7)];
        let (url, seen) = serve_json(mock_node(leaves.clone())).await;

        let chain = node_client(&url, 1337);
        assert!(chain.connection_error().await.is_none());
        assert_eq!(chain.get_leaves().await.unwrap(), leaves);
        assert_eq!(
            chain.get_balance(RECIPIENT).await.unwrap(),
            Field::parse("1000000000000000000").unwrap()
        );

        let methods: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r["method"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            methods,
            vec!["eth_chainId", "eth_getCode", "eth_call", "eth_getBalance"]
        );

        let call = seen.lock().unwrap()[2].clone();
        assert_eq!(call["params"][0]["to"], MIXER);
        assert_eq!(
            call["params"][0]["data"],
            format!("0x{}", hex::encode(function_selector("getLeaves()")))
        );
    }

    #[tokio::test]
    async fn test_json_rpc_chain_detects_wrong_network() {
        let (url, _) = serve_json(mock_node(vec![])).await;

        let chain = node_client(&url, 1);
        let error = chain.connection_error().await.unwrap();

        assert_eq!(error, ConnectionError::UnsupportedNetwork { expected: 1, actual: 1337 });
        assert_eq!(error.kind(), ErrorKind::ConnectionUnsupportedNetwork);
    }

    #[tokio::test]
    async fn test_json_rpc_chain_detects_missing_contract() {
        let (url, _) = serve_json(Arc::new(|request: &Value| {
            let result = match request["method"].as_str().unwrap_or_default() {
                "eth_getCode" => json!("0x"),
                _ => json!("0x539"),
            };
            (200, json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }))
        }))
        .await;

        let chain = node_client(&url, 1337);
        let error = chain.get_leaves().await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::ContractNotDeployed);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let chain = node_client(&url, 1337);
        let error = chain.connection_error().await.unwrap();

        assert!(matches!(error, ConnectionError::Unreachable(_)));
        assert_eq!(error.kind(), ErrorKind::NetworkOrContract);
    }

    #[tokio::test]
    async fn test_node_rpc_error_keeps_code_and_message() {
        let (url, _) = serve_json(Arc::new(|request: &Value| {
            let body = match request["method"].as_str().unwrap_or_default() {
                "eth_call" => json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "error": { "code": -32000, "message": "execution reverted" }
                }),
                "eth_getCode" => json!({ "jsonrpc": "2.0", "id": request["id"], "result": "0x60" }),
                _ => json!({ "jsonrpc": "2.0", "id": request["id"], "result": "0x539" }),
            };
            (200, body)
        }))
        .await;

        let error = node_client(&url, 1337).get_leaves().await.unwrap_err();

        assert_eq!(
            error,
            ChainError::Rpc { code: -32000, message: "execution reverted".into() }
        );
        assert_eq!(error.kind(), ErrorKind::NetworkOrContract);
    }

    /// A node that accepts connections but never answers must not stall callers
    #[tokio::test]
    async fn test_silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let sockets = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                sockets.lock().unwrap().push(socket);
            }
        });

        let chain = JsonRpcChain::new(&url, 1337, MIXER, Duration::from_millis(300)).unwrap();
        let error = tokio::time::timeout(Duration::from_secs(5), chain.connection_error())
            .await
            .expect("connection check stalled on a silent node")
            .unwrap();

        assert!(matches!(error, ConnectionError::Unreachable(_)));
        assert_eq!(error.kind(), ErrorKind::NetworkOrContract);
    }

    #[tokio::test]
    async fn test_relayer_error_body_is_read_despite_status() {
        let (url, seen) =
            serve_json(Arc::new(|_: &Value| (500, error_response(PRE_BROADCAST_INVALID)))).await;
        let transport = HttpRelayerTransport::new(&url, Duration::from_secs(5)).unwrap();
        let client = SubmissionClient::new(Arc::new(transport));

        let package = crate::test_vectors::sample_package();
        let error = client.submit(package).await.unwrap_err();

        assert!(matches!(error, SubmissionError::PreBroadcastCheckFailed));
        assert_eq!(seen.lock().unwrap()[0]["method"], "mixer_mix");
    }

    /// Full flow over the wire: node, artifact files, relayer and vault
    #[tokio::test]
    async fn test_end_to_end_over_http() {
        let dir = tempdir().unwrap();
        let artifacts = artifacts_on_disk(&dir.path().join("artifacts"));
        let (record, commitment) = new_record(1);

        let (node_url, _) = serve_json(mock_node(vec![Field::from(9), commitment])).await;
        let (relayer_url, relayed) = serve_json(Arc::new(|request: &Value| {
            let ok = request["params"].as_array().map_or(false, |p| p.len() == 5);
            if ok {
                (200, success_response("0x5eed"))
            } else {
                (500, error_response("BAD_PARAMS"))
            }
        }))
        .await;

        let vault = Arc::new(
            DepositVault::open(dir.path().join("v.enc"), Zeroizing::new(PASSWORD.to_string()))
                .unwrap(),
        );
        vault.insert(record.clone()).unwrap();

        let transport = HttpRelayerTransport::new(&relayer_url, Duration::from_secs(5)).unwrap();
        let orchestrator = orchestrator(
            record.clone(),
            Arc::new(node_client(&node_url, 1337)),
            &artifacts,
            SubmissionClient::new(Arc::new(transport)),
            vault.clone(),
        );

        let (manual_tx, manual_rx) = tokio::sync::mpsc::channel(1);
        manual_tx.send(()).await.unwrap();
        let state = orchestrator.run(manual_rx).await;

        assert_eq!(state, AttemptState::Succeeded { tx_hash: "0x5eed".into() });
        assert_eq!(relayed.lock().unwrap().len(), 1);
        assert_eq!(
            vault.get(&record.id()).unwrap().withdrawal_tx_hash.as_deref(),
            Some("0x5eed")
        );
    }
}
