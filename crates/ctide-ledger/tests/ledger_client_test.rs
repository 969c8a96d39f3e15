//! Contract tests for LedgerClient against a mock ledger node.
//!
//! ## Endpoints Tested
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | GET | `/node/info` | `connect_*`, `recheck_*` |
//! | POST | `/transactions` | `anchor_*`, `update_*` |
//! | GET | `/merkle-proof/{id}` | `proof_*` |
//! | GET | `/cluster/info` | `network_status_*` |
//! | GET | `/data/gdpr-consent/{id}` | `query_consent_*` |
//! | GET | `/events` | `events_*` |

use std::sync::Arc;
use std::time::Duration;

use ctide_core::derive::{consent_id, controller_hash, purpose_hash, user_ref_from_email};
use ctide_core::Timestamp;
use ctide_crypto::{
    verify_detached, verify_proof, Ed25519KeyPair, Ed25519Signer, ProofSource, TransactionSigner,
};
use ctide_ledger::{
    DeploymentMode, HgtpTransaction, LedgerClient, LedgerConfig, LedgerError, LedgerEventKind,
    LedgerMode,
};
use ctide_state::{ConsentRecord, ConsentStatus, LawfulBasis, NewConsent};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn record() -> ConsentRecord {
    let user = user_ref_from_email("u1@example.com");
    let granted_at = Timestamp::from_millis(1_700_000_000_000);
    ConsentRecord::granted(NewConsent {
        consent_id: consent_id(&user, "acme", "marketing", granted_at),
        user_ref: user,
        controller_hash: controller_hash("acme"),
        purpose_hash: purpose_hash("marketing"),
        data_categories: vec!["email".into()],
        lawful_basis: LawfulBasis::Consent,
        granted_at,
        expires_at: None,
    })
}

fn signer() -> Arc<dyn TransactionSigner> {
    Arc::new(Ed25519Signer::new(Ed25519KeyPair::from_seed(&[7u8; 32])))
}

async fn mount_health(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/node/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "state": "Ready",
            "version": "2.0"
        })))
        .mount(server)
        .await;
}

async fn connected_client(server: &MockServer) -> LedgerClient {
    mount_health(server).await;
    let config = LedgerConfig::local(&server.uri()).unwrap();
    LedgerClient::connect(config, Some(signer())).await.unwrap()
}

// ── GET /node/info ───────────────────────────────────────────────────

#[tokio::test]
async fn connect_enters_connected_mode() {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;
    assert_eq!(client.mode(), LedgerMode::Connected);
    assert!(client.is_signing());
}

#[tokio::test]
async fn connect_degrades_when_ledger_unreachable() {
    let config = LedgerConfig::local("http://127.0.0.1:1").unwrap();
    let client = LedgerClient::connect(config, None).await.unwrap();
    assert_eq!(client.mode(), LedgerMode::Degraded);
}

#[tokio::test]
async fn connect_degrades_when_probe_returns_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/node/info"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let config = LedgerConfig::local(&server.uri()).unwrap();
    let client = LedgerClient::connect(config, None).await.unwrap();
    assert_eq!(client.mode(), LedgerMode::Degraded);
}

#[tokio::test]
async fn connect_strict_rejects_unreachable_ledger() {
    let config = LedgerConfig::local("http://127.0.0.1:1")
        .unwrap()
        .with_deployment_mode(DeploymentMode::Strict);
    let err = LedgerClient::connect(config, Some(signer())).await.unwrap_err();
    assert!(matches!(err, LedgerError::StartupRejected(_)));
}

#[tokio::test]
async fn connect_strict_rejects_missing_signer() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    let config = LedgerConfig::local(&server.uri())
        .unwrap()
        .with_deployment_mode(DeploymentMode::Strict);
    let err = LedgerClient::connect(config, None).await.unwrap_err();
    assert!(matches!(err, LedgerError::StartupRejected(_)));
}

#[tokio::test]
async fn recheck_promotes_degraded_client() {
    let server = MockServer::start().await;
    let config = LedgerConfig::local(&server.uri()).unwrap();
    let client = LedgerClient::degraded(config, None).unwrap();
    assert_eq!(client.mode(), LedgerMode::Degraded);

    mount_health(&server).await;
    assert_eq!(client.recheck_connection().await.unwrap(), LedgerMode::Connected);
    assert_eq!(client.mode(), LedgerMode::Connected);
}

// ── POST /transactions ───────────────────────────────────────────────

#[tokio::test]
async fn anchor_uses_ledger_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .and(body_partial_json(serde_json::json!({
            "namespace": "gdpr-consent",
            "action": "grant_consent"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "hash": "abc123",
            "height": 4242,
            "merkleRoot": "root-from-ledger"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let receipt = client.anchor_consent(&record()).await.unwrap();
    assert_eq!(receipt.transaction_hash, "abc123");
    assert_eq!(receipt.block_height, 4242);
    assert_eq!(receipt.merkle_root, "root-from-ledger");
    assert_eq!(receipt.mode, LedgerMode::Connected);
    assert!(receipt.signed);
}

#[tokio::test]
async fn anchor_falls_back_when_response_is_sparse() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "transactionHash": "tx-only"
        })))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let rec = record();
    let receipt = client.anchor_consent(&rec).await.unwrap();
    assert_eq!(receipt.transaction_hash, "tx-only");
    assert!(receipt.block_height > 0);
    let expected_root =
        ctide_crypto::self_consistency_proof(&rec.consent_id, client.config().merkle_depth).root;
    assert_eq!(receipt.merkle_root, expected_root);
}

#[tokio::test]
async fn anchor_accepts_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let receipt = client.anchor_consent(&record()).await.unwrap();
    assert_eq!(receipt.transaction_hash.len(), 64);
    assert_eq!(receipt.mode, LedgerMode::Connected);
}

#[tokio::test]
async fn anchor_surfaces_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("insufficient fee"))
        .expect(1)
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let err = client.anchor_consent(&record()).await.unwrap_err();
    match err {
        LedgerError::Rejected { status, body, .. } => {
            assert_eq!(status, 400);
            assert_eq!(body, "insufficient fee");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert_eq!(client.mode(), LedgerMode::Connected);
}

#[tokio::test]
async fn anchor_rejects_unparseable_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let err = client.anchor_consent(&record()).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidResponse { .. }));
}

#[tokio::test]
async fn submitted_envelope_signature_verifies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"hash": "h"})))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    client.anchor_consent(&record()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let post = requests
        .iter()
        .find(|r| r.url.path() == "/transactions")
        .expect("transaction was posted");
    let tx: HgtpTransaction = serde_json::from_slice(&post.body).unwrap();
    assert_eq!(tx.signatures.len(), 1);
    verify_detached(&tx.signing_bytes().unwrap(), &tx.signatures[0]).unwrap();
    assert!(tx.fee >= 1000);

    let raw: serde_json::Value = serde_json::from_slice(&post.body).unwrap();
    assert!(raw["data"].get("userRef").is_none());
    assert!(!String::from_utf8_lossy(&post.body).contains("u1@example.com"));
}

#[tokio::test]
async fn update_status_posts_status_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .and(body_partial_json(serde_json::json!({
            "action": "update_consent_status",
            "data": { "status": "revoked" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"hash": "rv"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let rec = record();
    let receipt = client
        .update_consent_status(&rec.consent_id, ConsentStatus::Revoked, Timestamp::now())
        .await
        .unwrap();
    assert_eq!(receipt.transaction_hash, "rv");
}

#[tokio::test]
async fn degraded_client_issues_local_receipts() {
    let config = LedgerConfig::local("http://127.0.0.1:1").unwrap();
    let client = LedgerClient::connect(config, None).await.unwrap();
    let receipt = client.anchor_consent(&record()).await.unwrap();
    assert_eq!(receipt.mode, LedgerMode::Degraded);
    assert!(!receipt.signed);
    assert_eq!(receipt.transaction_hash.len(), 64);
}

// ── GET /merkle-proof/{id} ───────────────────────────────────────────

#[tokio::test]
async fn proof_is_ledger_attested_when_connected() {
    let server = MockServer::start().await;
    let rec = record();
    Mock::given(method("GET"))
        .and(path(format!("/merkle-proof/{}", rec.consent_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "root": "ledger-root",
            "path": ["a", "b"],
            "leaf": "ledger-leaf",
            "verified": true
        })))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let proof = client.get_merkle_proof(&rec.consent_id).await.unwrap();
    assert_eq!(proof.source, ProofSource::LedgerAttested);
    assert_eq!(proof.root, "ledger-root");
    assert!(verify_proof(&proof));
}

#[tokio::test]
async fn proof_missing_on_ledger_is_an_error() {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;
    let err = client.get_merkle_proof(&record().consent_id).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidResponse { .. }));
}

// ── GET /cluster/info ────────────────────────────────────────────────

#[tokio::test]
async fn network_status_reports_cluster_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cluster/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "n1"}, {"id": "n2"}, {"id": "n3"}
        ])))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let status = client.get_network_status().await;
    assert!(status.connected);
    assert_eq!(status.node_count, 3);
    assert!(status.error.is_none());
}

#[tokio::test]
async fn network_status_keeps_mode_when_cluster_info_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cluster/info"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let status = client.get_network_status().await;
    assert_eq!(status.mode, LedgerMode::Connected);
    assert_eq!(status.node_count, 0);
    assert!(status.error.is_some());
}

#[tokio::test]
async fn network_status_when_degraded() {
    let config = LedgerConfig::local("http://127.0.0.1:1").unwrap();
    let client = LedgerClient::degraded(config, None).unwrap();
    let status = client.get_network_status().await;
    assert!(!status.connected);
    assert_eq!(status.mode, LedgerMode::Degraded);
    assert_eq!(status.node_count, 0);
}

// ── GET /data/gdpr-consent/{id} ──────────────────────────────────────

#[tokio::test]
async fn query_consent_returns_none_for_unknown_id() {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;
    let found = client.query_consent(&record().consent_id).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn query_consent_returns_ledger_state() {
    let server = MockServer::start().await;
    let rec = record();
    Mock::given(method("GET"))
        .and(path(format!("/data/gdpr-consent/{}", rec.consent_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "granted"
        })))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let found = client.query_consent(&rec.consent_id).await.unwrap().unwrap();
    assert_eq!(found["status"], "granted");
}

// ── GET /events ──────────────────────────────────────────────────────

#[tokio::test]
async fn events_are_broadcast_to_subscribers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "{\"type\":\"new_snapshot\",\"data\":{\"ordinal\":12}}\n\
             {\"type\":\"new_transaction\",\"data\":{\"hash\":\"t1\"}}\n",
        ))
        .mount(&server)
        .await;

    let client = connected_client(&server).await;
    let mut rx = client.subscribe();
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .unwrap();
    assert!(matches!(
        event.kind,
        LedgerEventKind::NewSnapshot | LedgerEventKind::NewTransaction
    ));
}
