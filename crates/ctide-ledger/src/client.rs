//! # Ledger Client
//!
//! One client per process. `connect` probes the node, then either enters
//! `Connected` (and starts the event stream) or, when the deployment allows
//! it, `Degraded`. Strict deployments refuse to start without a signing key
//! and a reachable ledger.
//!
//! Submissions are sent once. A failed POST is surfaced to the caller; it is
//! not silently replaced by a locally computed receipt. Only a client that is
//! already degraded produces local receipts, and those are tagged
//! `LedgerMode::Degraded`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ctide_core::{ConsentId, ContentDigest, Timestamp};
use ctide_crypto::{self_consistency_proof, Ed25519Signer, MerkleProof, TransactionSigner};
use ctide_state::{ConsentRecord, ConsentStatus};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::{DeploymentMode, LedgerConfig};
use crate::error::LedgerError;
use crate::events::{self, LedgerEvent, EVENT_CHANNEL_CAPACITY};
use crate::receipt::{AnchoringReceipt, LedgerMode, LedgerProofResponse, NetworkStatus, SubmitResponse};
use crate::retry::retry_get;
use crate::transaction::{ConsentAction, GrantPayload, HgtpTransaction, StatusUpdatePayload};

/// Synthetic heights are `ordinal * JITTER_SPAN + (digest % JITTER_SPAN)`,
/// so they strictly increase within a process.
const JITTER_SPAN: u64 = 16;

/// Longest rejection body kept in an error.
const MAX_ERROR_BODY: usize = 256;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the consent ledger.
pub struct LedgerClient {
    http: reqwest::Client,
    config: LedgerConfig,
    signer: Option<Arc<dyn TransactionSigner>>,
    mode: RwLock<LedgerMode>,
    synthetic_height: AtomicU64,
    events: broadcast::Sender<LedgerEvent>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("config", &self.config)
            .field("signer", &self.signer)
            .field("mode", &*self.mode.read())
            .finish_non_exhaustive()
    }
}

impl LedgerClient {
    /// Build the signer named by `config.signing_key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Signing` if the key is not a 32-byte hex seed.
    /// The key itself is never part of the error.
    pub fn signer_from_config(
        config: &LedgerConfig,
    ) -> Result<Option<Arc<dyn TransactionSigner>>, LedgerError> {
        match &config.signing_key {
            Some(seed) => {
                let signer = Ed25519Signer::from_seed_hex(seed.as_str())?;
                Ok(Some(Arc::new(signer)))
            }
            None => Ok(None),
        }
    }

    fn build(
        config: LedgerConfig,
        signer: Option<Arc<dyn TransactionSigner>>,
        mode: LedgerMode,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::StartupRejected(format!("http client: {e}")))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            config,
            signer,
            mode: RwLock::new(mode),
            synthetic_height: AtomicU64::new(1),
            events,
            stream_task: Mutex::new(None),
        })
    }

    fn check_signer(
        config: &LedgerConfig,
        signer: &Option<Arc<dyn TransactionSigner>>,
    ) -> Result<(), LedgerError> {
        if config.deployment_mode == DeploymentMode::Strict && signer.is_none() {
            return Err(LedgerError::StartupRejected(
                "strict deployment requires a signing key".into(),
            ));
        }
        Ok(())
    }

    /// Probe the node and start the client.
    ///
    /// # Errors
    ///
    /// In strict mode: `StartupRejected` when no signer is supplied or the
    /// probe fails. In degraded-allowed mode a failed probe yields a
    /// degraded client instead.
    pub async fn connect(
        config: LedgerConfig,
        signer: Option<Arc<dyn TransactionSigner>>,
    ) -> Result<Self, LedgerError> {
        Self::check_signer(&config, &signer)?;
        let client = Self::build(config, signer, LedgerMode::Disconnected)?;

        match client.probe().await {
            Ok(()) => {
                *client.mode.write() = LedgerMode::Connected;
                client.start_event_stream()?;
                tracing::info!(
                    node = %client.config.node_url,
                    network = %client.config.network_id,
                    signed = client.signer.is_some(),
                    "ledger client connected"
                );
            }
            Err(e) if client.config.deployment_mode == DeploymentMode::Strict => {
                return Err(LedgerError::StartupRejected(format!(
                    "ledger unreachable in strict deployment: {e}"
                )));
            }
            Err(e) => {
                *client.mode.write() = LedgerMode::Degraded;
                tracing::warn!(
                    node = %client.config.node_url,
                    "ledger unreachable, running degraded: {e}"
                );
            }
        }
        Ok(client)
    }

    /// A client that starts degraded without probing, for offline use.
    ///
    /// # Errors
    ///
    /// `StartupRejected` in strict deployments.
    pub fn degraded(
        config: LedgerConfig,
        signer: Option<Arc<dyn TransactionSigner>>,
    ) -> Result<Self, LedgerError> {
        if config.deployment_mode == DeploymentMode::Strict {
            return Err(LedgerError::StartupRejected(
                "strict deployment cannot run degraded".into(),
            ));
        }
        Self::build(config, signer, LedgerMode::Degraded)
    }

    pub fn mode(&self) -> LedgerMode {
        *self.mode.read()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn is_signing(&self) -> bool {
        self.signer.is_some()
    }

    /// Subscribe to ledger notifications. Nothing arrives while degraded.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Anchor a newly granted consent.
    pub async fn anchor_consent(
        &self,
        record: &ConsentRecord,
    ) -> Result<AnchoringReceipt, LedgerError> {
        let payload = GrantPayload::from_record(record);
        self.submit(ConsentAction::GrantConsent, &record.consent_id, &payload)
            .await
    }

    /// Anchor a status change that took effect at `updated_at`.
    pub async fn update_consent_status(
        &self,
        consent_id: &ConsentId,
        status: ConsentStatus,
        updated_at: Timestamp,
    ) -> Result<AnchoringReceipt, LedgerError> {
        let payload = StatusUpdatePayload {
            consent_id: consent_id.clone(),
            status,
            updated_at,
        };
        self.submit(ConsentAction::UpdateConsentStatus, consent_id, &payload)
            .await
    }

    async fn submit(
        &self,
        action: ConsentAction,
        consent_id: &ConsentId,
        payload: &impl serde::Serialize,
    ) -> Result<AnchoringReceipt, LedgerError> {
        let mode = self.mode();
        if mode == LedgerMode::Disconnected {
            return Err(LedgerError::NotConnected);
        }
        if self.signer.is_none() && self.config.deployment_mode == DeploymentMode::Strict {
            return Err(LedgerError::SigningUnavailable);
        }

        let now = Timestamp::now();
        let tx = HgtpTransaction::build(
            &self.config.namespace,
            action,
            payload,
            self.config.fees,
            now,
            self.signer.as_deref(),
        )?;
        let digest = tx.digest()?;

        let receipt = match mode {
            LedgerMode::Connected => self.post_transaction(&tx, consent_id, &digest).await?,
            _ => self.local_receipt(&tx, consent_id, &digest, now),
        };
        tracing::info!(
            consent_id = %consent_id,
            action = %action,
            tx = %receipt.transaction_hash,
            height = receipt.block_height,
            mode = %receipt.mode,
            "consent transaction anchored"
        );
        Ok(receipt)
    }

    async fn post_transaction(
        &self,
        tx: &HgtpTransaction,
        consent_id: &ConsentId,
        digest: &ContentDigest,
    ) -> Result<AnchoringReceipt, LedgerError> {
        let url = endpoint(&self.config.l1_url, "transactions")?;
        let resp = self
            .http
            .post(url.clone())
            .timeout(self.config.request_timeout)
            .json(tx)
            .send()
            .await
            .map_err(|e| LedgerError::transport(url.as_str(), e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LedgerError::transport(url.as_str(), e))?;
        if !status.is_success() {
            return Err(LedgerError::Rejected {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let parsed: SubmitResponse = if body.trim().is_empty() {
            SubmitResponse::default()
        } else {
            serde_json::from_str(&body).map_err(|e| LedgerError::InvalidResponse {
                endpoint: url.to_string(),
                reason: e.to_string(),
            })?
        };

        let fallback_root = self_consistency_proof(consent_id, self.config.merkle_depth).root;
        Ok(AnchoringReceipt {
            transaction_hash: parsed.transaction_hash_or(&digest.to_hex()),
            block_height: parsed.height_or_else(|| self.next_synthetic_height(digest)),
            merkle_root: parsed.merkle_root_or(&fallback_root),
            anchoring_timestamp: tx.timestamp,
            mode: LedgerMode::Connected,
            signed: tx.is_signed(),
        })
    }

    fn local_receipt(
        &self,
        tx: &HgtpTransaction,
        consent_id: &ConsentId,
        digest: &ContentDigest,
        now: Timestamp,
    ) -> AnchoringReceipt {
        AnchoringReceipt {
            transaction_hash: digest.to_hex(),
            block_height: self.next_synthetic_height(digest),
            merkle_root: self_consistency_proof(consent_id, self.config.merkle_depth).root,
            anchoring_timestamp: now,
            mode: LedgerMode::Degraded,
            signed: tx.is_signed(),
        }
    }

    fn next_synthetic_height(&self, digest: &ContentDigest) -> u64 {
        let ordinal = self.synthetic_height.fetch_add(1, Ordering::SeqCst);
        ordinal
            .saturating_mul(JITTER_SPAN)
            .saturating_add(digest.leading_u64() % JITTER_SPAN)
    }

    /// Fetch an inclusion proof for `consent_id`.
    ///
    /// Connected clients ask the node and return a ledger-attested proof.
    /// Degraded clients return a self-consistency proof.
    pub async fn get_merkle_proof(&self, consent_id: &ConsentId) -> Result<MerkleProof, LedgerError> {
        match self.mode() {
            LedgerMode::Disconnected => Err(LedgerError::NotConnected),
            LedgerMode::Degraded => Ok(self_consistency_proof(
                consent_id,
                self.config.merkle_depth,
            )),
            LedgerMode::Connected => {
                let url = endpoint(
                    &self.config.node_url,
                    &format!("merkle-proof/{consent_id}"),
                )?;
                let proof: LedgerProofResponse = self
                    .get_json(&url, self.config.proof_timeout)
                    .await?
                    .ok_or_else(|| LedgerError::InvalidResponse {
                        endpoint: url.to_string(),
                        reason: "no proof for consent".into(),
                    })?;
                Ok(proof.into())
            }
        }
    }

    /// Current anchored state of a consent as the ledger sees it.
    /// `None` when degraded or when the ledger has no entry.
    pub async fn query_consent(
        &self,
        consent_id: &ConsentId,
    ) -> Result<Option<serde_json::Value>, LedgerError> {
        if self.mode() != LedgerMode::Connected {
            return Ok(None);
        }
        let url = endpoint(
            &self.config.node_url,
            &format!("data/{}/{consent_id}", self.config.namespace),
        )?;
        self.get_json(&url, self.config.request_timeout).await
    }

    /// Latest snapshot published by the node. `None` when degraded.
    pub async fn latest_snapshot(&self) -> Result<Option<serde_json::Value>, LedgerError> {
        if self.mode() != LedgerMode::Connected {
            return Ok(None);
        }
        let url = endpoint(&self.config.node_url, "snapshots/latest")?;
        self.get_json(&url, self.config.request_timeout).await
    }

    /// Connectivity snapshot. Never fails; problems are reported in `error`.
    pub async fn get_network_status(&self) -> NetworkStatus {
        let mode = self.mode();
        let mut status = NetworkStatus {
            connected: mode == LedgerMode::Connected,
            mode,
            network_id: self.config.network_id.clone(),
            node_url: self.config.node_url.to_string(),
            event_stream: self.stream_running(),
            node_count: 0,
            cluster: None,
            error: None,
        };
        if mode != LedgerMode::Connected {
            return status;
        }

        let cluster = match endpoint(&self.config.node_url, "cluster/info") {
            Ok(url) => self.get_json::<serde_json::Value>(&url, self.config.probe_timeout).await,
            Err(e) => Err(e),
        };
        match cluster {
            Ok(Some(info)) => {
                status.node_count = info.as_array().map(Vec::len).unwrap_or(1);
                status.cluster = Some(info);
            }
            Ok(None) => status.error = Some("cluster info not available".into()),
            Err(e) => status.error = Some(e.to_string()),
        }
        status
    }

    /// Probe the node again. A degraded client that reaches the node becomes
    /// connected and starts its event stream.
    ///
    /// # Errors
    ///
    /// In strict mode a failed probe is an error and the mode is unchanged.
    pub async fn recheck_connection(&self) -> Result<LedgerMode, LedgerError> {
        if self.mode() == LedgerMode::Disconnected {
            return Err(LedgerError::NotConnected);
        }
        match self.probe().await {
            Ok(()) => {
                let was = std::mem::replace(&mut *self.mode.write(), LedgerMode::Connected);
                if was != LedgerMode::Connected {
                    tracing::info!(node = %self.config.node_url, "ledger reachable again");
                }
                if !self.stream_running() {
                    self.start_event_stream()?;
                }
                Ok(LedgerMode::Connected)
            }
            Err(e) if self.config.deployment_mode == DeploymentMode::Strict => Err(e),
            Err(e) => {
                let was = std::mem::replace(&mut *self.mode.write(), LedgerMode::Degraded);
                if was == LedgerMode::Connected {
                    tracing::warn!(node = %self.config.node_url, "ledger lost, running degraded: {e}");
                }
                Ok(LedgerMode::Degraded)
            }
        }
    }

    /// Stop the event stream and refuse further submissions.
    pub fn close(&self) {
        if let Some(task) = self.stream_task.lock().take() {
            task.abort();
        }
        *self.mode.write() = LedgerMode::Disconnected;
        tracing::info!("ledger client closed");
    }

    async fn probe(&self) -> Result<(), LedgerError> {
        let url = endpoint(&self.config.node_url, "node/info")?;
        let resp = self
            .http
            .get(url.clone())
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| LedgerError::transport(url.as_str(), e))?;
        if !resp.status().is_success() {
            return Err(LedgerError::Rejected {
                endpoint: url.to_string(),
                status: resp.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }

    /// GET with retry. 404 maps to `None`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<Option<T>, LedgerError> {
        let resp = retry_get(url.as_str(), || {
            self.http.get(url.clone()).timeout(timeout).send()
        })
        .await
        .map_err(|e| LedgerError::transport(url.as_str(), e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = resp
            .text()
            .await
            .map_err(|e| LedgerError::transport(url.as_str(), e))?;
        if !status.is_success() {
            return Err(LedgerError::Rejected {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| LedgerError::InvalidResponse {
                endpoint: url.to_string(),
                reason: e.to_string(),
            })
    }

    fn start_event_stream(&self) -> Result<(), LedgerError> {
        let url = endpoint(&self.config.node_url, &self.config.events_path)?;
        let handle = events::spawn(
            self.http.clone(),
            url,
            self.events.clone(),
            self.config.reconnect,
        );
        if let Some(old) = self.stream_task.lock().replace(handle) {
            old.abort();
        }
        Ok(())
    }

    fn stream_running(&self) -> bool {
        self.stream_task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Drop for LedgerClient {
    fn drop(&mut self) {
        if let Some(task) = self.stream_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Join `path` onto `base`, treating `base` as a directory.
fn endpoint(base: &Url, path: &str) -> Result<Url, LedgerError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let p = format!("{}/", base.path());
        base.set_path(&p);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| LedgerError::InvalidResponse {
            endpoint: base.to_string(),
            reason: format!("cannot build url for {path}: {e}"),
        })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
