//! Ledger client configuration.
//!
//! Defaults point at the public mainnet load balancers. Override via
//! environment variables or explicit construction for staging and tests.

use std::time::Duration;

use url::Url;
use zeroize::Zeroizing;

/// Whether the client may fall back to locally computed receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Startup fails without a signing key and a live ledger.
    Strict,
    /// An unreachable ledger puts the client in degraded mode.
    DegradedAllowed,
}

impl DeploymentMode {
    fn parse(var: &str, raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_lowercase().as_str() {
            "strict" | "production" => Ok(Self::Strict),
            "degraded-allowed" | "degraded_allowed" | "degraded" => Ok(Self::DegradedAllowed),
            _ => Err(ConfigError::InvalidValue(
                var.to_string(),
                "expected `strict` or `degraded-allowed`".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::DegradedAllowed => "degraded-allowed",
        })
    }
}

/// Transaction fee parameters: `max(minimum_fee, bytes * per_byte_rate)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub minimum_fee: u64,
    pub per_byte_rate: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            minimum_fee: 1000,
            per_byte_rate: 10,
        }
    }
}

/// Bounded reconnection for the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed pause before each reconnect.
    pub delay: Duration,
    /// Reconnects allowed after consecutive sessions that delivered nothing.
    pub max_attempts: u32,
}

/// Configuration for the ledger anchoring client.
///
/// Custom `Debug` redacts `signing_key`.
#[derive(Clone)]
pub struct LedgerConfig {
    /// Metadata node: health, proofs, cluster info, event stream.
    pub node_url: Url,
    /// Transaction submission endpoint.
    pub l1_url: Url,
    pub network_id: String,
    /// Data namespace written on every transaction.
    pub namespace: String,
    pub wallet_address: Option<String>,
    /// Hex Ed25519 seed. Read once at startup.
    pub signing_key: Option<Zeroizing<String>>,
    pub deployment_mode: DeploymentMode,
    /// Levels in a self-consistency Merkle proof.
    pub merkle_depth: usize,
    pub fees: FeeSchedule,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    pub proof_timeout: Duration,
    /// Path of the newline-delimited JSON event stream on the node.
    pub events_path: String,
    pub reconnect: ReconnectPolicy,
}

impl std::fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("node_url", &self.node_url)
            .field("l1_url", &self.l1_url)
            .field("network_id", &self.network_id)
            .field("namespace", &self.namespace)
            .field("wallet_address", &self.wallet_address)
            .field(
                "signing_key",
                &self.signing_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("deployment_mode", &self.deployment_mode)
            .field("merkle_depth", &self.merkle_depth)
            .field("fees", &self.fees)
            .field("probe_timeout", &self.probe_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("proof_timeout", &self.proof_timeout)
            .field("events_path", &self.events_path)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `CTIDE_LEDGER_NODE_URL` (default: `https://l0-lb-mainnet.constellationnetwork.io`)
    /// - `CTIDE_LEDGER_L1_URL` (default: `https://l1-lb-mainnet.constellationnetwork.io`)
    /// - `CTIDE_NETWORK_ID` (default: `1`)
    /// - `CTIDE_NAMESPACE` (default: `gdpr-consent`)
    /// - `CTIDE_WALLET_ADDRESS` (optional)
    /// - `CTIDE_SIGNING_KEY` (optional, hex Ed25519 seed)
    /// - `CTIDE_DEPLOYMENT_MODE` (`strict` | `degraded-allowed`, default: `degraded-allowed`)
    /// - `CTIDE_MERKLE_DEPTH` (default: 16)
    /// - `CTIDE_MIN_FEE` (default: 1000), `CTIDE_FEE_PER_BYTE` (default: 10)
    /// - `CTIDE_PROBE_TIMEOUT_SECS` (default: 30), `CTIDE_REQUEST_TIMEOUT_SECS` (default: 30),
    ///   `CTIDE_PROOF_TIMEOUT_SECS` (default: 15)
    /// - `CTIDE_EVENTS_PATH` (default: `events`)
    /// - `CTIDE_EVENT_RECONNECT_DELAY_MS` (default: 5000), `CTIDE_EVENT_MAX_RECONNECTS` (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        let deployment_mode = match std::env::var("CTIDE_DEPLOYMENT_MODE") {
            Ok(raw) => DeploymentMode::parse("CTIDE_DEPLOYMENT_MODE", &raw)?,
            Err(_) => DeploymentMode::DegradedAllowed,
        };

        Ok(Self {
            node_url: env_url(
                "CTIDE_LEDGER_NODE_URL",
                "https://l0-lb-mainnet.constellationnetwork.io",
            )?,
            l1_url: env_url(
                "CTIDE_LEDGER_L1_URL",
                "https://l1-lb-mainnet.constellationnetwork.io",
            )?,
            network_id: env_string("CTIDE_NETWORK_ID", "1"),
            namespace: env_string("CTIDE_NAMESPACE", "gdpr-consent"),
            wallet_address: env_opt("CTIDE_WALLET_ADDRESS"),
            signing_key: env_opt("CTIDE_SIGNING_KEY").map(Zeroizing::new),
            deployment_mode,
            merkle_depth: env_parse("CTIDE_MERKLE_DEPTH", 16)?,
            fees: FeeSchedule {
                minimum_fee: env_parse("CTIDE_MIN_FEE", 1000)?,
                per_byte_rate: env_parse("CTIDE_FEE_PER_BYTE", 10)?,
            },
            probe_timeout: Duration::from_secs(env_parse("CTIDE_PROBE_TIMEOUT_SECS", 30)?),
            request_timeout: Duration::from_secs(env_parse("CTIDE_REQUEST_TIMEOUT_SECS", 30)?),
            proof_timeout: Duration::from_secs(env_parse("CTIDE_PROOF_TIMEOUT_SECS", 15)?),
            events_path: env_string("CTIDE_EVENTS_PATH", "events"),
            reconnect: ReconnectPolicy {
                delay: Duration::from_millis(env_parse("CTIDE_EVENT_RECONNECT_DELAY_MS", 5000)?),
                max_attempts: env_parse("CTIDE_EVENT_MAX_RECONNECTS", 5)?,
            },
        })
    }

    /// Configuration pointing both node and submission URLs at one local
    /// server (for tests and local development). Short timeouts, fast
    /// reconnects, degraded mode allowed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `base` does not parse.
    pub fn local(base: &str) -> Result<Self, ConfigError> {
        let url =
            Url::parse(base).map_err(|e| ConfigError::InvalidUrl("local".into(), e.to_string()))?;
        Ok(Self {
            node_url: url.clone(),
            l1_url: url,
            network_id: "local".to_string(),
            namespace: "gdpr-consent".to_string(),
            wallet_address: None,
            signing_key: None,
            deployment_mode: DeploymentMode::DegradedAllowed,
            merkle_depth: ctide_crypto::DEFAULT_MERKLE_DEPTH,
            fees: FeeSchedule::default(),
            probe_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            proof_timeout: Duration::from_secs(2),
            events_path: "events".to_string(),
            reconnect: ReconnectPolicy {
                delay: Duration::from_millis(50),
                max_attempts: 2,
            },
        })
    }

    /// Set the signing key (hex seed).
    pub fn with_signing_key(mut self, seed_hex: impl Into<String>) -> Self {
        self.signing_key = Some(Zeroizing::new(seed_hex.into()));
        self
    }

    pub fn with_deployment_mode(mut self, mode: DeploymentMode) -> Self {
        self.deployment_mode = mode;
        self
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn env_string(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string(), "not a number".to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
