//! # ctide-ledger: Consent Ledger Anchoring Client
//!
//! Anchors consent grants and status changes on an external ledger and
//! returns receipts, Merkle proofs and connectivity status.
//!
//! ## Modes
//!
//! ```text
//!   connect ──probe ok──▶ Connected ──recheck fails──▶ Degraded
//!      │                     ▲                            │
//!      └──probe fails────────┼──────▶ Degraded ───────────┘
//!        (strict: error)     └────── recheck ok ──────────┘
//! ```
//!
//! `close()` moves any mode to `Disconnected`.
//!
//! A degraded client computes receipts locally: the transaction hash is the
//! envelope digest, heights are synthetic and monotonic, and Merkle roots come
//! from a self-consistency proof. Every receipt carries the mode that
//! produced it.
//!
//! ## Envelopes
//!
//! [`HgtpTransaction`] is built from a typed payload, priced by
//! [`FeeSchedule`], and signed over its canonical bytes by a
//! [`ctide_crypto::TransactionSigner`].

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod receipt;
mod retry;
pub mod transaction;

pub use client::LedgerClient;
pub use config::{ConfigError, DeploymentMode, FeeSchedule, LedgerConfig, ReconnectPolicy};
pub use error::LedgerError;
pub use events::{LedgerEvent, LedgerEventKind};
pub use receipt::{AnchoringReceipt, LedgerMode, NetworkStatus};
pub use transaction::{ConsentAction, GrantPayload, HgtpTransaction, StatusUpdatePayload};
