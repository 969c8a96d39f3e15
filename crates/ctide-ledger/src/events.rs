//! # Ledger Event Stream
//!
//! The node publishes notifications as newline-delimited JSON objects of the
//! form `{"type": "...", "data": {...}}` on a long-lived GET. A background
//! task reads them and fans them out on a `tokio::sync::broadcast` channel.
//!
//! The stream is best-effort. When it closes the task waits a fixed delay
//! and reconnects; after `max_attempts` consecutive sessions that delivered
//! nothing it gives up. The request/response path does not depend on it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::ReconnectPolicy;
use crate::error::LedgerError;

/// Capacity of the broadcast channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    NewSnapshot,
    NewTransaction,
    /// A type this client does not interpret.
    Other(String),
}

/// One notification from the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub kind: LedgerEventKind,
    pub data: serde_json::Value,
}

impl LedgerEvent {
    /// Parse one line of the stream. Blank or malformed lines yield `None`.
    pub fn parse_line(line: &[u8]) -> Option<Self> {
        let trimmed = std::str::from_utf8(line).ok()?.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("skipping malformed ledger event: {e}");
                return None;
            }
        };
        let kind = match value.get("type").and_then(|t| t.as_str()) {
            Some("new_snapshot") => LedgerEventKind::NewSnapshot,
            Some("new_transaction") => LedgerEventKind::NewTransaction,
            Some(other) => LedgerEventKind::Other(other.to_string()),
            None => return None,
        };
        let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);
        Some(Self { kind, data })
    }
}

pub(crate) fn spawn(
    http: reqwest::Client,
    url: Url,
    tx: broadcast::Sender<LedgerEvent>,
    policy: ReconnectPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut idle_sessions = 0u32;
        loop {
            match read_session(&http, &url, &tx).await {
                Ok(delivered) if delivered > 0 => {
                    idle_sessions = 0;
                    tracing::info!(delivered, "ledger event stream closed");
                }
                Ok(_) => {
                    idle_sessions += 1;
                    tracing::info!("ledger event stream closed without events");
                }
                Err(e) => {
                    idle_sessions += 1;
                    tracing::warn!("ledger event stream failed: {e}");
                }
            }
            if idle_sessions > policy.max_attempts {
                tracing::warn!(
                    attempts = policy.max_attempts,
                    "ledger event stream giving up; request path unaffected"
                );
                return;
            }
            tokio::time::sleep(policy.delay).await;
        }
    })
}

async fn read_session(
    http: &reqwest::Client,
    url: &Url,
    tx: &broadcast::Sender<LedgerEvent>,
) -> Result<usize, LedgerError> {
    let endpoint = url.as_str();
    let mut resp = http
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "application/x-ndjson")
        .send()
        .await
        .map_err(|e| LedgerError::transport(endpoint, e))?;

    if !resp.status().is_success() {
        return Err(LedgerError::Rejected {
            endpoint: endpoint.to_string(),
            status: resp.status().as_u16(),
            body: String::new(),
        });
    }

    tracing::info!(endpoint, "ledger event stream open");
    let mut buf: Vec<u8> = Vec::new();
    let mut delivered = 0usize;
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| LedgerError::transport(endpoint, e))?
    {
        buf.extend_from_slice(&chunk);
        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            if let Some(event) = LedgerEvent::parse_line(&line) {
                tracing::debug!(kind = ?event.kind, "ledger event");
                // No subscribers is fine.
                let _ = tx.send(event);
                delivered += 1;
            }
        }
    }
    if let Some(event) = LedgerEvent::parse_line(&buf) {
        let _ = tx.send(event);
        delivered += 1;
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        let e = LedgerEvent::parse_line(br#"{"type":"new_snapshot","data":{"ordinal":5}}"#).unwrap();
        assert_eq!(e.kind, LedgerEventKind::NewSnapshot);
        assert_eq!(e.data["ordinal"], 5);

        let e = LedgerEvent::parse_line(b"{\"type\":\"new_transaction\"}\n").unwrap();
        assert_eq!(e.kind, LedgerEventKind::NewTransaction);
        assert!(e.data.is_null());
    }

    #[test]
    fn preserves_unknown_types() {
        let e = LedgerEvent::parse_line(br#"{"type":"peer_joined","data":1}"#).unwrap();
        assert_eq!(e.kind, LedgerEventKind::Other("peer_joined".into()));
    }

    #[test]
    fn skips_blank_malformed_and_untyped() {
        assert!(LedgerEvent::parse_line(b"   \n").is_none());
        assert!(LedgerEvent::parse_line(b"{not json").is_none());
        assert!(LedgerEvent::parse_line(br#"{"data":1}"#).is_none());
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let (tx, _rx) = broadcast::channel(4);
        let policy = ReconnectPolicy {
            delay: std::time::Duration::from_millis(10),
            max_attempts: 2,
        };
        let url = Url::parse("http://127.0.0.1:1/events").unwrap();
        let handle = spawn(reqwest::Client::new(), url, tx, policy);
        tokio::time::timeout(std::time::Duration::from_secs(10), handle)
            .await
            .expect("task should stop on its own")
            .unwrap();
    }
}
