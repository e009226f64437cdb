//! Newline-delimited JSON protocol spoken with the host on stdio.
//!
//! Inbound: `{"id": n, "event": {...}}`. Outbound: `{"id": n, "outcome": ...}`,
//! `{"id": n, "error": "..."}` or `{"command": {...}}`, one per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::agent::{EventOutcome, HostEvent};
use crate::error::ProtocolError;
use crate::host::HostCommand;

#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    pub id: u64,
    pub event: HostEvent,
}

/// Parse one input line.
pub fn parse_line(line: &str) -> Result<InboundEnvelope, ProtocolError> {
    let value: Value = serde_json::from_str(line).map_err(|e| ProtocolError::MalformedLine(e.to_string()))?;
    let id = value.get("id").and_then(Value::as_u64);
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidEvent { id, reason: e.to_string() })
}

/// One output line.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Outcome { id: u64, outcome: EventOutcome },
    Failure { id: Option<u64>, error: String },
    Command { command: HostCommand },
}

impl Outbound {
    pub fn failure(id: Option<u64>, err: &impl std::fmt::Display) -> Self {
        Outbound::Failure { id, error: err.to_string() }
    }
}

/// Serialize every message from `rx` as one line on `out` until all senders
/// are dropped.
pub async fn write_outbound<W>(mut rx: UnboundedReceiver<Outbound>, mut out: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(())
}
