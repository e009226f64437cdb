//! The host platform seam.
//!
//! The agent never shows UI or manages windows itself; it asks the host to
//! do so through [`HostCommand`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sous_core::Error;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::protocol::Outbound;

/// One button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A notification as handed to the host for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub data: Value,
}

/// Commands the agent sends to its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    ShowNotification { notification: Notification },
    CloseNotification { id: String },
    /// Focus an existing window at `url`, or open one.
    OpenWindow { url: Url },
    /// Route every open client through this agent without a reload.
    ClaimClients,
    /// Ask for a retry signal with `tag` once connectivity returns.
    RegisterSync { tag: String },
}

/// Receives commands from the agent.
#[async_trait]
pub trait Host: Send + Sync {
    async fn send(&self, command: HostCommand) -> Result<(), Error>;
}

/// Host reached over the stdio protocol: commands become output lines.
pub struct StdioHost {
    tx: UnboundedSender<Outbound>,
}

impl StdioHost {
    pub fn new(tx: UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Host for StdioHost {
    async fn send(&self, command: HostCommand) -> Result<(), Error> {
        self.tx
            .send(Outbound::Command { command })
            .map_err(|_| Error::Host("output channel closed".into()))
    }
}
