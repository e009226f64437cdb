//! The resilience agent: one instance per installed version.
//!
//! The agent is purely reactive. Each host event is handled by one call to
//! [`Agent::handle`]; [`Agent::dispatch`] runs that call as its own task and
//! hands back an [`EventTask`] that settles only once every store and
//! network operation of the handler has settled.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sous_client::Network;
use sous_core::{AgentConfig, ContentStore, Error, PartitionName, Request};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;

use crate::host::Host;
use crate::lifecycle::{self, ActivateReport, InstallReport};
use crate::notify::{self, ClickOutcome, PushOutcome, ShownNotification};
use crate::replay::{self, ReplayReport};
use crate::router::{self, FetchOutcome};

/// Where an agent version is in its install/activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this version never serves traffic.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Events delivered by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Install,
    Activate,
    Fetch {
        request: Request,
    },
    Sync {
        tag: String,
    },
    Push {
        /// JSON object, or JSON text as a string; absent when the push had no body.
        #[serde(default)]
        payload: Option<Value>,
    },
    NotificationClick {
        notification: ShownNotification,
        #[serde(default)]
        action: Option<String>,
    },
}

impl HostEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::Install => "install",
            HostEvent::Activate => "activate",
            HostEvent::Fetch { .. } => "fetch",
            HostEvent::Sync { .. } => "sync",
            HostEvent::Push { .. } => "push",
            HostEvent::NotificationClick { .. } => "notification_click",
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, HostEvent::Install | HostEvent::Activate)
    }
}

/// Result of handling one event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "result", rename_all = "snake_case")]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetch(FetchOutcome),
    Sync(ReplayReport),
    Push(PushOutcome),
    NotificationClick(ClickOutcome),
}

/// Handle to a dispatched event.
pub struct EventTask {
    handle: JoinHandle<Result<EventOutcome, Error>>,
}

impl EventTask {
    /// Whether the handler and all of its pending work have finished.
    pub fn is_settled(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the handler to settle.
    pub async fn settled(self) -> Result<EventOutcome, Error> {
        self.handle
            .await
            .map_err(|e| Error::Host(format!("event handler did not complete: {e}")))?
    }
}

/// The resilience agent for one version.
pub struct Agent {
    config: AgentConfig,
    origin: Url,
    store: ContentStore,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    state: Mutex<LifecycleState>,
    lifecycle: AsyncMutex<()>,
    notification_seq: AtomicU64,
}

impl Agent {
    /// Create an agent for `config.version` over the given store.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the configured origin does not parse.
    pub fn new(
        config: AgentConfig, store: ContentStore, network: Arc<dyn Network>, host: Arc<dyn Host>,
    ) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            config,
            origin,
            store,
            network,
            host,
            state: Mutex::new(LifecycleState::Parsed),
            lifecycle: AsyncMutex::new(()),
            notification_seq: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current partitions in lookup order: precache, then runtime.
    pub fn partitions(&self) -> [PartitionName; 2] {
        [self.config.precache_partition(), self.config.runtime_partition()]
    }

    /// Pick up where a previous process for this version left off.
    ///
    /// Starts the agent as `Activated` without reinstalling when the store
    /// records this version as active and its precache partition is still
    /// there. Returns whether the agent resumed.
    pub async fn resume(&self) -> Result<bool, Error> {
        let _guard = self.lifecycle_guard().await;
        if self.state() != LifecycleState::Parsed {
            return Ok(false);
        }

        let active = self.store.active_version().await?;
        if active.as_deref() != Some(self.config.version.as_str()) {
            tracing::debug!(active = ?active, version = %self.config.version, "no activation to resume");
            return Ok(false);
        }

        let precache = self.config.precache_partition().to_string();
        if !self.config.precache.is_empty() && !self.store.list_partitions().await?.contains(&precache) {
            tracing::warn!(partition = %precache, "active version lost its precache, reinstall required");
            return Ok(false);
        }

        self.set_state(LifecycleState::Activated);
        tracing::info!(version = %self.config.version, "resumed activated version");
        Ok(true)
    }

    /// Handle one event to completion.
    pub async fn handle(&self, event: HostEvent) -> Result<EventOutcome, Error> {
        let span = tracing::info_span!("event", kind = event.kind(), version = %self.config.version);
        async move {
            match event {
                HostEvent::Install => lifecycle::install(self).await.map(EventOutcome::Installed),
                HostEvent::Activate => lifecycle::activate(self).await.map(EventOutcome::Activated),
                HostEvent::Fetch { request } => router::handle_fetch(self, &request).await.map(EventOutcome::Fetch),
                HostEvent::Sync { tag } => replay::on_sync(self, &tag).await.map(EventOutcome::Sync),
                HostEvent::Push { payload } => notify::on_push(self, payload.as_ref()).await.map(EventOutcome::Push),
                HostEvent::NotificationClick { notification, action } => {
                    notify::on_click(self, &notification, action.as_deref())
                        .await
                        .map(EventOutcome::NotificationClick)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the event handler as its own task.
    pub fn dispatch(self: &Arc<Self>, event: HostEvent) -> EventTask {
        let agent = Arc::clone(self);
        EventTask { handle: tokio::spawn(async move { agent.handle(event).await }) }
    }

    /// Serializes install and activate against each other.
    pub(crate) async fn lifecycle_guard(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// Move from `from` to `to`, or fail without changing state.
    pub(crate) fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(Error::InvalidState(format!("cannot become {to} while {state}")));
        }
        *state = to;
        Ok(())
    }

    pub(crate) fn set_state(&self, to: LifecycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    pub(crate) fn next_notification_id(&self) -> String {
        let n = self.notification_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-notification-{n}", self.config.version)
    }
}
