//! Test doubles for the network and host seams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sous_client::Network;
use sous_core::{AgentConfig, ContentStore, Error, Request, Response};
use tokio::sync::Notify;
use url::Url;

use crate::agent::Agent;
use crate::host::{Host, HostCommand, Notification};
use crate::lifecycle;

pub const ORIGIN: &str = "https://recipes.test";

/// Scripted origin server keyed by request path.
///
/// Unknown paths answer 404. Offline mode and failed paths produce
/// transport errors.
#[derive(Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<Request>>,
    called: Notify,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network already serving the test precache manifest.
    pub fn with_precache() -> Self {
        let network = Self::new();
        network.serve_precache();
        network
    }

    pub fn serve_precache(&self) {
        self.respond("/", html("<h1>Recipes</h1>"));
        self.respond("/static/css/style.css", css("body { margin: 0 }"));
        self.respond(
            "/static/js/app.js",
            Response::new(200, "console.log('app')").with_header("content-type", "application/javascript"),
        );
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.failing.lock().unwrap().remove(path);
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    /// Make requests for `path` fail at the transport level.
    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold the next request until the returned handle is notified. The
    /// held request has already picked its answer.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Wait until at least `n` requests have been sent.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count() < n {
            self.called.notified().await;
        }
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn send(&self, request: &Request) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(request.clone());
        self.called.notify_one();

        let path = request.url.path();
        let result = if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(path) {
            Err(Error::Network(format!("connection refused: {}", request.url)))
        } else {
            let routes = self.routes.lock().unwrap();
            Ok(routes
                .get(path)
                .cloned()
                .unwrap_or_else(|| Response::new(404, "not found").with_header("content-type", "text/plain")))
        };

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }
}

/// Host that records every command it receives.
#[derive(Default)]
pub struct RecordingHost {
    commands: Mutex<Vec<HostCommand>>,
}

impl RecordingHost {
    pub fn commands(&self) -> Vec<HostCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                HostCommand::ShowNotification { notification } => Some(notification),
                _ => None,
            })
            .collect()
    }

    pub fn sync_registrations(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                HostCommand::RegisterSync { tag } => Some(tag),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn send(&self, command: HostCommand) -> Result<(), Error> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

pub fn test_config() -> AgentConfig {
    AgentConfig {
        origin: ORIGIN.into(),
        precache: vec!["/".into(), "/static/css/style.css".into(), "/static/js/app.js".into()],
        ..AgentConfig::default()
    }
}

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// A navigation request.
pub fn page(path: &str) -> Request {
    Request::get(url(path)).with_header("accept", "text/html,application/xhtml+xml")
}

/// A subresource request.
pub fn asset(path: &str) -> Request {
    Request::get(url(path)).with_header("accept", "*/*")
}

pub fn html(body: &str) -> Response {
    Response::new(200, body.to_string()).with_header("content-type", "text/html; charset=utf-8")
}

pub fn css(body: &str) -> Response {
    Response::new(200, body.to_string()).with_header("content-type", "text/css")
}

pub fn json(body: &str) -> Response {
    Response::new(200, body.to_string()).with_header("content-type", "application/json")
}

pub fn agent_on(
    config: AgentConfig, store: ContentStore, network: Arc<MockNetwork>, host: Arc<RecordingHost>,
) -> Agent {
    Agent::new(config, store, network, host).unwrap()
}

/// A freshly installed and activated agent over an in-memory store.
pub async fn activated_agent(network: Arc<MockNetwork>) -> (Arc<Agent>, ContentStore, Arc<RecordingHost>) {
    network.serve_precache();
    let store = ContentStore::open_in_memory().await.unwrap();
    let host = Arc::new(RecordingHost::default());
    let agent = Arc::new(agent_on(test_config(), store.clone(), network, host.clone()));

    lifecycle::install(&agent).await.unwrap();
    lifecycle::activate(&agent).await.unwrap();
    (agent, store, host)
}
