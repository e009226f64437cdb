//! Interception Router: picks a retrieval strategy for every intercepted
//! request before it reaches the network.

use serde::Serialize;
use sous_client::is_same_origin;
use sous_core::{AgentConfig, Error, Request, RequestKey, Response};
use url::Url;

use crate::agent::{Agent, LifecycleState};
use crate::replay;

/// Body served when a page can be satisfied by neither store nor network.
pub const OFFLINE_PAGE: &str = "<!DOCTYPE html>
<html lang=\"en\">
<head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>Offline</title></head>
<body><h1>You are offline</h1><p>This page is not available offline yet. Reconnect and try again.</p></body>
</html>
";

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Not ours: the host performs the request untouched.
    Bypass,
    /// Live data first, stored copy only when the network is unreachable.
    NetworkFirst,
    /// Stored copy first, network only on a miss.
    CacheFirst,
    /// Creation request: send now, queue for replay if unreachable.
    QueueOnFailure,
}

/// Where a returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Store,
    Offline,
    Queued,
}

/// What the host should do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchOutcome {
    Passthrough,
    Respond { source: ResponseSource, response: Response },
}

impl FetchOutcome {
    fn respond(source: ResponseSource, response: Response) -> Self {
        FetchOutcome::Respond { source, response }
    }
}

/// Classify a request.
///
/// Order matters: foreign origins are bypassed first, then the creation
/// endpoint is recognized before the generic non-GET bypass.
pub fn classify(config: &AgentConfig, origin: &Url, request: &Request) -> Strategy {
    if !is_same_origin(origin, &request.url) {
        return Strategy::Bypass;
    }

    let path = request.url.path();

    if request.method == "POST" && path.starts_with(&config.replay_path_prefix) {
        return Strategy::QueueOnFailure;
    }

    if !request.is_get() {
        return Strategy::Bypass;
    }

    if config.network_first_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
        Strategy::NetworkFirst
    } else {
        Strategy::CacheFirst
    }
}

/// Handle an intercepted request.
///
/// Until this version is activated every request passes through.
pub async fn handle_fetch(agent: &Agent, request: &Request) -> Result<FetchOutcome, Error> {
    if agent.state() != LifecycleState::Activated {
        return Ok(FetchOutcome::Passthrough);
    }

    let strategy = classify(agent.config(), agent.origin(), request);
    tracing::debug!(method = %request.method, url = %request.url, ?strategy, "routing request");

    match strategy {
        Strategy::Bypass => Ok(FetchOutcome::Passthrough),
        Strategy::NetworkFirst => network_first(agent, request).await,
        Strategy::CacheFirst => cache_first(agent, request).await,
        Strategy::QueueOnFailure => replay::send_or_queue(agent, request).await,
    }
}

async fn network_first(agent: &Agent, request: &Request) -> Result<FetchOutcome, Error> {
    match agent.network().send(request).await {
        Ok(response) => {
            if response.is_success() {
                store_runtime(agent, request, &response).await;
            }
            Ok(FetchOutcome::respond(ResponseSource::Network, response))
        }
        Err(err) if err.is_transport() => match lookup(agent, &RequestKey::from(request)).await {
            Some(response) => {
                tracing::debug!(url = %request.url, "network unreachable, serving stored copy");
                Ok(FetchOutcome::respond(ResponseSource::Store, response))
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

async fn cache_first(agent: &Agent, request: &Request) -> Result<FetchOutcome, Error> {
    if let Some(response) = lookup(agent, &RequestKey::from(request)).await {
        tracing::debug!(url = %request.url, "store hit");
        return Ok(FetchOutcome::respond(ResponseSource::Store, response));
    }

    match agent.network().send(request).await {
        Ok(response) => {
            if response.is_success() && response.is_cacheable_type() {
                store_runtime(agent, request, &response).await;
            }
            Ok(FetchOutcome::respond(ResponseSource::Network, response))
        }
        Err(err) if err.is_transport() && request.accepts_html() => {
            tracing::debug!(url = %request.url, "network unreachable, serving offline page");
            Ok(FetchOutcome::respond(ResponseSource::Offline, offline_response()))
        }
        Err(err) => Err(err),
    }
}

/// Look a key up in the current partitions. Store failures count as a miss.
async fn lookup(agent: &Agent, key: &RequestKey) -> Option<Response> {
    match agent.store().match_first(&agent.partitions(), key).await {
        Ok(hit) => hit.map(|stored| stored.response),
        Err(e) => {
            tracing::warn!(%key, error = %e, "store lookup failed");
            None
        }
    }
}

/// Keep a copy in the runtime partition. The live response is returned to
/// the caller even if the write fails.
async fn store_runtime(agent: &Agent, request: &Request, response: &Response) {
    if let Err(e) = agent.store().put(&agent.config().runtime_partition(), request, response).await {
        tracing::warn!(url = %request.url, error = %e, "failed to store response");
    }
}

pub fn offline_response() -> Response {
    Response::new(503, OFFLINE_PAGE)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_header("cache-control", "no-store")
}
