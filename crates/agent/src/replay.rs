//! Replay Queue Processor.
//!
//! Creation requests that cannot reach the origin are captured into the
//! runtime partition's queue. A host retry signal carrying the sync tag
//! replays every queued item once. Only items the origin accepted with a
//! success status leave the queue; the rest wait for the next signal.

use serde::Serialize;
use sous_core::{Error, Request, Response};

use crate::agent::{Agent, LifecycleState};
use crate::host::HostCommand;
use crate::router::{self, FetchOutcome, ResponseSource, Strategy};

/// Summary of one retry signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub tag: String,
    /// False when the tag was not ours or this version is not active, and
    /// nothing was scanned.
    pub recognized: bool,
    pub attempted: usize,
    pub replayed: usize,
    pub retained: usize,
}

/// Send a creation request, queueing it if the origin is unreachable.
pub async fn send_or_queue(agent: &Agent, request: &Request) -> Result<FetchOutcome, Error> {
    match agent.network().send(request).await {
        Ok(response) => Ok(FetchOutcome::Respond { source: ResponseSource::Network, response }),
        Err(err) if err.is_transport() => {
            let partition = agent.config().runtime_partition();
            let id = agent.store().enqueue(&partition, request).await?;
            tracing::info!(url = %request.url, fingerprint = %id, "origin unreachable, request queued for replay");

            let tag = agent.config().sync_tag.clone();
            if let Err(e) = agent.host().send(HostCommand::RegisterSync { tag }).await {
                tracing::warn!(error = %e, "failed to register background retry");
            }

            Ok(FetchOutcome::Respond { source: ResponseSource::Queued, response: queued_response(&id) })
        }
        Err(err) => Err(err),
    }
}

/// Handle a retry signal.
pub async fn on_sync(agent: &Agent, tag: &str) -> Result<ReplayReport, Error> {
    let mut report = ReplayReport { tag: tag.to_string(), ..Default::default() };

    if agent.state() != LifecycleState::Activated {
        tracing::debug!(tag, state = %agent.state(), "not active, replay skipped");
        return Ok(report);
    }

    if tag != agent.config().sync_tag {
        tracing::debug!(tag, "ignoring unknown retry tag");
        return Ok(report);
    }
    report.recognized = true;

    let partition = agent.config().runtime_partition();
    let items = agent.store().queued(&partition).await?;

    for item in items {
        if router::classify(agent.config(), agent.origin(), &item.request) != Strategy::QueueOnFailure {
            continue;
        }
        report.attempted += 1;

        match agent.network().send(&item.request).await {
            Ok(response) if response.is_success() => {
                match agent.store().dequeue(&partition, &item.fingerprint).await {
                    Ok(_) => report.replayed += 1,
                    Err(e) => {
                        tracing::warn!(url = %item.request.url, error = %e, "replayed but could not dequeue");
                        report.retained += 1;
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(url = %item.request.url, status = response.status, "replay rejected, keeping item");
                report.retained += 1;
            }
            Err(e) => {
                tracing::warn!(url = %item.request.url, error = %e, "replay failed, keeping item");
                report.retained += 1;
            }
        }
    }

    if report.attempted > 0 {
        tracing::info!(
            attempted = report.attempted,
            replayed = report.replayed,
            retained = report.retained,
            "replay finished"
        );
    }

    Ok(report)
}

fn queued_response(fingerprint: &str) -> Response {
    let body = serde_json::json!({
        "queued": true,
        "id": fingerprint,
        "message": "You are offline. The request was saved and will be sent when the connection is back.",
    });
    Response::new(503, body.to_string())
        .with_header("content-type", "application/json")
        .with_header("cache-control", "no-store")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockNetwork, RecordingHost, activated_agent, html, test_config, url};
    use sous_core::ContentStore;
    use std::sync::Arc;

    fn create(title: &str) -> Request {
        Request::post(url("/recipes/create/step1"), format!("title={title}"))
            .with_header("content-type", "application/x-www-form-urlencoded")
    }

    #[tokio::test]
    async fn test_online_creation_is_not_queued() {
        let network = Arc::new(MockNetwork::new());
        let (agent, store, host) = activated_agent(network.clone()).await;
        network.respond("/recipes/create/step1", Response::new(303, "").with_header("location", "/recipes/create/step2"));

        let outcome = router::handle_fetch(&agent, &create("Soup")).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Respond { source: ResponseSource::Network, .. }));
        assert!(store.queued(&agent.config().runtime_partition()).await.unwrap().is_empty());
        assert!(host.sync_registrations().is_empty());
    }

    #[tokio::test]
    async fn test_queue_lifecycle() {
        let network = Arc::new(MockNetwork::new());
        let (agent, store, host) = activated_agent(network.clone()).await;
        let partition = agent.config().runtime_partition();

        network.set_offline(true);
        let outcome = router::handle_fetch(&agent, &create("Soup")).await.unwrap();
        match outcome {
            FetchOutcome::Respond { source, response } => {
                assert_eq!(source, ResponseSource::Queued);
                assert_eq!(response.status, 503);
                assert!(String::from_utf8_lossy(&response.body).contains("\"queued\":true"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.queued(&partition).await.unwrap().len(), 1);
        assert_eq!(host.sync_registrations(), vec!["sync-recipes".to_string()]);

        network.set_offline(false);
        network.respond("/recipes/create/step1", html("<h1>Step 2</h1>"));
        network.reset_calls();

        let report = on_sync(&agent, "sync-recipes").await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.replayed, 1);
        assert_eq!(network.call_count(), 1);
        assert!(store.queued(&partition).await.unwrap().is_empty());

        let replayed = &network.calls()[0];
        assert_eq!(replayed.method, "POST");
        assert_eq!(&replayed.body[..], b"title=Soup");
        assert_eq!(replayed.header("content-type"), Some("application/x-www-form-urlencoded"));
    }

    #[tokio::test]
    async fn test_failed_replay_keeps_item() {
        let network = Arc::new(MockNetwork::new());
        let (agent, store, _host) = activated_agent(network.clone()).await;
        let partition = agent.config().runtime_partition();

        network.set_offline(true);
        router::handle_fetch(&agent, &create("Soup")).await.unwrap();
        router::handle_fetch(&agent, &create("Stew")).await.unwrap();

        let report = on_sync(&agent, "sync-recipes").await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.retained, 2);
        assert_eq!(store.queued(&partition).await.unwrap().len(), 2);

        network.set_offline(false);
        for status in [502, 403, 422] {
            network.respond("/recipes/create/step1", Response::new(status, "rejected"));
            let report = on_sync(&agent, "sync-recipes").await.unwrap();
            assert_eq!(report.retained, 2, "status {status}");
            assert_eq!(report.replayed, 0, "status {status}");
            assert_eq!(store.queued(&partition).await.unwrap().len(), 2);
        }

        network.respond("/recipes/create/step1", Response::new(200, "ok"));
        let report = on_sync(&agent, "sync-recipes").await.unwrap();
        assert_eq!(report.replayed, 2);
        assert!(store.queued(&partition).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_idempotent_on_empty_queue() {
        let network = Arc::new(MockNetwork::new());
        let (agent, store, host) = activated_agent(network.clone()).await;
        network.reset_calls();
        let commands_before = host.commands().len();
        let partitions_before = store.list_partitions().await.unwrap();

        let first = on_sync(&agent, "sync-recipes").await.unwrap();
        let second = on_sync(&agent, "sync-recipes").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.attempted, 0);
        assert_eq!(network.call_count(), 0);
        assert_eq!(host.commands().len(), commands_before);
        assert_eq!(store.list_partitions().await.unwrap(), partitions_before);
    }

    #[tokio::test]
    async fn test_unknown_tag_ignored() {
        let network = Arc::new(MockNetwork::new());
        let (agent, store, _host) = activated_agent(network.clone()).await;
        network.set_offline(true);
        router::handle_fetch(&agent, &create("Soup")).await.unwrap();
        network.set_offline(false);
        network.reset_calls();

        let report = on_sync(&agent, "sync-meal-plans").await.unwrap();
        assert!(!report.recognized);
        assert_eq!(network.call_count(), 0);
        assert_eq!(store.queued(&agent.config().runtime_partition()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_agent_does_not_replay() {
        let network = Arc::new(MockNetwork::new());
        let store = ContentStore::open_in_memory().await.unwrap();
        let agent = Agent::new(test_config(), store.clone(), network.clone(), Arc::new(RecordingHost::default())).unwrap();
        let partition = agent.config().runtime_partition();
        store.enqueue(&partition, &create("Soup")).await.unwrap();
        network.respond("/recipes/create/step1", Response::new(200, "ok"));

        let report = on_sync(&agent, "sync-recipes").await.unwrap();
        assert!(!report.recognized);
        assert_eq!(report.attempted, 0);
        assert_eq!(network.call_count(), 0);
        assert_eq!(store.queued(&partition).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_during_replay_waits_for_next_signal() {
        let network = Arc::new(MockNetwork::new());
        let (agent, store, _host) = activated_agent(network.clone()).await;
        let partition = agent.config().runtime_partition();

        network.set_offline(true);
        router::handle_fetch(&agent, &create("Soup")).await.unwrap();
        network.set_offline(false);
        network.respond("/recipes/create/step1", Response::new(200, "ok"));
        network.fail("/recipes/create/step2");
        network.reset_calls();

        let gate = network.gate();
        let replay = agent.dispatch(crate::agent::HostEvent::Sync { tag: "sync-recipes".into() });
        network.wait_for_calls(1).await;

        let late = Request::post(url("/recipes/create/step2"), "title=Stew");
        let captured = router::handle_fetch(&agent, &late).await.unwrap();
        assert!(matches!(captured, FetchOutcome::Respond { source: ResponseSource::Queued, .. }));

        gate.notify_one();
        match replay.settled().await.unwrap() {
            crate::agent::EventOutcome::Sync(report) => {
                assert_eq!(report.attempted, 1);
                assert_eq!(report.replayed, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let remaining = store.queued(&partition).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].request.url, late.url);

        network.respond("/recipes/create/step2", Response::new(200, "ok"));
        let report = on_sync(&agent, "sync-recipes").await.unwrap();
        assert_eq!(report.replayed, 1);
        assert!(store.queued(&partition).await.unwrap().is_empty());
    }
}
