//! sous-agent entry point.
//!
//! Boots the resilience agent for the configured version and serves host
//! events over stdio. Logging goes to stderr to avoid interfering with the
//! JSON lines protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use sous_client::{FetchConfig, HttpNetwork};
use sous_core::{AgentConfig, ContentStore, Error};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use crate::agent::{Agent, EventOutcome};
use crate::host::StdioHost;
use crate::protocol::Outbound;

mod agent;
mod error;
mod host;
mod lifecycle;
mod notify;
mod protocol;
mod replay;
mod router;
#[cfg(test)]
mod testing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AgentConfig::load()?;
    let store = ContentStore::open(&config.db_path).await?;
    let network = HttpNetwork::new(FetchConfig::from(&config))?;

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(protocol::write_outbound(rx, tokio::io::stdout()));

    let host = Arc::new(StdioHost::new(tx.clone()));
    let agent = Arc::new(Agent::new(config, store, Arc::new(network), host)?);
    let resumed = agent.resume().await?;

    tracing::info!(
        version = %agent.config().version,
        origin = %agent.origin(),
        resumed,
        "Starting sous-agent on stdio"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let envelope = match protocol::parse_line(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "rejected input line");
                reply(&tx, Outbound::failure(e.id(), &e));
                continue;
            }
        };

        let id = envelope.id;
        let inline = envelope.event.is_lifecycle();
        let task = agent.dispatch(envelope.event);

        // Lifecycle events settle before the next line is read.
        if inline {
            reply(&tx, settle(id, task.settled().await));
        } else {
            let tx = tx.clone();
            tasks.spawn(async move { reply(&tx, settle(id, task.settled().await)) });
        }

        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::warn!(error = %e, "event task aborted");
            }
        }
    }

    tracing::info!(in_flight = tasks.len(), "input closed, draining");
    while let Some(finished) = tasks.join_next().await {
        if let Err(e) = finished {
            tracing::warn!(error = %e, "event task aborted");
        }
    }

    drop(agent);
    drop(tx);
    writer.await??;

    Ok(())
}

fn settle(id: u64, result: Result<EventOutcome, Error>) -> Outbound {
    match result {
        Ok(outcome) => Outbound::Outcome { id, outcome },
        Err(e) => {
            tracing::debug!(id, error = %e, "event failed");
            Outbound::failure(Some(id), &e)
        }
    }
}

fn reply(tx: &UnboundedSender<Outbound>, message: Outbound) {
    if tx.send(message).is_err() {
        tracing::error!("output writer stopped, dropping message");
    }
}
