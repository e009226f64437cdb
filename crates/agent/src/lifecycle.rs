//! Lifecycle Manager: install and activate transitions and partition
//! garbage collection.
//!
//! Install only ever writes this version's precache partition, and only
//! once every manifest asset has been fetched. Activation is the sole
//! place partitions are deleted.

use serde::Serialize;
use sous_client::resolve;
use sous_core::{Error, PartitionName, Request, Response, Role};

use crate::agent::{Agent, LifecycleState};
use crate::host::HostCommand;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub partition: String,
    pub assets: usize,
    /// The version was already activated and serving; nothing was fetched.
    pub already_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    /// Stale partitions removed.
    pub deleted: Vec<String>,
    /// Queued requests carried over from stale runtime partitions.
    pub adopted: u64,
}

/// Populate the precache partition. All-or-nothing: on any failure the
/// agent becomes redundant and the store is left untouched.
///
/// An agent that is already activated keeps serving and is not touched.
pub async fn install(agent: &Agent) -> Result<InstallReport, Error> {
    let _guard = agent.lifecycle_guard().await;
    if agent.state() == LifecycleState::Activated {
        tracing::debug!("install on active version skipped");
        return Ok(InstallReport {
            partition: agent.config().precache_partition().to_string(),
            assets: 0,
            already_active: true,
        });
    }
    agent.transition(LifecycleState::Parsed, LifecycleState::Installing)?;

    match precache(agent).await {
        Ok(report) => {
            agent.set_state(LifecycleState::Installed);
            tracing::info!(partition = %report.partition, assets = report.assets, "install complete");
            Ok(report)
        }
        Err(e) => {
            agent.set_state(LifecycleState::Redundant);
            tracing::warn!(error = %e, "install failed, version discarded");
            Err(e)
        }
    }
}

async fn precache(agent: &Agent) -> Result<InstallReport, Error> {
    let manifest = &agent.config().precache;
    let mut batch: Vec<(Request, Response)> = Vec::with_capacity(manifest.len());

    for entry in manifest {
        let url = resolve(agent.origin(), entry)
            .map_err(|e| Error::InstallFailed { url: entry.clone(), reason: e.to_string() })?;
        let request = Request::get(url);

        let response = agent
            .network()
            .send(&request)
            .await
            .map_err(|e| Error::InstallFailed { url: request.url.to_string(), reason: e.to_string() })?;

        if !response.is_success() {
            return Err(Error::InstallFailed {
                url: request.url.to_string(),
                reason: format!("status {}", response.status),
            });
        }

        batch.push((request, response));
    }

    let partition = agent.config().precache_partition();
    agent.store().put_all(&partition, &batch).await?;

    Ok(InstallReport { partition: partition.to_string(), assets: batch.len(), already_active: false })
}

/// Delete stale partitions, record this version as active and take control
/// of open clients. Activating an already active agent does nothing.
pub async fn activate(agent: &Agent) -> Result<ActivateReport, Error> {
    let _guard = agent.lifecycle_guard().await;
    if agent.state() == LifecycleState::Activated {
        tracing::debug!("already active");
        return Ok(ActivateReport { deleted: Vec::new(), adopted: 0 });
    }
    agent.transition(LifecycleState::Installed, LifecycleState::Activating)?;

    let report = match cleanup(agent).await {
        Ok(report) => report,
        Err(e) => {
            agent.set_state(LifecycleState::Installed);
            tracing::warn!(error = %e, "activation failed");
            return Err(e);
        }
    };

    agent.set_state(LifecycleState::Activated);
    tracing::info!(deleted = ?report.deleted, adopted = report.adopted, "activated");

    if let Err(e) = agent.host().send(HostCommand::ClaimClients).await {
        tracing::warn!(error = %e, "failed to claim clients");
    }

    Ok(report)
}

async fn cleanup(agent: &Agent) -> Result<ActivateReport, Error> {
    let current = agent.partitions().map(|p| p.to_string());
    let stale: Vec<String> = agent
        .store()
        .list_partitions()
        .await?
        .into_iter()
        .filter(|name| !current.contains(name))
        .collect();

    let stale_runtime: Vec<String> = stale
        .iter()
        .filter(|name| name.parse::<PartitionName>().is_ok_and(|p| p.role == Role::Runtime))
        .cloned()
        .collect();
    let adopted = agent
        .store()
        .adopt_queued(&stale_runtime, &agent.config().runtime_partition())
        .await?;

    for name in &stale {
        agent.store().delete_partition(name).await?;
        tracing::debug!(partition = %name, "deleted stale partition");
    }

    agent.store().set_active_version(&agent.config().version).await?;

    Ok(ActivateReport { deleted: stale, adopted })
}
