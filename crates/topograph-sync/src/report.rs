//! Outcome records returned by reconciliation entry points.

use std::fmt;

use serde::Serialize;

/// What one `synchronize` run merged and pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub environments: usize,
    pub subnets: usize,
    pub nodes: usize,
    pub clusters: usize,
    pub namespaces: usize,
    pub systems: usize,
    pub components: usize,
    pub deployments: usize,
    pub links: usize,
    /// Legacy target edges rewritten to `TARGETS`.
    pub legacy_edges_rewritten: usize,
    /// Nodes placed into an implicit cluster.
    pub implicit_memberships: usize,
    /// Implicit memberships dropped because the node joined an explicit
    /// cluster or lost the family role.
    pub implicit_memberships_released: usize,
    pub pruned_deployments: Vec<String>,
    pub pruned_links: Vec<String>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} environments, {} subnets, {} nodes, {} clusters, {} systems, {} components, \
             {} deployments, {} links; pruned {} deployments and {} links",
            self.environments,
            self.subnets,
            self.nodes,
            self.clusters,
            self.systems,
            self.components,
            self.deployments,
            self.links,
            self.pruned_deployments.len(),
            self.pruned_links.len()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Ingested,
    Passed,
    Failed,
}

/// `{status, message}` as handed back to callers of ingest/validate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub message: String,
}

impl OperationResult {
    pub fn ingested(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Ingested,
            message: message.into(),
        }
    }

    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Passed,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failed,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != OperationStatus::Failed
    }
}
