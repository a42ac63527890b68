//! Read-only topology queries.

use std::collections::BTreeSet;

use serde::Serialize;
use topograph_core::{ClusterType, require_non_blank};

use crate::error::StateResult;
use crate::store::{GraphRead, GraphStore, GraphView};
use crate::types::*;

/// One deployment hosted on a node of a subnet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub hostname: String,
    pub deployment_key: String,
}

/// What else is touched if a node goes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactView {
    pub component_name: String,
    pub deployment_key: String,
    /// Destinations of links leaving the node.
    pub peer_nodes: Vec<String>,
    /// Clusters the node belongs to, as `Label:name`.
    pub source_clusters: Vec<String>,
    /// Clusters the peer nodes belong to, as `Label:name`.
    pub peer_clusters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemOverview {
    pub system_name: String,
    /// `name:version` of every owned component, sorted.
    pub components: Vec<String>,
    /// Distinct hostnames targeted by the system's deployments, sorted.
    pub target_nodes: Vec<String>,
}

/// A node that is a member of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNodeView {
    pub hostname: String,
    /// `GridCluster` or `KubernetesCluster`.
    pub cluster_type: String,
    pub cluster_name: String,
    pub ip_address: String,
}

impl GraphStore {
    /// Deployments targeting any node contained in the subnet `cidr`,
    /// ordered by hostname.
    pub fn deployments_by_subnet(&self, cidr: &str) -> StateResult<Vec<DeploymentView>> {
        require_non_blank(cidr, "subnet cidr")?;
        self.read(|view| {
            let Some(subnet) = view.lookup(&EntityRef::subnet(cidr))? else {
                return Ok(Vec::new());
            };
            let mut rows = Vec::new();
            for (node_id, node) in view.outgoing_entities(subnet, RelType::ContainsNode)? {
                let Some(node) = node.as_node() else { continue };
                for (_, deployment) in view.incoming_entities(node_id, RelType::Targets)? {
                    if let Entity::Deployment(d) = deployment {
                        rows.push(DeploymentView {
                            hostname: node.hostname.clone(),
                            deployment_key: d.deployment_key,
                        });
                    }
                }
            }
            rows.sort();
            Ok(rows)
        })
    }

    /// Deployments on `hostname` with the link peers and clusters around it.
    pub fn impact_by_node(&self, hostname: &str) -> StateResult<Vec<ImpactView>> {
        require_non_blank(hostname, "hostname")?;
        self.read(|view| {
            let Some(node) = view.lookup(&EntityRef::node(hostname))? else {
                return Ok(Vec::new());
            };

            let mut peers = BTreeSet::new();
            let mut peer_clusters = BTreeSet::new();
            for link in view.incoming(node, RelType::ConnectsFrom)? {
                for (peer_id, peer) in view.outgoing_entities(link, RelType::ConnectsTo)? {
                    if let Some(peer) = peer.as_node() {
                        peers.insert(peer.hostname.clone());
                    }
                    peer_clusters.extend(cluster_names(view, peer_id)?);
                }
            }
            let source_clusters = cluster_names(view, node)?;

            let mut rows = Vec::new();
            for (deployment_id, deployment) in view.incoming_entities(node, RelType::Targets)? {
                let Entity::Deployment(d) = deployment else { continue };
                for (_, owner) in view.incoming_entities(deployment_id, RelType::HasDeployment)? {
                    let Some(component) = owner.as_component() else { continue };
                    rows.push(ImpactView {
                        component_name: component.name.clone(),
                        deployment_key: d.deployment_key.clone(),
                        peer_nodes: peers.iter().cloned().collect(),
                        source_clusters: source_clusters.iter().cloned().collect(),
                        peer_clusters: peer_clusters.iter().cloned().collect(),
                    });
                }
            }
            rows.sort_by(|a, b| a.deployment_key.cmp(&b.deployment_key));
            Ok(rows)
        })
    }

    /// Members of every cluster named `cluster_name`, of either family,
    /// ordered by hostname.
    pub fn nodes_in_cluster(&self, cluster_name: &str) -> StateResult<Vec<ClusterNodeView>> {
        require_non_blank(cluster_name, "cluster name")?;
        self.read(|view| cluster_members(view, cluster_name, None))
    }

    /// [`GraphStore::nodes_in_cluster`] restricted to nodes of subnet `cidr`.
    pub fn nodes_in_cluster_and_subnet(
        &self,
        cluster_name: &str,
        cidr: &str,
    ) -> StateResult<Vec<ClusterNodeView>> {
        require_non_blank(cluster_name, "cluster name")?;
        require_non_blank(cidr, "subnet cidr")?;
        self.read(|view| {
            let Some(subnet) = view.lookup(&EntityRef::subnet(cidr))? else {
                return Ok(Vec::new());
            };
            let members: BTreeSet<EntityId> = view
                .outgoing(subnet, RelType::ContainsNode)?
                .into_iter()
                .collect();
            cluster_members(view, cluster_name, Some(&members))
        })
    }

    /// Components of a system and the nodes its deployments target.
    pub fn system_overview(&self, name: &str) -> StateResult<SystemOverview> {
        require_non_blank(name, "system name")?;
        self.read(|view| {
            let mut components = BTreeSet::new();
            let mut target_nodes = BTreeSet::new();
            if let Some(system) = view.lookup(&EntityRef::system(name))? {
                let owned = view.outgoing_entities(system, RelType::HasComponent)?;
                for (component_id, component) in owned {
                    components.insert(component.natural_key());
                    for deployment in view.outgoing(component_id, RelType::HasDeployment)? {
                        for (_, target) in view.outgoing_entities(deployment, RelType::Targets)? {
                            if let Some(node) = target.as_node() {
                                target_nodes.insert(node.hostname.clone());
                            }
                        }
                    }
                }
            }
            Ok(SystemOverview {
                system_name: name.to_string(),
                components: components.into_iter().collect(),
                target_nodes: target_nodes.into_iter().collect(),
            })
        })
    }
}

fn cluster_members(
    view: &GraphView,
    cluster_name: &str,
    within: Option<&BTreeSet<EntityId>>,
) -> StateResult<Vec<ClusterNodeView>> {
    let mut rows = Vec::new();
    for family in ClusterType::ALL {
        let Some(cluster) = view.lookup(&EntityRef::cluster(family, cluster_name))? else {
            continue;
        };
        for (node_id, node) in view.outgoing_entities(cluster, RelType::HasNode)? {
            let Some(node) = node.as_node() else { continue };
            if within.is_some_and(|ids| !ids.contains(&node_id)) {
                continue;
            }
            rows.push(ClusterNodeView {
                hostname: node.hostname.clone(),
                cluster_type: Label::cluster(family).to_string(),
                cluster_name: cluster_name.to_string(),
                ip_address: node.ip_address.clone(),
            });
        }
    }
    rows.sort();
    Ok(rows)
}

fn cluster_names(view: &GraphView, node: EntityId) -> StateResult<BTreeSet<String>> {
    Ok(view
        .incoming_entities(node, RelType::HasNode)?
        .into_iter()
        .filter(|(_, e)| e.label().is_cluster())
        .map(|(_, e)| format!("{}:{}", e.label(), e.natural_key()))
        .collect())
}
