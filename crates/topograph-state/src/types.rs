//! Persisted graph types: labels, relationship types, entity records, edges.
//!
//! Each entity kind maps to its record by hand; there is no generic
//! property bag. The natural key of every record is derived from its
//! fields, never stored separately.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use topograph_core::{
    ClusterType, DeploymentKey, ExecutionEnvironment, HardwareNode, NetworkLink,
    SoftwareComponent, link_key,
};

use crate::error::{StateError, StateResult};

/// Surrogate id of a stored entity. Only meaningful inside one store.
pub type EntityId = u64;

// ── Labels ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    ExecutionEnvironment,
    Subnet,
    HardwareNode,
    GridCluster,
    KubernetesCluster,
    KubernetesNamespace,
    SoftwareSystem,
    SoftwareComponent,
    DeploymentInstance,
    NetworkLink,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::ExecutionEnvironment => "ExecutionEnvironment",
            Label::Subnet => "Subnet",
            Label::HardwareNode => "HardwareNode",
            Label::GridCluster => "GridCluster",
            Label::KubernetesCluster => "KubernetesCluster",
            Label::KubernetesNamespace => "KubernetesNamespace",
            Label::SoftwareSystem => "SoftwareSystem",
            Label::SoftwareComponent => "SoftwareComponent",
            Label::DeploymentInstance => "DeploymentInstance",
            Label::NetworkLink => "NetworkLink",
        }
    }

    pub fn cluster(cluster_type: ClusterType) -> Self {
        match cluster_type {
            ClusterType::Grid => Label::GridCluster,
            ClusterType::Kubernetes => Label::KubernetesCluster,
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, Label::GridCluster | Label::KubernetesCluster)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Relationship types ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelType {
    /// Subnet → HardwareNode.
    ContainsNode,
    /// Cluster → HardwareNode.
    HasNode,
    /// KubernetesCluster → KubernetesNamespace.
    HasNamespace,
    /// SoftwareSystem → SoftwareComponent.
    HasComponent,
    /// SoftwareComponent → DeploymentInstance.
    HasDeployment,
    /// DeploymentInstance → environment, node, namespace or cluster.
    Targets,
    /// NetworkLink → source HardwareNode.
    ConnectsFrom,
    /// NetworkLink → destination HardwareNode.
    ConnectsTo,
    /// Pre-`TARGETS` encoding of DeploymentInstance → ExecutionEnvironment.
    LegacyTargetEnvironment,
    /// Pre-`TARGETS` encoding of DeploymentInstance → HardwareNode.
    LegacyTargetNode,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::ContainsNode => "CONTAINS_NODE",
            RelType::HasNode => "HAS_NODE",
            RelType::HasNamespace => "HAS_NAMESPACE",
            RelType::HasComponent => "HAS_COMPONENT",
            RelType::HasDeployment => "HAS_DEPLOYMENT",
            RelType::Targets => "TARGETS",
            RelType::ConnectsFrom => "CONNECTS_FROM",
            RelType::ConnectsTo => "CONNECTS_TO",
            RelType::LegacyTargetEnvironment => "TARGET_ENVIRONMENT",
            RelType::LegacyTargetNode => "TARGET_NODE",
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, RelType::LegacyTargetEnvironment | RelType::LegacyTargetNode)
    }
}

impl FromStr for RelType {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONTAINS_NODE" => RelType::ContainsNode,
            "HAS_NODE" => RelType::HasNode,
            "HAS_NAMESPACE" => RelType::HasNamespace,
            "HAS_COMPONENT" => RelType::HasComponent,
            "HAS_DEPLOYMENT" => RelType::HasDeployment,
            "TARGETS" => RelType::Targets,
            "CONNECTS_FROM" => RelType::ConnectsFrom,
            "CONNECTS_TO" => RelType::ConnectsTo,
            "TARGET_ENVIRONMENT" => RelType::LegacyTargetEnvironment,
            "TARGET_NODE" => RelType::LegacyTargetNode,
            other => return Err(StateError::CorruptEdge(format!("unknown relationship {other}"))),
        })
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Entity records ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRecord {
    pub cidr: String,
    pub vlan: String,
    pub routing_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster_type: ClusterType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRecord {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployment_key: String,
}

/// A stored entity, one variant per entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Entity {
    Environment(ExecutionEnvironment),
    Subnet(SubnetRecord),
    Node(HardwareNode),
    Cluster(ClusterRecord),
    Namespace(NamedRecord),
    System(NamedRecord),
    Component(SoftwareComponent),
    Deployment(DeploymentRecord),
    Link(NetworkLink),
}

impl Entity {
    pub fn label(&self) -> Label {
        match self {
            Entity::Environment(_) => Label::ExecutionEnvironment,
            Entity::Subnet(_) => Label::Subnet,
            Entity::Node(_) => Label::HardwareNode,
            Entity::Cluster(c) => Label::cluster(c.cluster_type),
            Entity::Namespace(_) => Label::KubernetesNamespace,
            Entity::System(_) => Label::SoftwareSystem,
            Entity::Component(_) => Label::SoftwareComponent,
            Entity::Deployment(_) => Label::DeploymentInstance,
            Entity::Link(_) => Label::NetworkLink,
        }
    }

    pub fn natural_key(&self) -> String {
        match self {
            Entity::Environment(e) => e.name.clone(),
            Entity::Subnet(s) => s.cidr.clone(),
            Entity::Node(n) => n.hostname.clone(),
            Entity::Cluster(c) => c.name.clone(),
            Entity::Namespace(n) | Entity::System(n) => n.name.clone(),
            Entity::Component(c) => c.identity(),
            Entity::Deployment(d) => d.deployment_key.clone(),
            Entity::Link(l) => l.key(),
        }
    }

    pub fn reference(&self) -> EntityRef {
        EntityRef::new(self.label(), self.natural_key())
    }

    pub fn subnet(cidr: &str, vlan: &str, routing_zone: &str) -> Self {
        Entity::Subnet(SubnetRecord {
            cidr: cidr.to_string(),
            vlan: vlan.to_string(),
            routing_zone: routing_zone.to_string(),
        })
    }

    pub fn cluster(cluster_type: ClusterType, name: &str) -> Self {
        Entity::Cluster(ClusterRecord {
            cluster_type,
            name: name.to_string(),
        })
    }

    pub fn namespace(name: &str) -> Self {
        Entity::Namespace(NamedRecord {
            name: name.to_string(),
        })
    }

    pub fn system(name: &str) -> Self {
        Entity::System(NamedRecord {
            name: name.to_string(),
        })
    }

    pub fn deployment(key: &str) -> Self {
        Entity::Deployment(DeploymentRecord {
            deployment_key: key.to_string(),
        })
    }

    pub fn as_node(&self) -> Option<&HardwareNode> {
        match self {
            Entity::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&SoftwareComponent> {
        match self {
            Entity::Component(c) => Some(c),
            _ => None,
        }
    }
}

// ── References ────────────────────────────────────────────────────

/// Label + natural key; how callers name an entity without knowing its id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub label: Label,
    pub key: String,
}

impl EntityRef {
    pub fn new(label: Label, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }

    pub fn environment(name: &str) -> Self {
        Self::new(Label::ExecutionEnvironment, name)
    }

    pub fn subnet(cidr: &str) -> Self {
        Self::new(Label::Subnet, cidr)
    }

    pub fn node(hostname: &str) -> Self {
        Self::new(Label::HardwareNode, hostname)
    }

    pub fn cluster(cluster_type: ClusterType, name: &str) -> Self {
        Self::new(Label::cluster(cluster_type), name)
    }

    pub fn namespace(name: &str) -> Self {
        Self::new(Label::KubernetesNamespace, name)
    }

    pub fn system(name: &str) -> Self {
        Self::new(Label::SoftwareSystem, name)
    }

    pub fn component(name: &str, version: &str) -> Self {
        Self::new(Label::SoftwareComponent, format!("{name}:{version}"))
    }

    pub fn deployment(key: &DeploymentKey) -> Self {
        Self::new(Label::DeploymentInstance, key.to_string())
    }

    pub fn link(from_hostname: &str, to_hostname: &str) -> Self {
        Self::new(Label::NetworkLink, link_key(from_hostname, to_hostname))
    }

    /// Key in the natural-key index table.
    pub fn index_key(&self) -> String {
        format!("{}/{}", self.label, self.key)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.label, self.key)
    }
}

// ── Edges ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub from: EntityId,
    pub rel: RelType,
    pub to: EntityId,
}

impl Edge {
    pub fn new(from: EntityId, rel: RelType, to: EntityId) -> Self {
        Self { from, rel, to }
    }

    /// Build the composite key for the edges table.
    pub fn table_key(&self) -> String {
        format!("{:020}|{}|{:020}", self.from, self.rel, self.to)
    }

    /// Key for the reverse index: `{to:020}|{TYPE}|{from:020}`.
    pub fn reverse_key(&self) -> String {
        format!("{:020}|{}|{:020}", self.to, self.rel, self.from)
    }

    /// Inclusive lower bound of the key range holding every edge keyed by
    /// `id` first. Works for both the forward and the reverse table.
    pub fn range_start(id: EntityId) -> String {
        format!("{id:020}|")
    }

    /// Exclusive upper bound matching [`Edge::range_start`] (`}` sorts after `|`).
    pub fn range_end(id: EntityId) -> String {
        format!("{id:020}}}")
    }

    pub fn parse(key: &str) -> StateResult<Self> {
        let (from, rel, to) = split_key(key)?;
        Ok(Self { from, rel, to })
    }

    /// Parse a key from the reverse index.
    pub fn parse_reverse(key: &str) -> StateResult<Self> {
        let (to, rel, from) = split_key(key)?;
        Ok(Self { from, rel, to })
    }
}

fn split_key(key: &str) -> StateResult<(EntityId, RelType, EntityId)> {
    let corrupt = || StateError::CorruptEdge(key.to_string());
    let mut parts = key.split('|');
    let (Some(first), Some(rel), Some(second), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(corrupt());
    };
    Ok((
        first.parse().map_err(|_| corrupt())?,
        rel.parse()?,
        second.parse().map_err(|_| corrupt())?,
    ))
}

// ── Dumps ─────────────────────────────────────────────────────────

/// Store-independent view of the whole graph: entities and edges named by
/// natural key, sorted. Two stores holding the same topology dump equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphDump {
    pub entities: Vec<DumpEntity>,
    pub edges: Vec<DumpEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpEntity {
    pub reference: EntityRef,
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DumpEdge {
    pub from: EntityRef,
    pub rel: RelType,
    pub to: EntityRef,
}

impl GraphDump {
    pub fn count(&self, label: Label) -> usize {
        self.entities
            .iter()
            .filter(|e| e.reference.label == label)
            .count()
    }

    pub fn contains(&self, reference: &EntityRef) -> bool {
        self.entities.iter().any(|e| &e.reference == reference)
    }

    pub fn has_edge(&self, from: &EntityRef, rel: RelType, to: &EntityRef) -> bool {
        self.edges
            .iter()
            .any(|e| &e.from == from && e.rel == rel && &e.to == to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topograph_core::NodeType;

    #[test]
    fn edge_key_round_trips() {
        let edge = Edge::new(7, RelType::HasDeployment, 42);
        let key = edge.table_key();
        assert_eq!(key, "00000000000000000007|HAS_DEPLOYMENT|00000000000000000042");
        assert_eq!(Edge::parse(&key).unwrap(), edge);
    }

    #[test]
    fn edge_key_falls_inside_owner_range() {
        let key = Edge::new(7, RelType::Targets, 3).table_key();
        assert!(key.as_str() >= Edge::range_start(7).as_str());
        assert!(key.as_str() < Edge::range_end(7).as_str());
        assert!(Edge::new(8, RelType::Targets, 3).table_key() >= Edge::range_end(7));
    }

    #[test]
    fn reverse_key_is_owned_by_target() {
        let edge = Edge::new(7, RelType::HasNode, 3);
        let key = edge.reverse_key();
        assert_eq!(key, "00000000000000000003|HAS_NODE|00000000000000000007");
        assert!(key.as_str() >= Edge::range_start(3).as_str());
        assert!(key.as_str() < Edge::range_end(3).as_str());
        assert_eq!(Edge::parse_reverse(&key).unwrap(), edge);
    }

    #[test]
    fn edge_parse_rejects_garbage() {
        assert!(Edge::parse("1|TARGETS").is_err());
        assert!(Edge::parse("x|TARGETS|2").is_err());
        assert!(Edge::parse("1|LIKES|2").is_err());
    }

    #[test]
    fn natural_keys_follow_entity_kind() {
        let node = HardwareNode::new(NodeType::Physical, "app-1", "10.0.0.1", ["app"]).unwrap();
        assert_eq!(Entity::Node(node).reference(), EntityRef::node("app-1"));

        let component = SoftwareComponent::new("billing-api", "1.0.0").unwrap();
        assert_eq!(
            Entity::Component(component).reference(),
            EntityRef::component("billing-api", "1.0.0")
        );

        let grid = Entity::cluster(ClusterType::Grid, "batch");
        assert_eq!(grid.label(), Label::GridCluster);
        assert_eq!(grid.reference().index_key(), "GridCluster/batch");
    }

    #[test]
    fn entity_json_round_trips() {
        let node =
            HardwareNode::new(NodeType::KubernetesWorker, "k8s-1", "10.0.0.2", ["kubernetes"])
                .unwrap();
        let entity = Entity::Node(node);
        let json = serde_json::to_vec(&entity).unwrap();
        let back: Entity = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, entity);
    }
}
