//! Domain entities of the deployment graph.
//!
//! Constructors enforce the structural rules an entity must satisfy before
//! it can be persisted; a failing constructor returns a [`Violation`] of
//! the appropriate kind rather than a half-built value.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ContractResult, Violation, require_non_blank};
use crate::key::DeploymentKey;

// ── Enumerations ───────────────────────────────────────────────────

/// Kind of execution environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum EnvironmentType {
    Development,
    Test,
    Staging,
    Production,
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Development => "development",
            EnvironmentType::Test => "test",
            EnvironmentType::Staging => "staging",
            EnvironmentType::Production => "production",
        }
    }
}

impl FromStr for EnvironmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(EnvironmentType::Development),
            "test" => Ok(EnvironmentType::Test),
            "staging" | "stage" => Ok(EnvironmentType::Staging),
            "production" | "prod" => Ok(EnvironmentType::Production),
            other => Err(format!(
                "unknown environment type '{other}' \
                 (expected development, test, staging or production)"
            )),
        }
    }
}

impl TryFrom<String> for EnvironmentType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kind of hardware node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum NodeType {
    Physical,
    VirtualMachine,
    ContainerHost,
    GridManager,
    KubernetesControlPlane,
    KubernetesWorker,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Physical => "physical",
            NodeType::VirtualMachine => "virtual_machine",
            NodeType::ContainerHost => "container_host",
            NodeType::GridManager => "grid_manager",
            NodeType::KubernetesControlPlane => "kubernetes_control_plane",
            NodeType::KubernetesWorker => "kubernetes_worker",
        }
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "physical" | "bare_metal" => Ok(NodeType::Physical),
            "virtual_machine" | "vm" => Ok(NodeType::VirtualMachine),
            "container_host" => Ok(NodeType::ContainerHost),
            "grid_manager" => Ok(NodeType::GridManager),
            "kubernetes_control_plane" => Ok(NodeType::KubernetesControlPlane),
            "kubernetes_worker" => Ok(NodeType::KubernetesWorker),
            other => Err(format!("unknown node type '{other}'")),
        }
    }
}

impl TryFrom<String> for NodeType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Cluster family. A cluster's members must carry the matching role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ClusterType {
    Grid,
    Kubernetes,
}

impl ClusterType {
    pub const ALL: [ClusterType; 2] = [ClusterType::Grid, ClusterType::Kubernetes];

    /// Role tag a node needs to join a cluster of this family.
    pub fn role(&self) -> &'static str {
        match self {
            ClusterType::Grid => "grid",
            ClusterType::Kubernetes => "kubernetes",
        }
    }

    /// Name of the cluster that collects family members not placed in any
    /// explicit cluster.
    pub fn implicit_cluster_name(&self) -> String {
        format!("implicit-{}", self.role())
    }
}

impl FromStr for ClusterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(ClusterType::Grid),
            "kubernetes" | "k8s" => Ok(ClusterType::Kubernetes),
            other => Err(format!("unknown cluster type '{other}' (expected grid or kubernetes)")),
        }
    }
}

impl TryFrom<String> for ClusterType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role())
    }
}

// ── Inventory entities ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub name: String,
    pub env_type: EnvironmentType,
}

impl ExecutionEnvironment {
    pub fn new(name: impl Into<String>, env_type: EnvironmentType) -> ContractResult<Self> {
        let name = name.into();
        require_non_blank(&name, "environment name")?;
        Ok(Self { name, env_type })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareNode {
    pub hostname: String,
    pub ip_address: String,
    pub node_type: NodeType,
    pub roles: BTreeSet<String>,
}

impl HardwareNode {
    /// Build a node. The role set must be non-empty and free of blank entries.
    pub fn new<I, R>(
        node_type: NodeType,
        hostname: impl Into<String>,
        ip_address: impl Into<String>,
        roles: I,
    ) -> ContractResult<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let hostname = hostname.into();
        let ip_address = ip_address.into();
        require_non_blank(&hostname, "hostname")?;
        require_non_blank(&ip_address, "ipAddress")?;

        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() {
            return Err(Violation::precondition(format!(
                "roles must not be empty for node {hostname}"
            )));
        }
        if roles.iter().any(|r| r.trim().is_empty()) {
            return Err(Violation::invariant(format!(
                "HardwareNode roles cannot contain blank entries: {hostname}"
            )));
        }

        Ok(Self {
            hostname,
            ip_address,
            node_type,
            roles: roles.into_iter().collect(),
        })
    }

    /// Case-insensitive role lookup.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Cluster families this node may join.
    pub fn cluster_families(&self) -> Vec<ClusterType> {
        ClusterType::ALL
            .into_iter()
            .filter(|family| self.has_role(family.role()))
            .collect()
    }

    /// Cluster membership needs a grid or kubernetes role tag.
    pub fn require_cluster_role(&self) -> ContractResult<()> {
        if self.cluster_families().is_empty() {
            return Err(Violation::invariant(format!(
                "cluster membership requires grid or kubernetes role for node: {}",
                self.hostname
            )));
        }
        Ok(())
    }

    /// Membership in a cluster of `family` needs that family's role tag.
    pub fn require_family_role(&self, family: ClusterType) -> ContractResult<()> {
        if !self.has_role(family.role()) {
            return Err(Violation::invariant(format!(
                "node {} lacks the '{}' role required by {family} cluster membership",
                self.hostname,
                family.role()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub cidr: String,
    pub vlan: String,
    pub routing_zone: String,
    /// Hostnames of member nodes.
    pub nodes: Vec<String>,
}

impl Subnet {
    pub fn new(
        cidr: impl Into<String>,
        vlan: impl Into<String>,
        routing_zone: impl Into<String>,
    ) -> ContractResult<Self> {
        let cidr = cidr.into();
        require_non_blank(&cidr, "subnet cidr")?;
        Ok(Self {
            cidr,
            vlan: vlan.into(),
            routing_zone: routing_zone.into(),
            nodes: Vec::new(),
        })
    }

    pub fn add_node(&mut self, node: &HardwareNode) {
        if !self.contains(&node.hostname) {
            self.nodes.push(node.hostname.clone());
        }
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.nodes.iter().any(|h| h == hostname)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_type: ClusterType,
    pub name: String,
    pub nodes: Vec<String>,
}

impl Cluster {
    pub fn new(cluster_type: ClusterType, name: impl Into<String>) -> ContractResult<Self> {
        let name = name.into();
        require_non_blank(&name, "cluster name")?;
        Ok(Self {
            cluster_type,
            name,
            nodes: Vec::new(),
        })
    }

    pub fn add_node(&mut self, node: &HardwareNode) -> ContractResult<()> {
        node.require_family_role(self.cluster_type)?;
        if !self.nodes.contains(&node.hostname) {
            self.nodes.push(node.hostname.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesNamespace {
    pub name: String,
    pub cluster: String,
}

impl KubernetesNamespace {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>) -> ContractResult<Self> {
        let name = name.into();
        require_non_blank(&name, "namespace name")?;
        Ok(Self {
            name,
            cluster: cluster.into(),
        })
    }
}

// ── Software ───────────────────────────────────────────────────────

/// A deployable unit, identified by (name, version).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SoftwareComponent {
    pub name: String,
    pub version: String,
}

impl SoftwareComponent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> ContractResult<Self> {
        let name = name.into();
        let version = version.into();
        require_non_blank(&name, "component name")?;
        require_non_blank(&version, "component version")?;
        Ok(Self { name, version })
    }

    /// `name:version`, the component's natural key.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

impl fmt::Display for SoftwareComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareSystem {
    pub name: String,
    pub components: Vec<SoftwareComponent>,
    /// Hostnames of cluster nodes owned by the system.
    pub cluster_nodes: Vec<String>,
}

impl SoftwareSystem {
    pub fn new(name: impl Into<String>) -> ContractResult<Self> {
        let name = name.into();
        require_non_blank(&name, "system name")?;
        Ok(Self {
            name,
            components: Vec::new(),
            cluster_nodes: Vec::new(),
        })
    }

    pub fn add_component(&mut self, component: SoftwareComponent) {
        if !self.components.contains(&component) {
            self.components.push(component);
        }
    }

    pub fn add_cluster_node(&mut self, node: &HardwareNode) -> ContractResult<()> {
        node.require_cluster_role()?;
        if !self.cluster_nodes.contains(&node.hostname) {
            self.cluster_nodes.push(node.hostname.clone());
        }
        Ok(())
    }
}

/// Placement of one component version onto an environment + node.
///
/// Target fields are optional because instances read back from the graph
/// may have lost edges; freshly constructed instances always carry both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInstance {
    pub key: String,
    pub environment: Option<String>,
    pub node: Option<String>,
    pub namespace: Option<String>,
    pub cluster: Option<String>,
}

impl DeploymentInstance {
    pub fn new(
        component: &SoftwareComponent,
        environment: &ExecutionEnvironment,
        node: &HardwareNode,
    ) -> ContractResult<Self> {
        let key = DeploymentKey::new(
            &environment.name,
            &node.hostname,
            &component.name,
            &component.version,
        );
        if key.is_blank() {
            return Err(Violation::postcondition(
                "DeploymentInstance must produce a non-blank deployment key",
            ));
        }
        Ok(Self {
            key: key.to_string(),
            environment: Some(environment.name.clone()),
            node: Some(node.hostname.clone()),
            namespace: None,
            cluster: None,
        })
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_cluster(mut self, cluster: Option<String>) -> Self {
        self.cluster = cluster;
        self
    }
}

// ── Network ────────────────────────────────────────────────────────

/// Key of the directed link between two hostnames.
pub fn link_key(from_hostname: &str, to_hostname: &str) -> String {
    format!("{from_hostname}->{to_hostname}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLink {
    pub from_hostname: String,
    pub to_hostname: String,
    pub bandwidth_mbps: u32,
    pub latency_ms: u32,
}

impl NetworkLink {
    pub fn new(
        from: &HardwareNode,
        to: &HardwareNode,
        bandwidth_mbps: i64,
        latency_ms: i64,
    ) -> ContractResult<Self> {
        if bandwidth_mbps <= 0 {
            return Err(Violation::precondition("bandwidthMbps must be positive"));
        }
        if latency_ms < 0 {
            return Err(Violation::precondition("latencyMs must not be negative"));
        }
        let bandwidth_mbps = u32::try_from(bandwidth_mbps)
            .map_err(|_| Violation::precondition("bandwidthMbps is out of range"))?;
        let latency_ms = u32::try_from(latency_ms)
            .map_err(|_| Violation::precondition("latencyMs is out of range"))?;
        if from.hostname == to.hostname {
            return Err(Violation::invariant(format!(
                "NetworkLink must connect two distinct hardware nodes: {}",
                from.hostname
            )));
        }
        Ok(Self {
            from_hostname: from.hostname.clone(),
            to_hostname: to.hostname.clone(),
            bandwidth_mbps,
            latency_ms,
        })
    }

    pub fn key(&self) -> String {
        link_key(&self.from_hostname, &self.to_hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(hostname: &str, roles: &[&str]) -> HardwareNode {
        HardwareNode::new(NodeType::VirtualMachine, hostname, "10.0.0.1", roles.iter().copied())
            .unwrap()
    }

    #[test]
    fn hardware_node_rejects_empty_roles() {
        let err = HardwareNode::new(NodeType::Physical, "node-1", "10.0.0.1", Vec::<String>::new())
            .unwrap_err();
        assert!(matches!(err, Violation::Precondition(_)));
    }

    #[test]
    fn hardware_node_rejects_blank_role() {
        let err = HardwareNode::new(NodeType::Physical, "node-1", "10.0.0.1", ["app", " "])
            .unwrap_err();
        assert!(matches!(err, Violation::Invariant(_)));
    }

    #[test]
    fn hardware_node_rejects_blank_hostname() {
        let err = HardwareNode::new(NodeType::Physical, "", "10.0.0.1", ["app"]).unwrap_err();
        assert!(matches!(err, Violation::Precondition(_)));
    }

    #[test]
    fn environment_requires_name() {
        assert!(ExecutionEnvironment::new("prod", EnvironmentType::Production).is_ok());
        let err = ExecutionEnvironment::new("  ", EnvironmentType::Production).unwrap_err();
        assert!(matches!(err, Violation::Precondition(_)));
    }

    #[test]
    fn network_link_rejects_self_loop() {
        let a = node("app-1", &["app"]);
        let err = NetworkLink::new(&a, &a, 1000, 1).unwrap_err();
        assert!(matches!(err, Violation::Invariant(_)));
    }

    #[test]
    fn network_link_checks_bandwidth_and_latency() {
        let a = node("app-1", &["app"]);
        let b = node("app-2", &["app"]);
        assert!(matches!(
            NetworkLink::new(&a, &b, 0, 1).unwrap_err(),
            Violation::Precondition(_)
        ));
        assert!(matches!(
            NetworkLink::new(&a, &b, 100, -1).unwrap_err(),
            Violation::Precondition(_)
        ));
        let link = NetworkLink::new(&a, &b, 100, 0).unwrap();
        assert_eq!(link.key(), "app-1->app-2");
    }

    #[test]
    fn cluster_role_check_is_case_insensitive() {
        assert!(node("grid-1", &["GRID"]).require_cluster_role().is_ok());
        assert!(node("k8s-1", &["Kubernetes"]).require_cluster_role().is_ok());
        let err = node("app-1", &["app"]).require_cluster_role().unwrap_err();
        assert!(matches!(err, Violation::Invariant(_)));
    }

    #[test]
    fn cluster_add_node_requires_family_role() {
        let mut cluster = Cluster::new(ClusterType::Kubernetes, "k8s-main").unwrap();
        assert!(cluster.add_node(&node("k8s-1", &["kubernetes"])).is_ok());
        let err = cluster.add_node(&node("grid-1", &["grid"])).unwrap_err();
        assert!(matches!(err, Violation::Invariant(_)));
        assert_eq!(cluster.nodes, vec!["k8s-1".to_string()]);
    }

    #[test]
    fn system_cluster_node_requires_role() {
        let mut system = SoftwareSystem::new("billing").unwrap();
        assert!(system.add_cluster_node(&node("grid-1", &["grid"])).is_ok());
        assert!(system.add_cluster_node(&node("app-1", &["app"])).is_err());
        assert_eq!(system.cluster_nodes.len(), 1);
    }

    #[test]
    fn deployment_instance_derives_key() {
        let component = SoftwareComponent::new("billing-api", "1.0.0").unwrap();
        let env = ExecutionEnvironment::new("prod", EnvironmentType::Production).unwrap();
        let instance = DeploymentInstance::new(&component, &env, &node("app-1", &["app"])).unwrap();
        assert_eq!(instance.key, "prod@app-1:billing-api:1.0.0");
        assert_eq!(instance.environment.as_deref(), Some("prod"));
        assert_eq!(instance.node.as_deref(), Some("app-1"));
    }

    #[test]
    fn enum_parsing_accepts_aliases() {
        assert_eq!("PROD".parse::<EnvironmentType>().unwrap(), EnvironmentType::Production);
        assert_eq!("vm".parse::<NodeType>().unwrap(), NodeType::VirtualMachine);
        assert_eq!(
            "kubernetes-worker".parse::<NodeType>().unwrap(),
            NodeType::KubernetesWorker
        );
        assert_eq!("K8s".parse::<ClusterType>().unwrap(), ClusterType::Kubernetes);
        assert!("mainframe".parse::<ClusterType>().is_err());
    }
}
