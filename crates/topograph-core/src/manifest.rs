//! Deployment manifest: the declarative description of desired topology.
//!
//! Manifests are YAML documents. Every list is optional and defaults to
//! empty; unknown fields are rejected so typos surface as parse errors
//! with a line/column location instead of being silently ignored.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ClusterType, EnvironmentType, NodeType, link_key};
use crate::key::DeploymentKey;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub subnets: Vec<SubnetSpec>,
    pub clusters: Vec<ClusterSpec>,
    pub environments: Vec<EnvironmentSpec>,
    pub systems: Vec<SystemSpec>,
    pub links: Vec<LinkSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubnetSpec {
    pub cidr: String,
    #[serde(default)]
    pub vlan: String,
    #[serde(default)]
    pub routing_zone: String,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeSpec {
    pub hostname: String,
    pub ip_address: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterSpec {
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    pub name: String,
    /// Member hostnames.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Namespace names; only meaningful for Kubernetes clusters.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvironmentSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: EnvironmentType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SystemSpec {
    pub name: String,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentSpec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub deployments: Vec<TargetSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetSpec {
    pub environment: String,
    pub hostname: String,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LinkSpec {
    pub from_hostname: String,
    pub to_hostname: String,
    pub bandwidth_mbps: i64,
    pub latency_ms: i64,
}

/// Errors raised while turning manifest text into a [`Manifest`].
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest text must not be blank")]
    Blank,

    #[error("malformed manifest yaml at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("malformed manifest yaml: {0}")]
    Syntax(String),

    #[error("unable to read manifest file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Manifest {
    /// Parse manifest YAML text.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        if text.trim().is_empty() {
            return Err(ManifestError::Blank);
        }
        serde_yaml::from_str(text).map_err(|e| match e.location() {
            Some(loc) => ManifestError::Parse {
                line: loc.line(),
                column: loc.column(),
                message: e.to_string(),
            },
            None => ManifestError::Syntax(e.to_string()),
        })
    }

    /// Read and parse a manifest file.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// All declared nodes across all subnets, in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.subnets.iter().flat_map(|s| s.nodes.iter())
    }

    /// Canonical keys of every deployment target in the manifest.
    pub fn deployment_keys(&self) -> BTreeSet<String> {
        self.systems
            .iter()
            .flat_map(|system| system.components.iter())
            .flat_map(|component| {
                component.deployments.iter().map(|target| {
                    DeploymentKey::new(
                        &target.environment,
                        &target.hostname,
                        &component.name,
                        &component.version,
                    )
                    .to_string()
                })
            })
            .collect()
    }

    /// Keys of every declared network link.
    pub fn link_keys(&self) -> BTreeSet<String> {
        self.links
            .iter()
            .map(|l| link_key(&l.from_hostname, &l.to_hostname))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
subnets:
  - cidr: 10.0.0.0/24
    vlan: "120"
    routingZone: internal-dc-a
    nodes:
      - hostname: node-a-01
        ipAddress: 10.0.0.11
        type: vm
        roles: [app, kubernetes]
clusters:
  - type: kubernetes
    name: k8s-main
    nodes: [node-a-01]
    namespaces: [payments]
environments:
  - name: prod
    type: production
systems:
  - name: Payments
    components:
      - name: payments-api
        version: 1.4.2
        deployments:
          - environment: prod
            hostname: node-a-01
            namespace: payments
links: []
"#;

    #[test]
    fn parse_reads_yaml_into_model() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.subnets.len(), 1);
        assert_eq!(manifest.subnets[0].cidr, "10.0.0.0/24");
        assert_eq!(manifest.subnets[0].routing_zone, "internal-dc-a");
        assert_eq!(manifest.subnets[0].nodes[0].node_type, NodeType::VirtualMachine);
        assert_eq!(manifest.clusters[0].cluster_type, ClusterType::Kubernetes);
        assert_eq!(manifest.environments[0].env_type, EnvironmentType::Production);
        assert_eq!(manifest.systems[0].name, "Payments");
        assert_eq!(manifest.systems[0].components[0].name, "payments-api");
        assert_eq!(
            manifest.systems[0].components[0].deployments[0].namespace.as_deref(),
            Some("payments")
        );
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let manifest = Manifest::parse("systems:\n  - name: billing\n").unwrap();
        assert!(manifest.subnets.is_empty());
        assert!(manifest.links.is_empty());
        assert!(manifest.systems[0].components.is_empty());
    }

    #[test]
    fn parse_rejects_blank_text() {
        assert!(matches!(Manifest::parse("   \n"), Err(ManifestError::Blank)));
    }

    #[test]
    fn parse_reports_location_for_unknown_field() {
        let err = Manifest::parse("systems:\n  - name: billing\n    owner: team-a\n").unwrap_err();
        match err {
            ManifestError::Parse { line, .. } => assert!(line >= 1),
            other => panic!("expected located parse error, got {other:?}"),
        }
    }

    #[test]
    fn deployment_and_link_keys() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let keys = manifest.deployment_keys();
        assert!(keys.contains("prod@node-a-01:payments-api:1.4.2"));
        assert!(manifest.link_keys().is_empty());
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::from_file(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }
}
