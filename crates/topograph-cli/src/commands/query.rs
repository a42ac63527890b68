use topograph_core::TopographConfig;

use super::{open_store, print_json};

pub fn deployments_by_subnet(config: &TopographConfig, cidr: &str) -> anyhow::Result<()> {
    print_json(&open_store(config)?.deployments_by_subnet(cidr)?)
}

pub fn impact(config: &TopographConfig, hostname: &str) -> anyhow::Result<()> {
    print_json(&open_store(config)?.impact_by_node(hostname)?)
}

pub fn system(config: &TopographConfig, name: &str) -> anyhow::Result<()> {
    print_json(&open_store(config)?.system_overview(name)?)
}

/// Nodes of a cluster, optionally only those in one subnet.
pub fn cluster_nodes(
    config: &TopographConfig,
    cluster: &str,
    subnet: Option<&str>,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let nodes = match subnet {
        Some(cidr) => store.nodes_in_cluster_and_subnet(cluster, cidr)?,
        None => store.nodes_in_cluster(cluster)?,
    };
    print_json(&nodes)
}

pub fn dump(config: &TopographConfig) -> anyhow::Result<()> {
    print_json(&open_store(config)?.dump()?)
}
