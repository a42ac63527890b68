use topograph_core::{EnvironmentType, NodeType, TopographConfig};
use topograph_sync::{ComponentUpdate, EnvironmentUpdate, NodeUpdate, SubnetUpdate, SystemUpdate};

use super::{open_store, print_json};

pub fn system(config: &TopographConfig, name: &str, new_name: &str) -> anyhow::Result<()> {
    let update = SystemUpdate {
        name: new_name.to_string(),
    };
    print_json(&topograph_sync::update_system(&open_store(config)?, name, &update)?)
}

pub fn component(
    config: &TopographConfig,
    name: &str,
    version: &str,
    new_name: Option<String>,
    new_version: Option<String>,
) -> anyhow::Result<()> {
    let update = ComponentUpdate {
        name: new_name.unwrap_or_else(|| name.to_string()),
        version: new_version.unwrap_or_else(|| version.to_string()),
    };
    let store = open_store(config)?;
    print_json(&topograph_sync::update_component(&store, name, version, &update)?)
}

/// Node updates replace the type, address and role set; the hostname is
/// kept unless `new_hostname` is given.
pub fn node(
    config: &TopographConfig,
    hostname: &str,
    node_type: NodeType,
    new_hostname: Option<String>,
    ip_address: String,
    roles: Vec<String>,
) -> anyhow::Result<()> {
    let update = NodeUpdate {
        node_type,
        hostname: new_hostname.unwrap_or_else(|| hostname.to_string()),
        ip_address,
        roles,
    };
    print_json(&topograph_sync::update_node(&open_store(config)?, hostname, &update)?)
}

pub fn subnet(
    config: &TopographConfig,
    cidr: &str,
    new_cidr: Option<String>,
    vlan: String,
    routing_zone: String,
) -> anyhow::Result<()> {
    let update = SubnetUpdate {
        cidr: new_cidr.unwrap_or_else(|| cidr.to_string()),
        vlan,
        routing_zone,
    };
    print_json(&topograph_sync::update_subnet(&open_store(config)?, cidr, &update)?)
}

pub fn environment(
    config: &TopographConfig,
    name: &str,
    new_name: Option<String>,
    env_type: EnvironmentType,
) -> anyhow::Result<()> {
    let update = EnvironmentUpdate {
        name: new_name.unwrap_or_else(|| name.to_string()),
        env_type,
    };
    print_json(&topograph_sync::update_environment(&open_store(config)?, name, &update)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use topograph_core::Manifest;
    use topograph_state::{EntityRef, Label};
    use topograph_sync::Reconciler;

    const MANIFEST: &str = r#"
subnets:
  - cidr: 10.0.0.0/24
    vlan: "120"
    routingZone: dc-a
    nodes:
      - { hostname: app-1, ipAddress: 10.0.0.1, type: vm, roles: [app] }
environments:
  - { name: prod, type: production }
systems:
  - name: billing
    components:
      - name: billing-api
        version: "1.0.0"
        deployments:
          - { environment: prod, hostname: app-1 }
"#;

    #[test]
    fn node_rename_persists_to_the_configured_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TopographConfig::default();
        config.store.path = dir.path().join("topograph.redb");
        Reconciler::new(open_store(&config).unwrap())
            .synchronize(&Manifest::parse(MANIFEST).unwrap())
            .unwrap();

        node(
            &config,
            "app-1",
            NodeType::VirtualMachine,
            Some("app-9".into()),
            "10.0.0.1".into(),
            vec!["app".into()],
        )
        .unwrap();

        let dump = open_store(&config).unwrap().dump().unwrap();
        assert!(dump.contains(&EntityRef::node("app-9")));
        assert!(dump.contains(&EntityRef::new(
            Label::DeploymentInstance,
            "prod@app-9:billing-api:1.0.0"
        )));
    }

    #[test]
    fn missing_subnet_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TopographConfig::default();
        config.store.path = dir.path().join("topograph.redb");
        let err = subnet(&config, "10.9.0.0/24", None, "1".into(), "z".into()).unwrap_err();
        assert!(err.to_string().contains("Subnet not found"));
    }
}
