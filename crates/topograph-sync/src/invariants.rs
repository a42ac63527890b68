//! Graph-level invariant checks, plus the loaders that rebuild the domain
//! values those checks run against.

use topograph_core::{
    ClusterType, ContractResult, DeploymentInstance, HardwareNode, Subnet, Violation,
};
use topograph_state::{Entity, EntityId, GraphRead, RelType, StateResult};

/// A deployment must target both an environment and a node, and carry a key.
pub fn validate_deployment_target(instance: &DeploymentInstance) -> ContractResult<()> {
    if instance.environment.is_none() || instance.node.is_none() {
        return Err(Violation::invariant(format!(
            "DeploymentInstance {} must target both an environment and a node",
            instance.key
        )));
    }
    if instance.key.trim().is_empty() {
        return Err(Violation::postcondition(
            "Deployment target validation requires a non-blank deployment key",
        ));
    }
    Ok(())
}

/// A node must sit in a subnet before anything is deployed onto it.
pub fn validate_subnet_membership(subnet: &Subnet, node: &HardwareNode) -> ContractResult<()> {
    if !subnet.contains(&node.hostname) {
        return Err(not_in_subnet(node));
    }
    Ok(())
}

pub fn require_cluster_node_role(node: &HardwareNode) -> ContractResult<()> {
    node.require_cluster_role()
}

pub fn require_cluster_family_role(node: &HardwareNode, family: ClusterType) -> ContractResult<()> {
    node.require_family_role(family)
}

fn not_in_subnet(node: &HardwareNode) -> Violation {
    Violation::invariant(format!(
        "Node must belong to subnet before deployment mapping: {}",
        node.hostname
    ))
}

/// Rebuild a subnet with its member hostnames.
pub fn load_subnet<G: GraphRead>(graph: &G, subnet_id: EntityId) -> StateResult<Option<Subnet>> {
    let Some(Entity::Subnet(record)) = graph.entity(subnet_id)? else {
        return Ok(None);
    };
    let mut subnet = Subnet::new(record.cidr, record.vlan, record.routing_zone)?;
    for (_, member) in graph.outgoing_entities(subnet_id, RelType::ContainsNode)? {
        if let Some(node) = member.as_node() {
            subnet.add_node(node);
        }
    }
    Ok(Some(subnet))
}

/// Find a subnet holding `node` and confirm the membership.
pub fn require_subnet_placement<G: GraphRead>(
    graph: &G,
    node_id: EntityId,
    node: &HardwareNode,
) -> StateResult<Subnet> {
    for subnet_id in graph.incoming(node_id, RelType::ContainsNode)? {
        if let Some(subnet) = load_subnet(graph, subnet_id)? {
            validate_subnet_membership(&subnet, node)?;
            return Ok(subnet);
        }
    }
    Err(not_in_subnet(node).into())
}

/// Rebuild a deployment instance from its record and `TARGETS` edges.
pub fn load_deployment<G: GraphRead>(
    graph: &G,
    deployment_id: EntityId,
) -> StateResult<Option<DeploymentInstance>> {
    let Some(Entity::Deployment(record)) = graph.entity(deployment_id)? else {
        return Ok(None);
    };
    let mut instance = DeploymentInstance {
        key: record.deployment_key,
        environment: None,
        node: None,
        namespace: None,
        cluster: None,
    };
    for (_, target) in graph.outgoing_entities(deployment_id, RelType::Targets)? {
        match target {
            Entity::Environment(env) => instance.environment = Some(env.name),
            Entity::Node(node) => instance.node = Some(node.hostname),
            Entity::Namespace(ns) => instance.namespace = Some(ns.name),
            Entity::Cluster(cluster) => instance.cluster = Some(cluster.name),
            _ => {}
        }
    }
    Ok(Some(instance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use topograph_core::NodeType;
    use topograph_state::{GraphStore, StateError};

    fn node(hostname: &str, roles: &[&str]) -> HardwareNode {
        HardwareNode::new(NodeType::Physical, hostname, "10.0.0.1", roles.iter().copied()).unwrap()
    }

    #[test]
    fn deployment_target_requires_environment_and_node() {
        let instance = DeploymentInstance {
            key: "prod@app-1:api:1".into(),
            environment: Some("prod".into()),
            node: None,
            namespace: None,
            cluster: None,
        };
        assert!(matches!(
            validate_deployment_target(&instance).unwrap_err(),
            Violation::Invariant(_)
        ));
    }

    #[test]
    fn deployment_target_requires_key() {
        let instance = DeploymentInstance {
            key: " ".into(),
            environment: Some("prod".into()),
            node: Some("app-1".into()),
            namespace: None,
            cluster: None,
        };
        assert!(matches!(
            validate_deployment_target(&instance).unwrap_err(),
            Violation::Postcondition(_)
        ));
    }

    #[test]
    fn subnet_membership_is_checked_by_hostname() {
        let mut subnet = Subnet::new("10.0.0.0/24", "120", "dc-a").unwrap();
        let inside = node("app-1", &["app"]);
        subnet.add_node(&inside);
        assert!(validate_subnet_membership(&subnet, &inside).is_ok());

        let err = validate_subnet_membership(&subnet, &node("app-2", &["app"])).unwrap_err();
        assert_eq!(
            err,
            Violation::invariant("Node must belong to subnet before deployment mapping: app-2")
        );
    }

    #[test]
    fn cluster_roles() {
        assert!(require_cluster_node_role(&node("grid-1", &["Grid"])).is_ok());
        assert!(require_cluster_node_role(&node("app-1", &["app"])).is_err());
        assert!(require_cluster_family_role(&node("grid-1", &["grid"]), ClusterType::Grid).is_ok());
        assert!(
            require_cluster_family_role(&node("grid-1", &["grid"]), ClusterType::Kubernetes)
                .is_err()
        );
    }

    #[test]
    fn subnet_placement_reads_graph() {
        let store = GraphStore::open_in_memory().unwrap();
        let placed = node("app-1", &["app"]);
        let loose = HardwareNode::new(NodeType::Physical, "app-2", "10.0.0.2", ["app"]).unwrap();
        let (placed_id, loose_id) = store
            .write(|tx| -> StateResult<_> {
                let s = tx.merge(&Entity::subnet("10.0.0.0/24", "120", "dc-a"))?;
                let a = tx.merge(&Entity::Node(placed.clone()))?;
                let b = tx.merge(&Entity::Node(loose.clone()))?;
                tx.relate(s, RelType::ContainsNode, a)?;
                Ok((a, b))
            })
            .unwrap();

        store
            .read(|view| -> StateResult<_> {
                let subnet = require_subnet_placement(view, placed_id, &placed)?;
                assert_eq!(subnet.cidr, "10.0.0.0/24");
                assert_eq!(subnet.nodes, vec!["app-1".to_string()]);

                let err = require_subnet_placement(view, loose_id, &loose).unwrap_err();
                assert!(matches!(err, StateError::Contract(Violation::Invariant(_))));
                Ok(())
            })
            .unwrap();
    }
}
