//! Whole-graph quality checks.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use topograph_state::{Entity, EntityId, GraphRead, GraphStore, Label, RelType, StateResult};

pub const ORPHAN_DEPLOYMENTS: &str = "orphanDeployments";
pub const NODES_WITHOUT_SUBNET: &str = "nodesWithoutSubnet";
pub const DUPLICATE_HOSTNAMES: &str = "duplicateHostnames";
pub const DUPLICATE_IPS: &str = "duplicateIps";
pub const SOFTWARE_LINKED_TO_MISSING_ENVIRONMENT: &str = "softwareLinkedToMissingEnvironment";

pub const CATEGORIES: [&str; 5] = [
    ORPHAN_DEPLOYMENTS,
    NODES_WITHOUT_SUBNET,
    DUPLICATE_HOSTNAMES,
    DUPLICATE_IPS,
    SOFTWARE_LINKED_TO_MISSING_ENVIRONMENT,
];

/// Findings per category. Every category is present, possibly empty, and
/// every list is sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub findings: BTreeMap<String, Vec<String>>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.findings.values().all(Vec::is_empty)
    }

    pub fn finding_count(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }

    pub fn category(&self, name: &str) -> &[String] {
        self.findings.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Evaluate the gate against a consistent snapshot of `store`.
pub fn evaluate(store: &GraphStore) -> StateResult<QualityReport> {
    store.read(|view| evaluate_graph(view))
}

pub fn evaluate_graph<G: GraphRead>(graph: &G) -> StateResult<QualityReport> {
    let entities: HashMap<EntityId, Entity> = graph.all_entities()?.into_iter().collect();
    let label_of = |id: &EntityId| entities.get(id).map(Entity::label);

    let mut has_env = HashSet::new();
    let mut has_node = HashSet::new();
    let mut in_subnet = HashSet::new();
    let mut deployments_of: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
    for edge in graph.edges()? {
        match edge.rel {
            RelType::Targets => match label_of(&edge.to) {
                Some(Label::ExecutionEnvironment) => {
                    has_env.insert(edge.from);
                }
                Some(Label::HardwareNode) => {
                    has_node.insert(edge.from);
                }
                _ => {}
            },
            RelType::ContainsNode if label_of(&edge.from) == Some(Label::Subnet) => {
                in_subnet.insert(edge.to);
            }
            RelType::HasDeployment => {
                deployments_of.entry(edge.from).or_default().push(edge.to);
            }
            _ => {}
        }
    }

    let mut orphans = Vec::new();
    let mut without_subnet = Vec::new();
    let mut hostnames: BTreeMap<&str, usize> = BTreeMap::new();
    let mut ips: BTreeMap<&str, usize> = BTreeMap::new();
    let mut missing_env = Vec::new();

    for (id, entity) in &entities {
        match entity {
            Entity::Deployment(d) if !has_env.contains(id) || !has_node.contains(id) => {
                orphans.push(d.deployment_key.clone());
            }
            Entity::Node(node) => {
                if !in_subnet.contains(id) {
                    without_subnet.push(node.hostname.clone());
                }
                *hostnames.entry(node.hostname.as_str()).or_default() += 1;
                if !node.ip_address.is_empty() {
                    *ips.entry(node.ip_address.as_str()).or_default() += 1;
                }
            }
            Entity::Component(component) => {
                for deployment in deployments_of.get(id).into_iter().flatten() {
                    let Some(Entity::Deployment(d)) = entities.get(deployment) else {
                        continue;
                    };
                    if !has_env.contains(deployment) {
                        let key = if d.deployment_key.is_empty() {
                            "unknown"
                        } else {
                            d.deployment_key.as_str()
                        };
                        missing_env.push(format!("{component} -> {key}"));
                    }
                }
            }
            _ => {}
        }
    }

    let mut findings = BTreeMap::new();
    findings.insert(ORPHAN_DEPLOYMENTS.to_string(), sorted(orphans));
    findings.insert(NODES_WITHOUT_SUBNET.to_string(), sorted(without_subnet));
    findings.insert(DUPLICATE_HOSTNAMES.to_string(), duplicates(hostnames));
    findings.insert(DUPLICATE_IPS.to_string(), duplicates(ips));
    findings.insert(
        SOFTWARE_LINKED_TO_MISSING_ENVIRONMENT.to_string(),
        sorted(missing_env),
    );
    Ok(QualityReport { findings })
}

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}

/// `value (count)` for every value seen more than once.
fn duplicates(counts: BTreeMap<&str, usize>) -> Vec<String> {
    sorted(
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(value, count)| format!("{value} ({count})"))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use topograph_core::{
        EnvironmentType, ExecutionEnvironment, HardwareNode, NodeType, SoftwareComponent,
    };

    fn node(hostname: &str, ip: &str) -> Entity {
        Entity::Node(HardwareNode::new(NodeType::VirtualMachine, hostname, ip, ["app"]).unwrap())
    }

    /// One healthy placement: prod@app-1 inside a subnet.
    fn healthy() -> GraphStore {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                let subnet = tx.merge(&Entity::subnet("10.0.0.0/24", "120", "dc-a"))?;
                let app = tx.merge(&node("app-1", "10.0.0.1"))?;
                tx.relate(subnet, RelType::ContainsNode, app)?;
                let prod = tx.merge(&Entity::Environment(ExecutionEnvironment::new(
                    "prod",
                    EnvironmentType::Production,
                )?))?;
                let api = SoftwareComponent::new("billing-api", "1.0.0")?;
                let component = tx.merge(&Entity::Component(api))?;
                let d = tx.merge(&Entity::deployment("prod@app-1:billing-api:1.0.0"))?;
                tx.relate(component, RelType::HasDeployment, d)?;
                tx.relate(d, RelType::Targets, prod)?;
                tx.relate(d, RelType::Targets, app)?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn healthy_graph_passes() {
        let report = evaluate(&healthy()).unwrap();
        assert!(report.passed());
        assert_eq!(report.finding_count(), 0);
        assert_eq!(report.findings.len(), CATEGORIES.len());
    }

    #[test]
    fn empty_graph_passes() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(evaluate(&store).unwrap().passed());
    }

    #[test]
    fn deployment_without_targets_is_orphan() {
        let store = healthy();
        store
            .write(|tx| tx.create(&Entity::deployment("orphan")).map(|_| ()))
            .unwrap();
        let report = evaluate(&store).unwrap();
        assert_eq!(report.category(ORPHAN_DEPLOYMENTS), ["orphan".to_string()]);
        assert!(!report.passed());
    }

    #[test]
    fn deployment_missing_only_node_is_orphan() {
        let store = healthy();
        store
            .write(|tx| -> StateResult<_> {
                let prod = tx.lookup(&topograph_state::EntityRef::environment("prod"))?.unwrap();
                let d = tx.create(&Entity::deployment("prod@gone:billing-api:1.0.0"))?;
                tx.relate(d, RelType::Targets, prod)?;
                Ok(())
            })
            .unwrap();
        let report = evaluate(&store).unwrap();
        assert_eq!(
            report.category(ORPHAN_DEPLOYMENTS),
            ["prod@gone:billing-api:1.0.0".to_string()]
        );
        assert!(report.category(SOFTWARE_LINKED_TO_MISSING_ENVIRONMENT).is_empty());
    }

    #[test]
    fn node_outside_subnets_is_reported() {
        let store = healthy();
        store
            .write(|tx| tx.create(&node("nosubnet-01", "10.9.9.9")).map(|_| ()))
            .unwrap();
        let report = evaluate(&store).unwrap();
        assert_eq!(report.category(NODES_WITHOUT_SUBNET), ["nosubnet-01".to_string()]);
    }

    #[test]
    fn duplicate_hostnames_carry_count() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                tx.create(&node("dup-host", "10.0.0.1"))?;
                tx.create(&node("dup-host", "10.0.0.2"))?;
                Ok(())
            })
            .unwrap();
        let report = evaluate(&store).unwrap();
        assert_eq!(report.category(DUPLICATE_HOSTNAMES), ["dup-host (2)".to_string()]);
        assert!(report.category(DUPLICATE_IPS).is_empty());
    }

    #[test]
    fn duplicate_ips_carry_count() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                tx.create(&node("ip-a", "10.10.1.99"))?;
                tx.create(&node("ip-b", "10.10.1.99"))?;
                Ok(())
            })
            .unwrap();
        let report = evaluate(&store).unwrap();
        assert_eq!(report.category(DUPLICATE_IPS), ["10.10.1.99 (2)".to_string()]);
        assert!(report.category(DUPLICATE_HOSTNAMES).is_empty());
    }

    #[test]
    fn component_deployment_without_environment_is_reported() {
        let store = healthy();
        store
            .write(|tx| -> StateResult<_> {
                let component = tx
                    .lookup(&topograph_state::EntityRef::component("billing-api", "1.0.0"))?
                    .unwrap();
                let app = tx.lookup(&topograph_state::EntityRef::node("app-1"))?.unwrap();
                let d = tx.create(&Entity::deployment("staging@app-1:billing-api:1.0.0"))?;
                tx.relate(component, RelType::HasDeployment, d)?;
                tx.relate(d, RelType::Targets, app)?;
                Ok(())
            })
            .unwrap();
        let report = evaluate(&store).unwrap();
        assert_eq!(
            report.category(SOFTWARE_LINKED_TO_MISSING_ENVIRONMENT),
            ["billing-api:1.0.0 -> staging@app-1:billing-api:1.0.0".to_string()]
        );
        // Missing its environment also makes it an orphan.
        assert_eq!(
            report.category(ORPHAN_DEPLOYMENTS),
            ["staging@app-1:billing-api:1.0.0".to_string()]
        );
    }

    #[test]
    fn findings_are_sorted() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                for key in ["zeta", "alpha", "mid"] {
                    tx.create(&Entity::deployment(key))?;
                }
                Ok(())
            })
            .unwrap();
        let report = evaluate(&store).unwrap();
        assert_eq!(report.category(ORPHAN_DEPLOYMENTS), ["alpha", "mid", "zeta"]);
    }
}
