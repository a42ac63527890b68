//! Reconciler: applies a manifest to the graph in one transaction.
//!
//! Steps, in order:
//! 1. backfill legacy target edges and implicit cluster membership
//! 2. environments
//! 3. subnets and nodes, replacing each subnet's `CONTAINS_NODE` set
//! 4. explicit clusters, replacing `HAS_NODE`; namespaces are merged
//! 5. systems, components and deployments, replacing ownership and
//!    `TARGETS` edges
//! 6. network links, replacing both endpoint edges
//! 7. prune deployments and links the manifest no longer declares

use std::collections::BTreeMap;

use topograph_core::manifest::{ComponentSpec, TargetSpec};
use topograph_core::{
    Cluster, ClusterType, DeploymentInstance, ExecutionEnvironment, HardwareNode,
    KubernetesNamespace, Manifest, NetworkLink, SoftwareComponent, SoftwareSystem, Subnet,
    Violation,
};
use topograph_state::{
    Edge, Entity, EntityId, EntityRef, GraphRead, GraphStore, GraphTxn, Label, RelType,
};
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::invariants::{load_deployment, validate_deployment_target};
use crate::report::{OperationResult, SyncReport};
use crate::retarget::{KeyRewrite, retarget_deployment};
use crate::validator::validate_manifest;

/// Entry point for manifest ingestion against one graph store.
#[derive(Clone)]
pub struct Reconciler {
    store: GraphStore,
}

impl Reconciler {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Validate `manifest`, then apply it. Either every step commits or
    /// none does.
    pub fn synchronize(&self, manifest: &Manifest) -> SyncResult<SyncReport> {
        validate_manifest(manifest)?;
        let report = self.store.write(|tx| apply(tx, manifest))?;
        info!(
            deployments = report.deployments,
            links = report.links,
            pruned_deployments = report.pruned_deployments.len(),
            pruned_links = report.pruned_links.len(),
            "manifest synchronized"
        );
        Ok(report)
    }

    /// [`Reconciler::synchronize`] folded into an operation result.
    pub fn ingest(&self, manifest: &Manifest) -> OperationResult {
        match self.synchronize(manifest) {
            Ok(report) => OperationResult::ingested(format!("Manifest synchronized: {report}")),
            Err(err) => {
                warn!(error = %err, "manifest ingestion failed");
                OperationResult::failed(err.to_string())
            }
        }
    }

    /// Referential validation only; the graph is not touched.
    pub fn validate(&self, manifest: &Manifest) -> OperationResult {
        match validate_manifest(manifest) {
            Ok(()) => OperationResult::passed("Manifest passed contract validation"),
            Err(violation) => OperationResult::failed(violation.to_string()),
        }
    }

    /// Move one deployment to a new environment and node.
    pub fn retarget(
        &self,
        current_key: &str,
        environment: &str,
        hostname: &str,
    ) -> SyncResult<KeyRewrite> {
        retarget_deployment(&self.store, current_key, environment, hostname)
    }
}

fn apply(tx: &mut GraphTxn<'_>, manifest: &Manifest) -> SyncResult<SyncReport> {
    let mut report = SyncReport {
        legacy_edges_rewritten: rewrite_legacy_targets(tx)?,
        ..SyncReport::default()
    };
    assign_implicit_clusters(tx, &mut report)?;

    for spec in &manifest.environments {
        let env = ExecutionEnvironment::new(&spec.name, spec.env_type)?;
        tx.merge(&Entity::Environment(env))?;
        report.environments += 1;
    }

    upsert_subnets(tx, manifest, &mut report)?;
    upsert_clusters(tx, manifest, &mut report)?;
    assign_implicit_clusters(tx, &mut report)?;
    upsert_systems(tx, manifest, &mut report)?;
    upsert_links(tx, manifest, &mut report)?;

    report.pruned_deployments =
        tx.delete_where_key_not_in(Label::DeploymentInstance, &manifest.deployment_keys())?;
    report.pruned_links = tx.delete_where_key_not_in(Label::NetworkLink, &manifest.link_keys())?;
    Ok(report)
}

// ── Step 1: backfill ──────────────────────────────────────────────

/// Collapse `TARGET_ENVIRONMENT` / `TARGET_NODE` edges into `TARGETS`.
fn rewrite_legacy_targets(tx: &mut GraphTxn<'_>) -> SyncResult<usize> {
    let legacy: Vec<Edge> = tx.edges()?.into_iter().filter(|e| e.rel.is_legacy()).collect();
    for edge in &legacy {
        tx.unrelate(edge.from, edge.rel, edge.to)?;
        tx.relate(edge.from, RelType::Targets, edge.to)?;
    }
    if !legacy.is_empty() {
        debug!(count = legacy.len(), "rewrote legacy target edges");
    }
    Ok(legacy.len())
}

/// Run [`sync_implicit_membership`] over every node.
fn assign_implicit_clusters(tx: &mut GraphTxn<'_>, report: &mut SyncReport) -> SyncResult<()> {
    for (node_id, entity) in tx.entities(Label::HardwareNode)? {
        let Some(node) = entity.as_node() else { continue };
        let (joined, released) = sync_implicit_membership(tx, node_id, node)?;
        report.implicit_memberships += joined;
        report.implicit_memberships_released += released;
    }
    Ok(())
}

/// Keep one node's implicit cluster membership in step with its explicit
/// membership and roles. Returns `(joined, released)`.
///
/// A grid/kubernetes node that belongs to no explicit cluster sits in the
/// implicit cluster of each family it carries a role for. A node listed by
/// an explicit cluster leaves every implicit cluster, and a node that lost a
/// family role leaves that family's implicit cluster.
pub(crate) fn sync_implicit_membership(
    tx: &mut GraphTxn<'_>,
    node_id: EntityId,
    node: &HardwareNode,
) -> SyncResult<(usize, usize)> {
    let mut implicit: Vec<(EntityId, ClusterType)> = Vec::new();
    let mut explicit = false;
    for (owner_id, owner) in tx.incoming_entities(node_id, RelType::HasNode)? {
        let Entity::Cluster(cluster) = owner else { continue };
        if cluster.name == cluster.cluster_type.implicit_cluster_name() {
            implicit.push((owner_id, cluster.cluster_type));
        } else {
            explicit = true;
        }
    }

    let wanted = if explicit { Vec::new() } else { node.cluster_families() };
    let mut released = 0;
    for (cluster_id, family) in &implicit {
        if !wanted.contains(family) {
            tx.unrelate(*cluster_id, RelType::HasNode, node_id)?;
            debug!(
                hostname = %node.hostname,
                cluster = %family.implicit_cluster_name(),
                "implicit cluster membership released"
            );
            released += 1;
        }
    }
    let mut joined = 0;
    for family in wanted {
        if implicit.iter().any(|(_, held)| *held == family) {
            continue;
        }
        let name = family.implicit_cluster_name();
        let cluster_id = tx.merge(&Entity::cluster(family, &name))?;
        tx.relate(cluster_id, RelType::HasNode, node_id)?;
        debug!(hostname = %node.hostname, cluster = %name, "implicit cluster membership");
        joined += 1;
    }
    Ok((joined, released))
}

// ── Step 3: subnets and nodes ─────────────────────────────────────

fn upsert_subnets(
    tx: &mut GraphTxn<'_>,
    manifest: &Manifest,
    report: &mut SyncReport,
) -> SyncResult<()> {
    for spec in &manifest.subnets {
        let mut subnet = Subnet::new(&spec.cidr, &spec.vlan, &spec.routing_zone)?;
        let subnet_id =
            tx.merge(&Entity::subnet(&subnet.cidr, &subnet.vlan, &subnet.routing_zone))?;

        let mut members = Vec::with_capacity(spec.nodes.len());
        for node_spec in &spec.nodes {
            let node = HardwareNode::new(
                node_spec.node_type,
                &node_spec.hostname,
                &node_spec.ip_address,
                node_spec.roles.iter().cloned(),
            )?;
            subnet.add_node(&node);
            members.push(tx.merge(&Entity::Node(node))?);
            report.nodes += 1;
        }

        tx.detach(subnet_id, RelType::ContainsNode)?;
        for node_id in members {
            tx.relate(subnet_id, RelType::ContainsNode, node_id)?;
        }
        debug!(cidr = %subnet.cidr, nodes = subnet.nodes.len(), "subnet reconciled");
        report.subnets += 1;
    }
    require_unique_ips(&*tx)
}

fn require_unique_ips(tx: &GraphTxn<'_>) -> SyncResult<()> {
    let mut by_ip: BTreeMap<String, usize> = BTreeMap::new();
    for (_, entity) in tx.entities(Label::HardwareNode)? {
        if let Some(node) = entity.as_node() {
            *by_ip.entry(node.ip_address.clone()).or_default() += 1;
        }
    }
    match by_ip.into_iter().find(|(_, count)| *count > 1) {
        Some((ip, _)) => Err(Violation::invariant(format!(
            "IP address {ip} is assigned to more than one hardware node"
        ))
        .into()),
        None => Ok(()),
    }
}

// ── Step 4: clusters ──────────────────────────────────────────────

fn upsert_clusters(
    tx: &mut GraphTxn<'_>,
    manifest: &Manifest,
    report: &mut SyncReport,
) -> SyncResult<()> {
    for spec in &manifest.clusters {
        let mut cluster = Cluster::new(spec.cluster_type, &spec.name)?;
        if spec.cluster_type == ClusterType::Grid && !spec.namespaces.is_empty() {
            return Err(Violation::precondition(format!(
                "namespaces are only valid on kubernetes clusters: {}",
                spec.name
            ))
            .into());
        }
        let cluster_id = tx.merge(&Entity::cluster(cluster.cluster_type, &cluster.name))?;

        let mut members = Vec::with_capacity(spec.nodes.len());
        for hostname in &spec.nodes {
            let Some((node_id, entity)) = tx.find(&EntityRef::node(hostname))? else {
                return Err(Violation::invariant(format!(
                    "cluster {} references unknown hardware node: {hostname}",
                    cluster.name
                ))
                .into());
            };
            if let Some(node) = entity.as_node() {
                cluster.add_node(node)?;
                members.push(node_id);
            }
        }

        tx.detach(cluster_id, RelType::HasNode)?;
        for node_id in members {
            tx.relate(cluster_id, RelType::HasNode, node_id)?;
        }

        for name in &spec.namespaces {
            let namespace = KubernetesNamespace::new(name, &cluster.name)?;
            let namespace_id = tx.merge(&Entity::namespace(&namespace.name))?;
            tx.relate(cluster_id, RelType::HasNamespace, namespace_id)?;
            report.namespaces += 1;
        }
        debug!(
            cluster = %cluster.name,
            family = %cluster.cluster_type,
            nodes = cluster.nodes.len(),
            "cluster reconciled"
        );
        report.clusters += 1;
    }
    Ok(())
}

// ── Step 5: systems, components, deployments ──────────────────────

/// A system with its merged id and the components it declares.
struct ClaimedSystem<'m> {
    id: EntityId,
    system: SoftwareSystem,
    components: Vec<(EntityId, SoftwareComponent, &'m ComponentSpec)>,
}

/// Ownership of every declared component is checked against the stored
/// graph before any `HAS_COMPONENT` edge is replaced, so a component held by
/// another system is rejected no matter how the manifest orders its systems.
fn upsert_systems(
    tx: &mut GraphTxn<'_>,
    manifest: &Manifest,
    report: &mut SyncReport,
) -> SyncResult<()> {
    let mut claimed = Vec::with_capacity(manifest.systems.len());
    for spec in &manifest.systems {
        let system = SoftwareSystem::new(&spec.name)?;
        let system_id = tx.merge(&Entity::system(&system.name))?;

        let mut components = Vec::with_capacity(spec.components.len());
        for component_spec in &spec.components {
            let component = SoftwareComponent::new(&component_spec.name, &component_spec.version)?;
            let component_id = tx.merge(&Entity::Component(component.clone()))?;
            for (owner_id, owner) in tx.incoming_entities(component_id, RelType::HasComponent)? {
                if owner_id != system_id {
                    return Err(Violation::invariant(format!(
                        "component {component} is already owned by system {}",
                        owner.natural_key()
                    ))
                    .into());
                }
            }
            components.push((component_id, component, component_spec));
        }
        claimed.push(ClaimedSystem {
            id: system_id,
            system,
            components,
        });
    }

    for ClaimedSystem {
        id,
        mut system,
        components,
    } in claimed
    {
        tx.detach(id, RelType::HasComponent)?;
        for (component_id, component, _) in &components {
            tx.relate(id, RelType::HasComponent, *component_id)?;
            system.add_component(component.clone());
        }

        for (component_id, component, component_spec) in &components {
            tx.detach(*component_id, RelType::HasDeployment)?;
            for target in &component_spec.deployments {
                let (deployment_id, node) = upsert_deployment(tx, component, target)?;
                tx.relate(*component_id, RelType::HasDeployment, deployment_id)?;
                if target.cluster.is_some() {
                    system.add_cluster_node(&node)?;
                }
                report.deployments += 1;
            }
        }
        debug!(
            system = %system.name,
            components = system.components.len(),
            cluster_nodes = system.cluster_nodes.len(),
            "system reconciled"
        );
        report.components += system.components.len();
        report.systems += 1;
    }
    Ok(())
}

/// Merge one deployment, replace its `TARGETS` edges and check the result.
/// Returns the deployment id and the node it landed on.
fn upsert_deployment(
    tx: &mut GraphTxn<'_>,
    component: &SoftwareComponent,
    target: &TargetSpec,
) -> SyncResult<(EntityId, HardwareNode)> {
    let Some((env_id, Entity::Environment(environment))) =
        tx.find(&EntityRef::environment(&target.environment))?
    else {
        return Err(Violation::precondition(format!(
            "Missing target environment: {}",
            target.environment
        ))
        .into());
    };
    let Some((node_id, Entity::Node(node))) = tx.find(&EntityRef::node(&target.hostname))? else {
        return Err(
            Violation::precondition(format!("Missing target host: {}", target.hostname)).into(),
        );
    };

    let instance = DeploymentInstance::new(component, &environment, &node)?
        .with_namespace(target.namespace.clone())
        .with_cluster(target.cluster.clone());
    let deployment_id = tx.merge(&Entity::deployment(&instance.key))?;

    tx.detach(deployment_id, RelType::Targets)?;
    tx.relate(deployment_id, RelType::Targets, env_id)?;
    tx.relate(deployment_id, RelType::Targets, node_id)?;
    if let Some(namespace) = &instance.namespace {
        let Some(namespace_id) = tx.lookup(&EntityRef::namespace(namespace))? else {
            return Err(Violation::precondition(format!(
                "deployment {} targets unknown namespace: {namespace}",
                instance.key
            ))
            .into());
        };
        tx.relate(deployment_id, RelType::Targets, namespace_id)?;
    }
    if let Some(cluster) = &instance.cluster {
        let cluster_id = resolve_cluster(&*tx, cluster)?;
        tx.relate(deployment_id, RelType::Targets, cluster_id)?;
    }

    let persisted = load_deployment(&*tx, deployment_id)?.ok_or_else(|| {
        Violation::postcondition(format!("deployment {} vanished while reconciling", instance.key))
    })?;
    validate_deployment_target(&persisted)?;
    Ok((deployment_id, node))
}

/// Look a cluster up by name across both families.
fn resolve_cluster(tx: &GraphTxn<'_>, name: &str) -> SyncResult<EntityId> {
    let mut found = Vec::new();
    for family in ClusterType::ALL {
        if let Some(id) = tx.lookup(&EntityRef::cluster(family, name))? {
            found.push(id);
        }
    }
    match found.as_slice() {
        [id] => Ok(*id),
        [] => Err(
            Violation::precondition(format!("deployment targets unknown cluster: {name}")).into(),
        ),
        _ => Err(Violation::precondition(format!(
            "cluster name {name} is ambiguous: declared as both grid and kubernetes"
        ))
        .into()),
    }
}

// ── Step 6: links ─────────────────────────────────────────────────

fn upsert_links(
    tx: &mut GraphTxn<'_>,
    manifest: &Manifest,
    report: &mut SyncReport,
) -> SyncResult<()> {
    for spec in &manifest.links {
        let Some((from_id, Entity::Node(from))) = tx.find(&EntityRef::node(&spec.from_hostname))?
        else {
            return Err(Violation::precondition(format!(
                "Missing network link source host: {}",
                spec.from_hostname
            ))
            .into());
        };
        let Some((to_id, Entity::Node(to))) = tx.find(&EntityRef::node(&spec.to_hostname))? else {
            return Err(Violation::precondition(format!(
                "Missing network link destination host: {}",
                spec.to_hostname
            ))
            .into());
        };

        let link = NetworkLink::new(&from, &to, spec.bandwidth_mbps, spec.latency_ms)?;
        let link_id = tx.merge(&Entity::Link(link))?;
        tx.detach(link_id, RelType::ConnectsFrom)?;
        tx.detach(link_id, RelType::ConnectsTo)?;
        tx.relate(link_id, RelType::ConnectsFrom, from_id)?;
        tx.relate(link_id, RelType::ConnectsTo, to_id)?;
        report.links += 1;
    }
    Ok(())
}
