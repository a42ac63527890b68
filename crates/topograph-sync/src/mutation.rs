//! Single-entity updates, including ones that change a natural key.
//!
//! Every update runs in one write transaction. A missing entity is a
//! precondition violation and a new key held by another entity is an
//! invariant violation. Deployment keys embed environment names, hostnames
//! and component identities, and link keys embed hostnames, so a rename
//! rekeys the dependent records in the same transaction. Edges are never
//! touched by a rekey.

use serde::{Deserialize, Serialize};
use topograph_core::{
    DeploymentKey, EnvironmentType, ExecutionEnvironment, HardwareNode, NodeType,
    SoftwareComponent, SoftwareSystem, Subnet, Violation, require_non_blank,
};
use topograph_state::{
    Entity, EntityId, EntityRef, GraphRead, GraphStore, GraphTxn, Label, RelType,
};
use tracing::{debug, info};

use crate::error::SyncResult;
use crate::invariants::require_cluster_family_role;
use crate::reconciler::sync_implicit_membership;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SystemUpdate {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentUpdate {
    pub name: String,
    pub version: String,
}

/// New properties for a hardware node. `roles` replaces the stored set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeUpdate {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub hostname: String,
    pub ip_address: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubnetUpdate {
    pub cidr: String,
    pub vlan: String,
    pub routing_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvironmentUpdate {
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: EnvironmentType,
}

/// What one update changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdate {
    pub previous: EntityRef,
    pub updated: EntityRef,
    /// Dependent records whose keys moved with the update.
    pub rekeyed: Vec<Rekey>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Rekey {
    pub from: EntityRef,
    pub to: EntityRef,
}

impl EntityUpdate {
    /// True when the entity's natural key changed.
    pub fn renamed(&self) -> bool {
        self.previous != self.updated
    }
}

pub fn update_system(
    store: &GraphStore,
    name: &str,
    update: &SystemUpdate,
) -> SyncResult<EntityUpdate> {
    require_non_blank(name, "system name")?;
    let system = SoftwareSystem::new(&update.name)?;
    commit(store, |tx| {
        let (id, current) = load(tx, &EntityRef::system(name))?;
        let updated = Entity::system(&system.name);
        require_key_free(tx, id, &updated, "System name already exists")?;
        replace(tx, id, &current, &updated)
    })
}

/// Rename or re-version a component. Its deployments follow.
pub fn update_component(
    store: &GraphStore,
    name: &str,
    version: &str,
    update: &ComponentUpdate,
) -> SyncResult<EntityUpdate> {
    require_non_blank(name, "component name")?;
    require_non_blank(version, "component version")?;
    let component = SoftwareComponent::new(&update.name, &update.version)?;
    commit(store, |tx| {
        let (id, current) = load(tx, &EntityRef::component(name, version))?;
        let updated = Entity::Component(component.clone());
        require_key_free(tx, id, &updated, "Component name/version combination already exists")?;
        let mut outcome = replace(tx, id, &current, &updated)?;
        if outcome.renamed() {
            for (deployment_id, deployment) in tx.outgoing_entities(id, RelType::HasDeployment)? {
                rekey_deployment(tx, deployment_id, &deployment, &mut outcome, |key| {
                    DeploymentKey::new(
                        &key.environment,
                        &key.hostname,
                        &component.name,
                        &component.version,
                    )
                })?;
            }
        }
        Ok(outcome)
    })
}

/// Replace a node's properties. A hostname change rekeys the deployments
/// placed on it and the links touching it.
///
/// The node must keep the family role of every explicit cluster it sits in;
/// implicit membership is adjusted to the new role set.
pub fn update_node(
    store: &GraphStore,
    hostname: &str,
    update: &NodeUpdate,
) -> SyncResult<EntityUpdate> {
    require_non_blank(hostname, "hostname")?;
    let node = HardwareNode::new(
        update.node_type,
        &update.hostname,
        &update.ip_address,
        update.roles.iter().cloned(),
    )?;
    commit(store, |tx| {
        let (id, current) = load(tx, &EntityRef::node(hostname))?;
        let updated = Entity::Node(node.clone());
        require_key_free(tx, id, &updated, "Hostname already exists")?;
        require_free_ip(tx, id, &node.ip_address)?;
        for (_, owner) in tx.incoming_entities(id, RelType::HasNode)? {
            if let Entity::Cluster(cluster) = owner {
                if cluster.name != cluster.cluster_type.implicit_cluster_name() {
                    require_cluster_family_role(&node, cluster.cluster_type)?;
                }
            }
        }

        let mut outcome = replace(tx, id, &current, &updated)?;
        sync_implicit_membership(tx, id, &node)?;
        if !outcome.renamed() {
            return Ok(outcome);
        }

        for (deployment_id, deployment) in placed_deployments(tx, id, RelType::LegacyTargetNode)? {
            rekey_deployment(tx, deployment_id, &deployment, &mut outcome, |key| {
                if key.hostname == hostname {
                    key.retarget(&key.environment, &node.hostname)
                } else {
                    key.clone()
                }
            })?;
        }

        let mut link_ids = tx.incoming(id, RelType::ConnectsFrom)?;
        link_ids.extend(tx.incoming(id, RelType::ConnectsTo)?);
        link_ids.sort_unstable();
        link_ids.dedup();
        for (link_id, link) in tx.resolve(link_ids)? {
            let Entity::Link(record) = &link else { continue };
            let mut moved = record.clone();
            if moved.from_hostname == hostname {
                moved.from_hostname = node.hostname.clone();
            }
            if moved.to_hostname == hostname {
                moved.to_hostname = node.hostname.clone();
            }
            let moved = Entity::Link(moved);
            require_key_free(tx, link_id, &moved, "NetworkLink already exists")?;
            rekey_dependent(tx, link_id, &link, &moved, &mut outcome)?;
        }
        Ok(outcome)
    })
}

pub fn update_subnet(
    store: &GraphStore,
    cidr: &str,
    update: &SubnetUpdate,
) -> SyncResult<EntityUpdate> {
    require_non_blank(cidr, "subnet cidr")?;
    let subnet = Subnet::new(&update.cidr, &update.vlan, &update.routing_zone)?;
    commit(store, |tx| {
        let (id, current) = load(tx, &EntityRef::subnet(cidr))?;
        let updated = Entity::subnet(&subnet.cidr, &subnet.vlan, &subnet.routing_zone);
        require_key_free(tx, id, &updated, "CIDR already exists")?;
        replace(tx, id, &current, &updated)
    })
}

/// Rename or retype an environment. Deployments into it follow a rename.
pub fn update_environment(
    store: &GraphStore,
    name: &str,
    update: &EnvironmentUpdate,
) -> SyncResult<EntityUpdate> {
    require_non_blank(name, "environment name")?;
    let environment = ExecutionEnvironment::new(&update.name, update.env_type)?;
    commit(store, |tx| {
        let (id, current) = load(tx, &EntityRef::environment(name))?;
        let updated = Entity::Environment(environment.clone());
        require_key_free(tx, id, &updated, "Environment name already exists")?;
        let mut outcome = replace(tx, id, &current, &updated)?;
        if outcome.renamed() {
            let placed = placed_deployments(tx, id, RelType::LegacyTargetEnvironment)?;
            for (deployment_id, deployment) in placed {
                rekey_deployment(tx, deployment_id, &deployment, &mut outcome, |key| {
                    if key.environment == name {
                        key.retarget(&environment.name, &key.hostname)
                    } else {
                        key.clone()
                    }
                })?;
            }
        }
        Ok(outcome)
    })
}

fn commit<F>(store: &GraphStore, f: F) -> SyncResult<EntityUpdate>
where
    F: FnOnce(&mut GraphTxn<'_>) -> SyncResult<EntityUpdate>,
{
    let outcome = store.write(f)?;
    info!(
        previous = %outcome.previous,
        updated = %outcome.updated,
        rekeyed = outcome.rekeyed.len(),
        "entity updated"
    );
    Ok(outcome)
}

fn load(tx: &GraphTxn<'_>, reference: &EntityRef) -> SyncResult<(EntityId, Entity)> {
    tx.find(reference)?.ok_or_else(|| {
        Violation::precondition(format!("{} not found: {}", reference.label, reference.key)).into()
    })
}

fn require_key_free(
    tx: &GraphTxn<'_>,
    id: EntityId,
    entity: &Entity,
    conflict: &str,
) -> SyncResult<()> {
    match tx.lookup(&entity.reference())? {
        Some(holder) if holder != id => {
            Err(Violation::invariant(format!("{conflict}: {}", entity.natural_key())).into())
        }
        _ => Ok(()),
    }
}

fn require_free_ip(tx: &GraphTxn<'_>, id: EntityId, ip_address: &str) -> SyncResult<()> {
    let taken = tx
        .entities(Label::HardwareNode)?
        .into_iter()
        .any(|(other, e)| other != id && e.as_node().is_some_and(|n| n.ip_address == ip_address));
    if taken {
        return Err(
            Violation::invariant(format!("IP address already exists: {ip_address}")).into(),
        );
    }
    Ok(())
}

fn replace(
    tx: &mut GraphTxn<'_>,
    id: EntityId,
    current: &Entity,
    updated: &Entity,
) -> SyncResult<EntityUpdate> {
    tx.rekey(id, updated)?;
    Ok(EntityUpdate {
        previous: current.reference(),
        updated: updated.reference(),
        rekeyed: Vec::new(),
    })
}

/// Deployments with a `TARGETS` (or legacy `legacy_rel`) edge into `id`.
fn placed_deployments(
    tx: &GraphTxn<'_>,
    id: EntityId,
    legacy_rel: RelType,
) -> SyncResult<Vec<(EntityId, Entity)>> {
    let mut ids = tx.incoming(id, RelType::Targets)?;
    ids.extend(tx.incoming(id, legacy_rel)?);
    ids.sort_unstable();
    ids.dedup();
    Ok(tx
        .resolve(ids)?
        .into_iter()
        .filter(|(_, e)| e.label() == Label::DeploymentInstance)
        .collect())
}

fn rekey_deployment(
    tx: &mut GraphTxn<'_>,
    id: EntityId,
    current: &Entity,
    outcome: &mut EntityUpdate,
    rewrite: impl Fn(&DeploymentKey) -> DeploymentKey,
) -> SyncResult<()> {
    let key = DeploymentKey::parse(&current.natural_key())?;
    let updated = Entity::deployment(&rewrite(&key).to_string());
    require_key_free(tx, id, &updated, "Deployment key already exists")?;
    rekey_dependent(tx, id, current, &updated, outcome)
}

fn rekey_dependent(
    tx: &mut GraphTxn<'_>,
    id: EntityId,
    current: &Entity,
    updated: &Entity,
    outcome: &mut EntityUpdate,
) -> SyncResult<()> {
    if current == updated {
        return Ok(());
    }
    tx.rekey(id, updated)?;
    let rekey = Rekey {
        from: current.reference(),
        to: updated.reference(),
    };
    debug!(from = %rekey.from, to = %rekey.to, "dependent record rekeyed");
    outcome.rekeyed.push(rekey);
    Ok(())
}
