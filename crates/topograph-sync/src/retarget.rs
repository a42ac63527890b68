//! Deployment-key canonicalization when one placement moves.
//!
//! The owning component decides the `name:version` half of the new key.
//! Only when no component owns the instance is the current key parsed.

use serde::Serialize;
use topograph_core::{
    DeploymentInstance, DeploymentKey, SoftwareComponent, Violation, require_non_blank,
};
use topograph_state::{
    Entity, EntityId, EntityRef, GraphRead, GraphStore, GraphTxn, Label, RelType,
};
use tracing::info;

use crate::error::{SyncError, SyncResult};
use crate::invariants::{require_subnet_placement, validate_deployment_target};

/// A planned key change and the `TARGETS` edges it rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRewrite {
    pub previous_key: String,
    pub new_key: String,
    /// Targets dropped, including any legacy-encoded ones.
    pub removed_targets: Vec<EntityRef>,
    pub added_targets: Vec<EntityRef>,
    #[serde(skip)]
    deployment: EntityId,
    #[serde(skip)]
    environment: EntityId,
    #[serde(skip)]
    node: EntityId,
}

const TARGET_RELS: [RelType; 3] = [
    RelType::Targets,
    RelType::LegacyTargetEnvironment,
    RelType::LegacyTargetNode,
];

/// Work out what retargeting `current_key` onto (`environment`, `hostname`)
/// changes, without changing anything.
pub fn plan_retarget<G: GraphRead>(
    graph: &G,
    current_key: &str,
    environment: &str,
    hostname: &str,
) -> SyncResult<KeyRewrite> {
    require_non_blank(current_key, "deployment key")?;
    require_non_blank(environment, "target environment")?;
    require_non_blank(hostname, "target hostname")?;

    let Some(deployment_id) =
        graph.lookup(&EntityRef::new(Label::DeploymentInstance, current_key))?
    else {
        return Err(
            Violation::precondition(format!("DeploymentInstance not found: {current_key}")).into(),
        );
    };
    let Some((env_id, Entity::Environment(env))) = graph.find(&EntityRef::environment(environment))?
    else {
        return Err(
            Violation::precondition(format!("Target environment not found: {environment}")).into(),
        );
    };
    let Some((node_id, Entity::Node(node))) = graph.find(&EntityRef::node(hostname))? else {
        return Err(Violation::precondition(format!("Target node not found: {hostname}")).into());
    };

    let component = owning_component(graph, deployment_id, current_key)?;
    require_subnet_placement(graph, node_id, &node)?;

    let instance = DeploymentInstance::new(&component, &env, &node)?;
    validate_deployment_target(&instance)?;

    if let Some(holder) = graph.lookup(&EntityRef::new(Label::DeploymentInstance, &instance.key))? {
        if holder != deployment_id {
            return Err(Violation::invariant(format!(
                "Deployment key already exists: {}",
                instance.key
            ))
            .into());
        }
    }

    let mut removed_targets = Vec::new();
    for rel in TARGET_RELS {
        for (_, target) in graph.outgoing_entities(deployment_id, rel)? {
            removed_targets.push(target.reference());
        }
    }
    removed_targets.sort();
    removed_targets.dedup();

    Ok(KeyRewrite {
        previous_key: current_key.to_string(),
        new_key: instance.key,
        removed_targets,
        added_targets: vec![
            EntityRef::environment(&env.name),
            EntityRef::node(&node.hostname),
        ],
        deployment: deployment_id,
        environment: env_id,
        node: node_id,
    })
}

/// The component owning the instance, else the one encoded in its key.
fn owning_component<G: GraphRead>(
    graph: &G,
    deployment_id: EntityId,
    current_key: &str,
) -> SyncResult<SoftwareComponent> {
    let owner = graph
        .incoming_entities(deployment_id, RelType::HasDeployment)?
        .into_iter()
        .find_map(|(_, e)| e.as_component().cloned());
    if let Some(component) = owner {
        return Ok(component);
    }
    let key = DeploymentKey::parse(current_key)?;
    Ok(SoftwareComponent::new(key.component, key.version)?)
}

/// Execute a plan inside an open transaction.
pub fn apply_retarget(tx: &mut GraphTxn<'_>, plan: &KeyRewrite) -> SyncResult<()> {
    for rel in TARGET_RELS {
        tx.detach(plan.deployment, rel)?;
    }
    tx.relate(plan.deployment, RelType::Targets, plan.environment)?;
    tx.relate(plan.deployment, RelType::Targets, plan.node)?;
    tx.rekey(plan.deployment, &Entity::deployment(&plan.new_key))?;
    Ok(())
}

/// Plan and apply a retarget in one write transaction.
pub fn retarget_deployment(
    store: &GraphStore,
    current_key: &str,
    environment: &str,
    hostname: &str,
) -> SyncResult<KeyRewrite> {
    let plan = store.write(|tx| {
        let plan = plan_retarget(&*tx, current_key, environment, hostname)?;
        apply_retarget(tx, &plan)?;
        Ok::<_, SyncError>(plan)
    })?;
    info!(
        previous_key = %plan.previous_key,
        new_key = %plan.new_key,
        "deployment retargeted"
    );
    Ok(plan)
}
