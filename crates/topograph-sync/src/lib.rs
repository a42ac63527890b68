//! topograph-sync: turns a manifest into persisted graph state.
//!
//! ```text
//! Manifest ──validate_manifest──▶ Reconciler::synchronize ──▶ GraphStore
//!                                   (one write transaction:
//!                                    backfill, upsert, replace, prune)
//!
//! retarget_deployment(key, env, host)
//!   plan_retarget (read)  ──▶ KeyRewrite ──▶ apply (same transaction)
//!
//! update_{system,component,node,subnet,environment}(current, update)
//!   rekey the entity ──▶ rekey dependent deployments and links
//! ```
//!
//! Inventory entities (environments, subnets, nodes, clusters, systems,
//! components) are merged and never pruned. Deployment instances and
//! network links are replaced wholesale on every run.

pub mod error;
pub mod invariants;
pub mod mutation;
pub mod reconciler;
pub mod report;
pub mod retarget;
pub mod validator;

pub use error::{SyncError, SyncResult};
pub use mutation::{
    ComponentUpdate, EntityUpdate, EnvironmentUpdate, NodeUpdate, Rekey, SubnetUpdate,
    SystemUpdate, update_component, update_environment, update_node, update_subnet,
    update_system,
};
pub use reconciler::Reconciler;
pub use report::{OperationResult, OperationStatus, SyncReport};
pub use retarget::{KeyRewrite, plan_retarget, retarget_deployment};
pub use validator::validate_manifest;
