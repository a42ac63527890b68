//! topograph-core: shared types for the Topograph deployment graph.
//!
//! Holds everything that needs no storage: the manifest model and its YAML
//! parser, the domain entities (whose constructors enforce structural
//! invariants), the canonical deployment key, the three-kind contract
//! violation error, and `topograph.toml` configuration.

pub mod config;
pub mod domain;
pub mod error;
pub mod key;
pub mod manifest;

pub use config::TopographConfig;
pub use domain::*;
pub use error::{ContractResult, Violation, ViolationKind, require_non_blank};
pub use key::DeploymentKey;
pub use manifest::{Manifest, ManifestError};
