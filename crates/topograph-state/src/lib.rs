//! topograph-state: embedded labeled graph store for Topograph.
//!
//! Backed by [redb](https://docs.rs/redb). Entities are JSON-serialized into
//! an id-keyed table; a second table maps `{label}/{natural key}` to the id
//! so merges find existing records; relationships live in an edge table
//! keyed `{from}|{TYPE}|{to}` with zero-padded ids, so the outgoing edges of
//! one entity form a contiguous key range. A mirror table keyed
//! `{to}|{TYPE}|{from}` does the same for incoming edges.
//!
//! # Architecture
//!
//! ```text
//! GraphStore (Clone, Arc<Database>)
//!   ├── write(|tx: &mut GraphTxn| ...)   one redb write transaction,
//!   │                                    committed on Ok, aborted on Err
//!   ├── read(|view: &GraphView| ...)     MVCC snapshot
//!   └── GraphRead                        query surface shared by both
//! ```

pub mod error;
pub mod query;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use query::{ClusterNodeView, DeploymentView, ImpactView, SystemOverview};
pub use store::{GraphRead, GraphStore, GraphTxn, GraphView};
pub use types::*;
