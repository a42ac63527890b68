//! topograph-quality: read-only defect scan over the whole graph.
//!
//! `evaluate` walks the persisted graph once and files findings into five
//! categories. `QualityGate` keeps the latest result in a single snapshot
//! slot and can refresh it on a timer.
//!
//! # Architecture
//!
//! ```text
//! QualityGate (Clone)
//!   ├── GraphStore              evaluated on the blocking pool
//!   ├── watch::Sender<Snapshot> latest snapshot, replaced whole
//!   └── run(interval, shutdown) periodic refresh until shutdown fires
//! ```
//!
//! Findings are data. A failing gate is never an error.

pub mod error;
pub mod gate;
pub mod monitor;

pub use error::{QualityError, QualityResult};
pub use gate::{QualityReport, evaluate, evaluate_graph};
pub use monitor::{QualityGate, QualitySnapshot};
