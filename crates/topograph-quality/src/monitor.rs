//! Quality gate scheduler: periodic evaluation into a single snapshot slot.
//!
//! The slot is a `watch` channel. Every evaluation replaces its value
//! wholesale, so readers see either the previous snapshot or the new one.
//! Before the first scheduled run, `latest_report` evaluates on demand.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use topograph_state::GraphStore;

use crate::error::{QualityError, QualityResult};
use crate::gate::{QualityReport, evaluate};

/// One evaluation and when it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySnapshot {
    pub generated_at: DateTime<Utc>,
    pub report: QualityReport,
}

type Slot = Option<Arc<QualitySnapshot>>;

#[derive(Clone)]
pub struct QualityGate {
    store: GraphStore,
    latest: Arc<watch::Sender<Slot>>,
}

impl QualityGate {
    pub fn new(store: GraphStore) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            store,
            latest: Arc::new(latest),
        }
    }

    /// Evaluate now without touching the cached snapshot.
    pub fn evaluate(&self) -> QualityResult<QualitySnapshot> {
        let report = evaluate(&self.store)?;
        Ok(QualitySnapshot {
            generated_at: Utc::now(),
            report,
        })
    }

    /// Evaluate now and publish the result as the latest snapshot.
    pub fn evaluate_and_store(&self) -> QualityResult<Arc<QualitySnapshot>> {
        let snapshot = Arc::new(self.evaluate()?);
        self.latest.send_replace(Some(snapshot.clone()));
        Ok(snapshot)
    }

    pub fn cached(&self) -> Option<Arc<QualitySnapshot>> {
        self.latest.borrow().clone()
    }

    /// The cached snapshot, or a fresh evaluation on cold start.
    pub fn latest_report(&self) -> QualityResult<Arc<QualitySnapshot>> {
        match self.cached() {
            Some(snapshot) => Ok(snapshot),
            None => self.evaluate_and_store(),
        }
    }

    /// Receiver notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Slot> {
        self.latest.subscribe()
    }

    /// One scheduled evaluation. Store I/O runs on the blocking pool.
    pub async fn run_once(&self) -> QualityResult<Arc<QualitySnapshot>> {
        let gate = self.clone();
        let snapshot = tokio::task::spawn_blocking(move || gate.evaluate_and_store())
            .await
            .map_err(|e| QualityError::Task(e.to_string()))??;

        if snapshot.report.passed() {
            info!("quality gate passed");
        } else {
            warn!(
                findings = snapshot.report.finding_count(),
                report = ?snapshot.report.findings,
                "quality gate failed"
            );
        }
        Ok(snapshot)
    }

    /// Evaluate every `interval` until `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "quality gate scheduler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "quality gate evaluation failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("quality gate scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) onto the current runtime.
    pub fn spawn(&self, interval: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move { gate.run(interval, shutdown).await })
    }
}
