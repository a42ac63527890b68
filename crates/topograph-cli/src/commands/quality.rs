use std::time::Duration;

use tokio::sync::watch;
use topograph_core::TopographConfig;
use topograph_quality::QualityGate;
use tracing::info;

use super::{open_store, print_json};

pub fn evaluate(config: &TopographConfig, format: &str) -> anyhow::Result<()> {
    let gate = QualityGate::new(open_store(config)?);
    let snapshot = gate.evaluate()?;

    match format {
        "json" => print_json(&snapshot)?,
        _ => {
            let verdict = if snapshot.report.passed() { "PASSED" } else { "FAILED" };
            println!("quality gate {verdict} at {}", snapshot.generated_at.to_rfc3339());
            for (category, findings) in &snapshot.report.findings {
                println!("  {category}: {}", findings.len());
                for finding in findings {
                    println!("    - {finding}");
                }
            }
        }
    }
    Ok(())
}

pub async fn serve(config: &TopographConfig, interval: Option<u64>) -> anyhow::Result<()> {
    if !config.quality.enabled {
        info!("quality gate disabled in configuration; nothing to serve");
        return Ok(());
    }
    let interval = Duration::from_secs(interval.unwrap_or(config.quality.interval_secs).max(1));
    let gate = QualityGate::new(open_store(config)?);

    // First snapshot right away; the scheduler takes over from there.
    gate.run_once().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = gate.spawn(interval, shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    info!("quality gate stopped");
    Ok(())
}
