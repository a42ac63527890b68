use std::path::Path;

use topograph_core::{Manifest, TopographConfig};
use topograph_sync::{OperationResult, Reconciler};

use super::{open_store, print_json};

/// Print the outcome and turn a failed one into a non-zero exit.
fn finish(result: OperationResult) -> anyhow::Result<()> {
    print_json(&result)?;
    if !result.is_success() {
        anyhow::bail!("{}", result.message);
    }
    Ok(())
}

pub fn ingest(config: &TopographConfig, file: &Path) -> anyhow::Result<()> {
    let manifest = match Manifest::from_file(file) {
        Ok(manifest) => manifest,
        Err(e) => return finish(OperationResult::failed(e.to_string())),
    };
    let reconciler = Reconciler::new(open_store(config)?);
    finish(reconciler.ingest(&manifest))
}

pub fn validate(file: &Path) -> anyhow::Result<()> {
    let result = match Manifest::from_file(file) {
        Ok(manifest) => match topograph_sync::validate_manifest(&manifest) {
            Ok(()) => OperationResult::passed("Manifest passed contract validation"),
            Err(violation) => OperationResult::failed(violation.to_string()),
        },
        Err(e) => OperationResult::failed(e.to_string()),
    };
    finish(result)
}

pub fn retarget(config: &TopographConfig, key: &str, env: &str, host: &str) -> anyhow::Result<()> {
    let reconciler = Reconciler::new(open_store(config)?);
    let rewrite = reconciler.retarget(key, env, host)?;
    print_json(&rewrite)
}
