pub mod graph;
pub mod quality;
pub mod query;
pub mod update;

use anyhow::Context;
use serde::Serialize;
use topograph_core::TopographConfig;
use topograph_state::GraphStore;
use tracing::debug;

/// Open the configured graph database, creating its directory if needed.
pub fn open_store(config: &TopographConfig) -> anyhow::Result<GraphStore> {
    let path = &config.store.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = GraphStore::open(path)
        .with_context(|| format!("opening graph store {}", path.display()))?;
    debug!(path = %path.display(), "graph store opened");
    Ok(store)
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_store_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TopographConfig::default();
        config.store.path = dir.path().join("nested/state/topograph.redb");

        let store = open_store(&config).unwrap();
        assert!(config.store.path.exists());
        assert!(store.dump().unwrap().entities.is_empty());
    }
}
