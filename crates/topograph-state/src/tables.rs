//! redb table definitions for the Topograph graph store.

use redb::TableDefinition;

/// Entity records (JSON `Entity`) keyed by numeric id.
pub const ENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("entities");

/// Natural-key index: `{label}/{natural key}` → entity id.
pub const ENTITY_KEYS: TableDefinition<&str, u64> = TableDefinition::new("entity_keys");

/// Relationships keyed by `{from:020}|{TYPE}|{to:020}`; values are empty.
pub const EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");

/// Reverse edge index keyed by `{to:020}|{TYPE}|{from:020}`. Holds exactly
/// the edges in [`EDGES`].
pub const EDGES_IN: TableDefinition<&str, &[u8]> = TableDefinition::new("edges_in");

/// Counters (id sequence).
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in [`META`] holding the next entity id to allocate.
pub const NEXT_ENTITY_ID: &str = "next_entity_id";
