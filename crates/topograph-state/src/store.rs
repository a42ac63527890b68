//! GraphStore: redb-backed labeled property graph for Topograph.
//!
//! Entities are JSON-serialized into redb's `&[u8]` value columns. All
//! mutation happens inside [`GraphStore::write`], which hands a [`GraphTxn`]
//! to a closure and commits only if the closure returns `Ok`. Readers get a
//! [`GraphView`] over an MVCC snapshot and never observe a partial write.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadOnlyTable, ReadableDatabase, ReadableTable, Table, WriteTransaction};
use topograph_core::Violation;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const NO_PROPERTIES: &[u8] = &[];

/// Thread-safe graph store backed by redb.
#[derive(Clone)]
pub struct GraphStore {
    db: Arc<Database>,
}

impl GraphStore {
    /// Open (or create) a persistent graph store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "graph store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory graph store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory graph store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        txn.open_table(ENTITY_KEYS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        {
            let edges = txn.open_table(EDGES).map_err(map_err!(Table))?;
            let mut edges_in = txn.open_table(EDGES_IN).map_err(map_err!(Table))?;
            // Databases written before the reverse index existed.
            if edges_in.iter().map_err(map_err!(Read))?.next().is_none() {
                let existing = scan_edges(&edges)?;
                for edge in &existing {
                    let key = edge.reverse_key();
                    edges_in
                        .insert(key.as_str(), NO_PROPERTIES)
                        .map_err(map_err!(Write))?;
                }
                if !existing.is_empty() {
                    debug!(count = existing.len(), "rebuilt reverse edge index");
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`; aborts and leaves the graph untouched
    /// when it returns `Err`. redb admits one writer at a time, so
    /// concurrent callers are serialized here.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut GraphTxn<'_>) -> Result<T, E>,
        E: From<StateError>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let mut graph = GraphTxn::open(&txn)?;
            f(&mut graph)
        };
        match outcome {
            Ok(value) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!("graph transaction committed");
                Ok(value)
            }
            Err(err) => {
                txn.abort().map_err(map_err!(Transaction))?;
                debug!("graph transaction aborted");
                Err(err)
            }
        }
    }

    /// Run `f` against a consistent snapshot of the graph.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&GraphView) -> Result<T, E>,
        E: From<StateError>,
    {
        let view = GraphView::open(&self.db)?;
        f(&view)
    }

    /// Every entity and edge, named by natural key and sorted.
    pub fn dump(&self) -> StateResult<GraphDump> {
        self.read(|view| {
            let all = view.all_entities()?;
            let refs: HashMap<EntityId, EntityRef> =
                all.iter().map(|(id, e)| (*id, e.reference())).collect();

            let mut entities: Vec<DumpEntity> = all
                .into_iter()
                .map(|(_, entity)| DumpEntity {
                    reference: entity.reference(),
                    entity,
                })
                .collect();
            entities.sort_by(|a, b| a.reference.cmp(&b.reference));

            let mut edges = Vec::new();
            for edge in view.edges()? {
                let endpoint = |id: EntityId| {
                    refs.get(&id).cloned().ok_or_else(|| {
                        StateError::CorruptEdge(format!(
                            "{} points at missing entity {id}",
                            edge.table_key()
                        ))
                    })
                };
                edges.push(DumpEdge {
                    from: endpoint(edge.from)?,
                    rel: edge.rel,
                    to: endpoint(edge.to)?,
                });
            }
            edges.sort();

            Ok(GraphDump { entities, edges })
        })
    }
}

// ── Read surface ──────────────────────────────────────────────────

/// Queries shared by write transactions and read snapshots.
pub trait GraphRead {
    fn entity(&self, id: EntityId) -> StateResult<Option<Entity>>;

    /// Resolve a natural key to its entity id.
    fn lookup(&self, reference: &EntityRef) -> StateResult<Option<EntityId>>;

    fn all_entities(&self) -> StateResult<Vec<(EntityId, Entity)>>;

    /// Targets of `from`'s outgoing `rel` edges.
    fn outgoing(&self, from: EntityId, rel: RelType) -> StateResult<Vec<EntityId>>;

    fn edges(&self) -> StateResult<Vec<Edge>>;

    /// All entities carrying `label`, in id order. Includes records that
    /// share a natural key with another record.
    fn entities(&self, label: Label) -> StateResult<Vec<(EntityId, Entity)>> {
        Ok(self
            .all_entities()?
            .into_iter()
            .filter(|(_, e)| e.label() == label)
            .collect())
    }

    fn find(&self, reference: &EntityRef) -> StateResult<Option<(EntityId, Entity)>> {
        let Some(id) = self.lookup(reference)? else {
            return Ok(None);
        };
        Ok(self.entity(id)?.map(|e| (id, e)))
    }

    /// Sources of the `rel` edges pointing at `to`.
    fn incoming(&self, to: EntityId, rel: RelType) -> StateResult<Vec<EntityId>>;

    fn outgoing_entities(
        &self,
        from: EntityId,
        rel: RelType,
    ) -> StateResult<Vec<(EntityId, Entity)>> {
        self.resolve(self.outgoing(from, rel)?)
    }

    fn incoming_entities(
        &self,
        to: EntityId,
        rel: RelType,
    ) -> StateResult<Vec<(EntityId, Entity)>> {
        self.resolve(self.incoming(to, rel)?)
    }

    fn has_edge(&self, from: EntityId, rel: RelType, to: EntityId) -> StateResult<bool> {
        Ok(self.outgoing(from, rel)?.contains(&to))
    }

    /// Load the entities behind `ids`, skipping ids with no record.
    fn resolve(&self, ids: Vec<EntityId>) -> StateResult<Vec<(EntityId, Entity)>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.entity(id)? {
                out.push((id, entity));
            }
        }
        Ok(out)
    }
}

fn decode(bytes: &[u8]) -> StateResult<Entity> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn read_entity<T>(table: &T, id: EntityId) -> StateResult<Option<Entity>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn read_index<T>(table: &T, reference: &EntityRef) -> StateResult<Option<EntityId>>
where
    T: ReadableTable<&'static str, u64>,
{
    let key = reference.index_key();
    Ok(table
        .get(key.as_str())
        .map_err(map_err!(Read))?
        .map(|guard| guard.value()))
}

fn scan_entities<T>(table: &T) -> StateResult<Vec<(EntityId, Entity)>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (id, value) = entry.map_err(map_err!(Read))?;
        results.push((id.value(), decode(value.value())?));
    }
    Ok(results)
}

fn scan_outgoing<T>(table: &T, from: EntityId) -> StateResult<Vec<Edge>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let start = Edge::range_start(from);
    let end = Edge::range_end(from);
    let mut results = Vec::new();
    for entry in table
        .range(start.as_str()..end.as_str())
        .map_err(map_err!(Read))?
    {
        let (key, _) = entry.map_err(map_err!(Read))?;
        results.push(Edge::parse(key.value())?);
    }
    Ok(results)
}

fn scan_incoming<T>(table: &T, to: EntityId) -> StateResult<Vec<Edge>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let start = Edge::range_start(to);
    let end = Edge::range_end(to);
    let mut results = Vec::new();
    for entry in table
        .range(start.as_str()..end.as_str())
        .map_err(map_err!(Read))?
    {
        let (key, _) = entry.map_err(map_err!(Read))?;
        results.push(Edge::parse_reverse(key.value())?);
    }
    Ok(results)
}

fn scan_edges<T>(table: &T) -> StateResult<Vec<Edge>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        results.push(Edge::parse(key.value())?);
    }
    Ok(results)
}

// ── Read snapshot ─────────────────────────────────────────────────

/// Read-only view over one MVCC snapshot.
pub struct GraphView {
    entities: ReadOnlyTable<u64, &'static [u8]>,
    keys: ReadOnlyTable<&'static str, u64>,
    edges: ReadOnlyTable<&'static str, &'static [u8]>,
    edges_in: ReadOnlyTable<&'static str, &'static [u8]>,
}

impl GraphView {
    fn open(db: &Database) -> StateResult<Self> {
        let txn = db.begin_read().map_err(map_err!(Transaction))?;
        Ok(Self {
            entities: txn.open_table(ENTITIES).map_err(map_err!(Table))?,
            keys: txn.open_table(ENTITY_KEYS).map_err(map_err!(Table))?,
            edges: txn.open_table(EDGES).map_err(map_err!(Table))?,
            edges_in: txn.open_table(EDGES_IN).map_err(map_err!(Table))?,
        })
    }
}

impl GraphRead for GraphView {
    fn entity(&self, id: EntityId) -> StateResult<Option<Entity>> {
        read_entity(&self.entities, id)
    }

    fn lookup(&self, reference: &EntityRef) -> StateResult<Option<EntityId>> {
        read_index(&self.keys, reference)
    }

    fn all_entities(&self) -> StateResult<Vec<(EntityId, Entity)>> {
        scan_entities(&self.entities)
    }

    fn outgoing(&self, from: EntityId, rel: RelType) -> StateResult<Vec<EntityId>> {
        Ok(scan_outgoing(&self.edges, from)?
            .into_iter()
            .filter(|e| e.rel == rel)
            .map(|e| e.to)
            .collect())
    }

    fn incoming(&self, to: EntityId, rel: RelType) -> StateResult<Vec<EntityId>> {
        Ok(scan_incoming(&self.edges_in, to)?
            .into_iter()
            .filter(|e| e.rel == rel)
            .map(|e| e.from)
            .collect())
    }

    fn edges(&self) -> StateResult<Vec<Edge>> {
        scan_edges(&self.edges)
    }
}

// ── Write transaction ─────────────────────────────────────────────

/// Mutable handle over one open write transaction.
pub struct GraphTxn<'t> {
    entities: Table<'t, u64, &'static [u8]>,
    keys: Table<'t, &'static str, u64>,
    edges: Table<'t, &'static str, &'static [u8]>,
    edges_in: Table<'t, &'static str, &'static [u8]>,
    meta: Table<'t, &'static str, u64>,
}

impl<'t> GraphTxn<'t> {
    fn open(txn: &'t WriteTransaction) -> StateResult<Self> {
        Ok(Self {
            entities: txn.open_table(ENTITIES).map_err(map_err!(Table))?,
            keys: txn.open_table(ENTITY_KEYS).map_err(map_err!(Table))?,
            edges: txn.open_table(EDGES).map_err(map_err!(Table))?,
            edges_in: txn.open_table(EDGES_IN).map_err(map_err!(Table))?,
            meta: txn.open_table(META).map_err(map_err!(Table))?,
        })
    }

    fn allocate_id(&mut self) -> StateResult<EntityId> {
        let next = match self.meta.get(NEXT_ENTITY_ID).map_err(map_err!(Read))? {
            Some(guard) => guard.value(),
            None => 1,
        };
        self.meta
            .insert(NEXT_ENTITY_ID, next + 1)
            .map_err(map_err!(Write))?;
        Ok(next)
    }

    fn store_record(&mut self, id: EntityId, entity: &Entity) -> StateResult<()> {
        let value = serde_json::to_vec(entity).map_err(map_err!(Serialize))?;
        self.entities
            .insert(id, value.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    /// Drop the index entry for `reference` if it still points at `id`.
    fn unindex(&mut self, reference: &EntityRef, id: EntityId) -> StateResult<()> {
        if read_index(&self.keys, reference)? == Some(id) {
            let key = reference.index_key();
            self.keys.remove(key.as_str()).map_err(map_err!(Write))?;
        }
        Ok(())
    }

    /// Insert a new record without consulting the natural-key index. If the
    /// key is already indexed the index keeps pointing at the older record.
    pub fn create(&mut self, entity: &Entity) -> StateResult<EntityId> {
        let id = self.allocate_id()?;
        self.store_record(id, entity)?;
        let reference = entity.reference();
        if read_index(&self.keys, &reference)?.is_none() {
            let key = reference.index_key();
            self.keys.insert(key.as_str(), id).map_err(map_err!(Write))?;
        }
        Ok(id)
    }

    /// Create the entity, or overwrite the properties of the one already
    /// stored under the same natural key.
    pub fn merge(&mut self, entity: &Entity) -> StateResult<EntityId> {
        match read_index(&self.keys, &entity.reference())? {
            Some(id) => {
                self.store_record(id, entity)?;
                Ok(id)
            }
            None => self.create(entity),
        }
    }

    /// Replace the record at `id` with `entity`, moving its natural-key
    /// index entry. Edges are untouched.
    pub fn rekey(&mut self, id: EntityId, entity: &Entity) -> StateResult<()> {
        let Some(current) = self.entity(id)? else {
            return Err(Violation::precondition(format!("no entity with id {id}")).into());
        };
        let reference = entity.reference();
        if let Some(holder) = read_index(&self.keys, &reference)? {
            if holder != id {
                return Err(Violation::invariant(format!("{reference} is already in use")).into());
            }
        }
        self.unindex(&current.reference(), id)?;
        self.store_record(id, entity)?;
        let key = reference.index_key();
        self.keys.insert(key.as_str(), id).map_err(map_err!(Write))?;
        Ok(())
    }

    /// Add an edge. Adding an edge that already exists is a no-op.
    pub fn relate(&mut self, from: EntityId, rel: RelType, to: EntityId) -> StateResult<()> {
        let edge = Edge::new(from, rel, to);
        let key = edge.table_key();
        self.edges
            .insert(key.as_str(), NO_PROPERTIES)
            .map_err(map_err!(Write))?;
        let key = edge.reverse_key();
        self.edges_in
            .insert(key.as_str(), NO_PROPERTIES)
            .map_err(map_err!(Write))?;
        Ok(())
    }

    /// Remove one edge. Returns true if it existed.
    pub fn unrelate(&mut self, from: EntityId, rel: RelType, to: EntityId) -> StateResult<bool> {
        self.remove_edge(&Edge::new(from, rel, to))
    }

    fn remove_edge(&mut self, edge: &Edge) -> StateResult<bool> {
        let key = edge.reverse_key();
        self.edges_in.remove(key.as_str()).map_err(map_err!(Write))?;
        let key = edge.table_key();
        Ok(self
            .edges
            .remove(key.as_str())
            .map_err(map_err!(Write))?
            .is_some())
    }

    /// Remove every outgoing `rel` edge of `from`. Returns the number removed.
    pub fn detach(&mut self, from: EntityId, rel: RelType) -> StateResult<usize> {
        let doomed: Vec<Edge> = scan_outgoing(&self.edges, from)?
            .into_iter()
            .filter(|e| e.rel == rel)
            .collect();
        for edge in &doomed {
            self.remove_edge(edge)?;
        }
        Ok(doomed.len())
    }

    /// Delete an entity together with every edge touching it.
    pub fn delete(&mut self, id: EntityId) -> StateResult<bool> {
        let Some(entity) = self.entity(id)? else {
            return Ok(false);
        };
        let mut doomed = scan_outgoing(&self.edges, id)?;
        doomed.extend(scan_incoming(&self.edges_in, id)?);
        for edge in &doomed {
            self.remove_edge(edge)?;
        }
        self.unindex(&entity.reference(), id)?;
        self.entities.remove(id).map_err(map_err!(Write))?;
        Ok(true)
    }

    /// Delete every `label` entity whose natural key is not in `keep`.
    /// Returns the deleted keys, sorted.
    pub fn delete_where_key_not_in(
        &mut self,
        label: Label,
        keep: &BTreeSet<String>,
    ) -> StateResult<Vec<String>> {
        let mut removed = Vec::new();
        for (id, entity) in self.entities(label)? {
            let key = entity.natural_key();
            if !keep.contains(&key) {
                self.delete(id)?;
                removed.push(key);
            }
        }
        removed.sort();
        removed.dedup();
        if !removed.is_empty() {
            debug!(%label, count = removed.len(), "pruned entities");
        }
        Ok(removed)
    }
}

impl GraphRead for GraphTxn<'_> {
    fn entity(&self, id: EntityId) -> StateResult<Option<Entity>> {
        read_entity(&self.entities, id)
    }

    fn lookup(&self, reference: &EntityRef) -> StateResult<Option<EntityId>> {
        read_index(&self.keys, reference)
    }

    fn all_entities(&self) -> StateResult<Vec<(EntityId, Entity)>> {
        scan_entities(&self.entities)
    }

    fn outgoing(&self, from: EntityId, rel: RelType) -> StateResult<Vec<EntityId>> {
        Ok(scan_outgoing(&self.edges, from)?
            .into_iter()
            .filter(|e| e.rel == rel)
            .map(|e| e.to)
            .collect())
    }

    fn incoming(&self, to: EntityId, rel: RelType) -> StateResult<Vec<EntityId>> {
        Ok(scan_incoming(&self.edges_in, to)?
            .into_iter()
            .filter(|e| e.rel == rel)
            .map(|e| e.from)
            .collect())
    }

    fn edges(&self) -> StateResult<Vec<Edge>> {
        scan_edges(&self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topograph_core::{EnvironmentType, ExecutionEnvironment, HardwareNode, NodeType};

    fn node(hostname: &str, ip: &str) -> Entity {
        Entity::Node(HardwareNode::new(NodeType::VirtualMachine, hostname, ip, ["app"]).unwrap())
    }

    fn env(name: &str) -> Entity {
        Entity::Environment(ExecutionEnvironment::new(name, EnvironmentType::Production).unwrap())
    }

    #[test]
    fn merge_creates_then_updates_in_place() {
        let store = GraphStore::open_in_memory().unwrap();
        let (first, second) = store
            .write(|tx| -> StateResult<_> {
                let first = tx.merge(&node("app-1", "10.0.0.1"))?;
                let second = tx.merge(&node("app-1", "10.0.0.2"))?;
                Ok((first, second))
            })
            .unwrap();
        assert_eq!(first, second);

        let stored = store
            .read(|view| view.find(&EntityRef::node("app-1")))
            .unwrap()
            .unwrap();
        assert_eq!(stored.1.as_node().unwrap().ip_address, "10.0.0.2");
        assert_eq!(store.dump().unwrap().count(Label::HardwareNode), 1);
    }

    #[test]
    fn create_allows_duplicate_natural_keys() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                tx.create(&node("dup-host", "10.0.0.1"))?;
                tx.create(&node("dup-host", "10.0.0.2"))?;
                Ok(())
            })
            .unwrap();
        let nodes = store.read(|view| view.entities(Label::HardwareNode)).unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn failed_closure_rolls_back() {
        let store = GraphStore::open_in_memory().unwrap();
        let result: StateResult<()> = store.write(|tx| {
            tx.merge(&node("app-1", "10.0.0.1"))?;
            Err(Violation::invariant("boom").into())
        });
        assert!(matches!(result, Err(StateError::Contract(Violation::Invariant(_)))));
        assert_eq!(store.dump().unwrap(), GraphDump::default());
    }

    #[test]
    fn edges_are_idempotent_and_directional() {
        let store = GraphStore::open_in_memory().unwrap();
        let (e, n) = store
            .write(|tx| -> StateResult<_> {
                let e = tx.merge(&env("prod"))?;
                let n = tx.merge(&node("app-1", "10.0.0.1"))?;
                let d = tx.merge(&Entity::deployment("prod@app-1:api:1"))?;
                tx.relate(d, RelType::Targets, e)?;
                tx.relate(d, RelType::Targets, e)?;
                tx.relate(d, RelType::Targets, n)?;
                Ok((e, n))
            })
            .unwrap();

        store
            .read(|view| -> StateResult<_> {
                let d = view
                    .lookup(&EntityRef::new(Label::DeploymentInstance, "prod@app-1:api:1"))?
                    .unwrap();
                let mut targets = view.outgoing(d, RelType::Targets)?;
                targets.sort();
                assert_eq!(targets, vec![e, n]);
                assert_eq!(view.incoming(e, RelType::Targets)?, vec![d]);
                assert!(view.outgoing(e, RelType::Targets)?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn incoming_follows_every_edge_removal() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                let c = tx.merge(&Entity::cluster(topograph_core::ClusterType::Grid, "g1"))?;
                let s = tx.merge(&Entity::subnet("10.0.0.0/24", "120", "dc-a"))?;
                let a = tx.merge(&node("app-1", "10.0.0.1"))?;
                let b = tx.merge(&node("app-2", "10.0.0.2"))?;
                tx.relate(c, RelType::HasNode, a)?;
                tx.relate(c, RelType::HasNode, b)?;
                tx.relate(s, RelType::ContainsNode, a)?;
                assert_eq!(tx.incoming(a, RelType::HasNode)?, vec![c]);
                assert_eq!(tx.incoming(a, RelType::ContainsNode)?, vec![s]);

                tx.unrelate(c, RelType::HasNode, a)?;
                assert!(tx.incoming(a, RelType::HasNode)?.is_empty());

                tx.detach(s, RelType::ContainsNode)?;
                assert!(tx.incoming(a, RelType::ContainsNode)?.is_empty());

                tx.delete(c)?;
                assert!(tx.incoming(b, RelType::HasNode)?.is_empty());
                Ok(())
            })
            .unwrap();
        assert!(store.dump().unwrap().edges.is_empty());
    }

    #[test]
    fn deleting_a_target_clears_its_incoming_edges() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                let e = tx.merge(&env("prod"))?;
                let d = tx.merge(&Entity::deployment("prod@app-1:api:1"))?;
                tx.relate(d, RelType::Targets, e)?;
                tx.delete(d)?;
                assert!(tx.incoming(e, RelType::Targets)?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn detach_only_removes_named_relationship() {
        let store = GraphStore::open_in_memory().unwrap();
        let removed = store
            .write(|tx| -> StateResult<_> {
                let s = tx.merge(&Entity::subnet("10.0.0.0/24", "120", "dc-a"))?;
                let a = tx.merge(&node("app-1", "10.0.0.1"))?;
                let b = tx.merge(&node("app-2", "10.0.0.2"))?;
                tx.relate(s, RelType::ContainsNode, a)?;
                tx.relate(s, RelType::ContainsNode, b)?;
                tx.relate(a, RelType::HasNode, b)?;
                let removed = tx.detach(s, RelType::ContainsNode)?;
                assert!(tx.has_edge(a, RelType::HasNode, b)?);
                Ok(removed)
            })
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.dump().unwrap().edges.len(), 1);
    }

    #[test]
    fn delete_cascades_edges_and_index() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                let e = tx.merge(&env("prod"))?;
                let d = tx.merge(&Entity::deployment("prod@app-1:api:1"))?;
                tx.relate(d, RelType::Targets, e)?;
                assert!(tx.delete(e)?);
                assert!(!tx.delete(e)?);
                Ok(())
            })
            .unwrap();

        let dump = store.dump().unwrap();
        assert!(!dump.contains(&EntityRef::environment("prod")));
        assert!(dump.edges.is_empty());
        assert!(store
            .read(|view| view.lookup(&EntityRef::environment("prod")))
            .unwrap()
            .is_none());
    }

    #[test]
    fn rekey_moves_index_entry() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .write(|tx| -> StateResult<_> {
                let d = tx.merge(&Entity::deployment("prod@app-1:api:1"))?;
                tx.rekey(d, &Entity::deployment("dr@app-2:api:1"))?;
                Ok(())
            })
            .unwrap();
        let dump = store.dump().unwrap();
        assert!(dump.contains(&EntityRef::new(Label::DeploymentInstance, "dr@app-2:api:1")));
        assert!(!dump.contains(&EntityRef::new(Label::DeploymentInstance, "prod@app-1:api:1")));
    }

    #[test]
    fn rekey_refuses_key_held_by_another_entity() {
        let store = GraphStore::open_in_memory().unwrap();
        let result: StateResult<()> = store.write(|tx| {
            let d = tx.merge(&Entity::deployment("prod@app-1:api:1"))?;
            tx.merge(&Entity::deployment("dr@app-2:api:1"))?;
            tx.rekey(d, &Entity::deployment("dr@app-2:api:1"))
        });
        assert!(matches!(result, Err(StateError::Contract(Violation::Invariant(_)))));
    }

    #[test]
    fn prune_keeps_only_listed_keys() {
        let store = GraphStore::open_in_memory().unwrap();
        let removed = store
            .write(|tx| -> StateResult<_> {
                tx.merge(&Entity::deployment("prod@a:api:1"))?;
                tx.merge(&Entity::deployment("prod@b:api:1"))?;
                tx.merge(&env("prod"))?;
                let keep = BTreeSet::from(["prod@a:api:1".to_string()]);
                tx.delete_where_key_not_in(Label::DeploymentInstance, &keep)
            })
            .unwrap();
        assert_eq!(removed, vec!["prod@b:api:1".to_string()]);
        let dump = store.dump().unwrap();
        assert_eq!(dump.count(Label::DeploymentInstance), 1);
        assert_eq!(dump.count(Label::ExecutionEnvironment), 1);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("graph.redb");

        {
            let store = GraphStore::open(&db_path).unwrap();
            store
                .write(|tx| tx.merge(&env("prod")).map(|_| ()))
                .unwrap();
        }

        let store = GraphStore::open(&db_path).unwrap();
        assert!(store.dump().unwrap().contains(&EntityRef::environment("prod")));
        // Id sequence continues after reopen.
        let id = store.write(|tx| tx.merge(&env("dr"))).unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn empty_store_operations() {
        let store = GraphStore::open_in_memory().unwrap();
        let dump = store.dump().unwrap();
        assert!(dump.entities.is_empty());
        assert!(dump.edges.is_empty());
        store
            .read(|view| -> StateResult<_> {
                assert!(view.entity(1)?.is_none());
                assert!(view.find(&EntityRef::node("nope"))?.is_none());
                assert!(view.outgoing(1, RelType::Targets)?.is_empty());
                Ok(())
            })
            .unwrap();
    }
}
