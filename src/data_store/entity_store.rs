use std::sync::Arc;

use ahash::AHashMap as HashMap;
use log::debug;
use parking_lot::Mutex;

use crate::data_store::entity_state::EntityState;
use crate::errors::{DatastoreError, Result};
use crate::namespace::in_namespace;
use crate::snapshot::Snapshot;

/// Shared handle to one entity. The store and the engine both hold it; the
/// entity's own mutex guards its lifecycle flags and snapshots.
pub type EntityRef<A> = Arc<Mutex<EntityState<A>>>;

struct Entries<A> {
    order: Vec<String>,
    map: HashMap<String, EntityRef<A>>,
}

impl<A> Entries<A> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            map: HashMap::new(),
        }
    }

    fn ordered(&self) -> Vec<EntityRef<A>> {
        self.order
            .iter()
            .filter_map(|name| self.map.get(name).cloned())
            .collect()
    }
}

/// A name-keyed map of the entities of one type.
///
/// Map mutations are serialized by one mutex, so concurrent `find`/`list`
/// calls never observe a half-inserted or half-removed entity. Iteration
/// follows insertion order.
pub struct EntityStore<A> {
    type_name: &'static str,
    // `None` once the store has been shut down.
    entries: Mutex<Option<Entries<A>>>,
}

impl<A: Snapshot> EntityStore<A> {
    /// Creates a started, empty store.
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            entries: Mutex::new(Some(Entries::new())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Inserts a new entity under its own name.
    ///
    /// # Errors
    ///
    /// * `InvalidArgs` if the entity has an empty name.
    /// * `AlreadyExists` if the name is taken.
    /// * `NotStarted` if the store has been shut down.
    pub fn add(&self, state: EntityState<A>) -> Result<EntityRef<A>> {
        if state.name().is_empty() {
            return Err(DatastoreError::InvalidArgs(format!(
                "{}: empty name",
                self.type_name
            )));
        }
        let mut guard = self.entries.lock();
        let entries = guard.as_mut().ok_or(DatastoreError::NotStarted)?;
        let name = state.name().to_string();
        if entries.map.contains_key(&name) {
            return Err(DatastoreError::AlreadyExists(format!("name = {}", name)));
        }
        let entity = Arc::new(Mutex::new(state));
        entries.map.insert(name.clone(), Arc::clone(&entity));
        entries.order.push(name);
        Ok(entity)
    }

    /// Removes the entity named `name` and returns it.
    pub fn delete(&self, name: &str) -> Result<EntityRef<A>> {
        let mut guard = self.entries.lock();
        let entries = guard.as_mut().ok_or(DatastoreError::NotStarted)?;
        let entity = entries
            .map
            .remove(name)
            .ok_or_else(|| DatastoreError::NotFound(format!("name = {}", name)))?;
        entries.order.retain(|n| n != name);
        debug!("{} {} removed from store", self.type_name, name);
        Ok(entity)
    }

    pub fn find(&self, name: &str) -> Result<EntityRef<A>> {
        let guard = self.entries.lock();
        let entries = guard.as_ref().ok_or(DatastoreError::NotStarted)?;
        entries
            .map
            .get(name)
            .cloned()
            .ok_or_else(|| DatastoreError::NotFound(format!("name = {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .lock()
            .as_ref()
            .is_some_and(|entries| entries.map.contains_key(name))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .as_ref()
            .map_or(0, |entries| entries.map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entity, including those being destroyed, in insertion order.
    pub fn entries(&self) -> Result<Vec<EntityRef<A>>> {
        let guard = self.entries.lock();
        let entries = guard.as_ref().ok_or(DatastoreError::NotStarted)?;
        Ok(entries.ordered())
    }

    /// Lists live entities in insertion order.
    ///
    /// * `None` - every entity.
    /// * `Some("")` - the default namespace only.
    /// * `Some(ns)` - entities whose name starts with `ns:`.
    ///
    /// Entities flagged `destroying` are skipped.
    pub fn list(&self, namespace: Option<&str>) -> Result<Vec<EntityRef<A>>> {
        let candidates = {
            let guard = self.entries.lock();
            let entries = guard.as_ref().ok_or(DatastoreError::NotStarted)?;
            match namespace {
                None => entries.ordered(),
                Some(ns) => entries
                    .order
                    .iter()
                    .filter(|name| in_namespace(name, ns))
                    .filter_map(|name| entries.map.get(name).cloned())
                    .collect(),
            }
        };
        // Entity locks are taken only after the store lock is released.
        Ok(candidates
            .into_iter()
            .filter(|entity| !entity.lock().destroying)
            .collect())
    }

    /// Drops every entity and stops the store. Later calls fail with
    /// `NotStarted`.
    pub fn shutdown(&self) {
        if let Some(entries) = self.entries.lock().take() {
            for name in &entries.order {
                debug!("{} {} released", self.type_name, name);
            }
        }
    }

    /// Replaces the store lock with a fresh one, keeping every entry.
    ///
    /// Meant for the child side of a process fork, where the inherited map is
    /// consistent but the lock may still look held by a thread that does not
    /// exist in the child.
    pub fn reset_after_fork(&mut self) {
        let entries = self.entries.get_mut().take();
        self.entries = Mutex::new(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::snapshot::OptionArgs;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Attrs(u32);

    impl Snapshot for Attrs {
        fn with_namespace(&self, _namespace: &str) -> Result<Self> {
            Ok(self.clone())
        }

        fn to_options(&self) -> Vec<(&'static str, Vec<String>)> {
            Vec::new()
        }

        fn set_option(&mut self, _option: &str, _args: OptionArgs<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn names(list: &[EntityRef<Attrs>]) -> Vec<String> {
        list.iter().map(|e| e.lock().name().to_string()).collect()
    }

    #[test]
    fn test_add_find_delete() {
        let store = EntityStore::new("test");
        store.add(EntityState::new(":a", Attrs(1))).unwrap();
        let err = store.add(EntityState::new(":a", Attrs(2))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.find(":a").unwrap().lock().modified(), Some(&Attrs(1)));
        store.delete(":a").unwrap();
        assert_eq!(store.find(":a").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.delete(":a").unwrap_err().kind(), ErrorKind::NotFound);
        let err = store.add(EntityState::new("", Attrs(1))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);
    }

    #[test]
    fn test_list_filters() {
        let store = EntityStore::new("test");
        for name in ["ns1:b", ":a", "ns10:c", "ns1:d", ":e"] {
            store.add(EntityState::new(name, Attrs(0))).unwrap();
        }
        store.find(":e").unwrap().lock().destroying = true;

        assert_eq!(
            names(&store.list(None).unwrap()),
            vec!["ns1:b", ":a", "ns10:c", "ns1:d"]
        );
        assert_eq!(names(&store.list(Some("")).unwrap()), vec![":a"]);
        assert_eq!(names(&store.list(Some("ns1")).unwrap()), vec!["ns1:b", "ns1:d"]);
        assert_eq!(store.entries().unwrap().len(), 5);
    }

    #[test]
    fn test_shutdown_and_fork_reset() {
        let mut store = EntityStore::new("test");
        store.add(EntityState::new(":a", Attrs(1))).unwrap();
        store.reset_after_fork();
        assert!(store.contains(":a"));

        store.shutdown();
        assert_eq!(store.find(":a").unwrap_err().kind(), ErrorKind::NotStarted);
        let err = store.add(EntityState::new(":b", Attrs(1))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotStarted);
        assert!(store.is_empty());
    }
}
