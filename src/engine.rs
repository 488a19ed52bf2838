//! The generic transaction engine.
//!
//! [`EntityTable`] owns the store of one entity type and implements, once, the
//! phase-driven algorithm every type shares: staging usage claims, applying a
//! pending snapshot through the type's collaborator, falling back to the
//! previous snapshot, finalizing, aborting and deleting. A type only supplies
//! its [`EntityKind`].

use std::cmp::Ordering;

use log::{debug, info, warn};

use crate::config::DatastoreConfig;
use crate::data_store::entity_state::EntityState;
use crate::data_store::entity_store::{EntityRef, EntityStore};
use crate::errors::{DatastoreError, Result};
use crate::namespace;
use crate::phase::Phase;
use crate::registration::{EnableRequest, EntityKind, TypeRegistration};
use crate::replay;
use crate::snapshot::Snapshot;

/// The store and engine for one entity type.
pub struct EntityTable<K: EntityKind> {
    kind: K,
    store: EntityStore<K::Attrs>,
    retry_bound: usize,
    max_fullname_len: usize,
}

impl<K: EntityKind> EntityTable<K> {
    pub fn new(kind: K, config: &DatastoreConfig) -> Self {
        Self {
            kind,
            store: EntityStore::new(K::TYPE_NAME),
            retry_bound: config.retry_bound(),
            max_fullname_len: config.max_fullname_len(),
        }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn store(&self) -> &EntityStore<K::Attrs> {
        &self.store
    }

    // Registered operations.

    /// Runs the step of `phase` for one entity, without propagation.
    pub fn update(&self, phase: Phase, entity: &EntityRef<K::Attrs>) -> Result<()> {
        let mut st = entity.lock();
        self.update_internal(phase, &mut st, false, false)
    }

    /// Queries `enabled`, or flips it without propagation. Returns the flag
    /// after the call.
    pub fn enable(
        &self,
        phase: Phase,
        entity: &EntityRef<K::Attrs>,
        request: EnableRequest,
    ) -> Result<bool> {
        let mut st = entity.lock();
        match request {
            EnableRequest::Query => {}
            EnableRequest::Enable => self.apply_enable(phase, &mut st, true, false)?,
            EnableRequest::Disable => self.apply_enable(phase, &mut st, false, false)?,
        }
        Ok(st.enabled)
    }

    /// Replay line of the committed snapshot, or an empty string when the
    /// entity was never committed.
    pub fn serialize(&self, entity: &EntityRef<K::Attrs>) -> String {
        let st = entity.lock();
        let Some(current) = st.current() else {
            return String::new();
        };
        let mut line = String::from(K::TYPE_NAME);
        replay::push_value(&mut line, st.name());
        line.push_str(" create");
        for (option, values) in current.to_options() {
            line.push(' ');
            line.push_str(option);
            for value in &values {
                replay::push_value(&mut line, value);
            }
        }
        line.push('\n');
        line
    }

    /// Deletes an entity without propagating to its dependents.
    pub fn destroy(&self, phase: Phase, entity: &EntityRef<K::Attrs>) -> Result<()> {
        let mut st = entity.lock();
        self.destroy_internal(phase, &mut st, false)
    }

    pub fn compare(a: &EntityState<K::Attrs>, b: &EntityState<K::Attrs>) -> Ordering {
        Self::get_name(a).cmp(Self::get_name(b))
    }

    pub fn get_name(entity: &EntityState<K::Attrs>) -> &str {
        entity.name()
    }

    /// Deep-copies an entity into `target_namespace` (its own namespace when
    /// `None`) and inserts the copy.
    ///
    /// # Errors
    ///
    /// * `TooLong` if the new name exceeds the configured bound.
    /// * `AlreadyExists` if the target name is taken.
    pub fn duplicate(
        &self,
        entity: &EntityRef<K::Attrs>,
        target_namespace: Option<&str>,
    ) -> Result<EntityRef<K::Attrs>> {
        let copy = {
            let st = entity.lock();
            let (ns, bare) = namespace::split_fullname(st.name())?;
            let target = target_namespace.unwrap_or(ns);
            let new_name = namespace::create_fullname(target, bare);
            if new_name.len() > self.max_fullname_len {
                return Err(DatastoreError::TooLong(format!("name = {}", new_name)));
            }
            st.duplicate(new_name, target)?
        };
        debug!("{} {} duplicated", K::TYPE_NAME, copy.name());
        self.store.add(copy)
    }

    // Requests issued by a caller. These validate first and propagate to
    // dependents.

    /// Creates an entity with `attrs` pending and runs the step of `phase`.
    ///
    /// Creating over an entity that is being destroyed turns into a config of
    /// that entity.
    ///
    /// # Errors
    ///
    /// * `AlreadyExists` if a live entity has the name.
    /// * whatever the type's validation reports; nothing is mutated then.
    pub fn create(&self, phase: Phase, name: &str, attrs: K::Attrs) -> Result<()> {
        if let Ok(entity) = self.store.find(name) {
            let mut st = entity.lock();
            if !st.destroying {
                return Err(DatastoreError::AlreadyExists(format!("name = {}", name)));
            }
            let previous = st.working().cloned();
            self.kind.validate(name, &attrs, previous.as_ref())?;
            return self.stage_change(phase, &mut st, attrs);
        }
        self.kind.validate(name, &attrs, None)?;
        let entity = self.store.add(EntityState::new(name, attrs))?;
        debug!("{} {} created ({})", K::TYPE_NAME, name, phase);
        let mut st = entity.lock();
        self.update_internal(phase, &mut st, true, false)
    }

    /// Edits the pending snapshot of `name` with `edit` and runs the step of
    /// `phase`. A missing entity is created from the default snapshot.
    pub fn config<F>(&self, phase: Phase, name: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut K::Attrs) -> Result<()>,
    {
        let entity = match self.store.find(name) {
            Ok(entity) => entity,
            Err(DatastoreError::NotFound(_)) => {
                let mut attrs = K::Attrs::default();
                edit(&mut attrs)?;
                return self.create(phase, name, attrs);
            }
            Err(e) => return Err(e),
        };
        let mut st = entity.lock();
        let previous = st.working().cloned().ok_or_else(|| {
            DatastoreError::NotFound(format!("Not found attr. : name = {}", name))
        })?;
        let mut candidate = previous.clone();
        edit(&mut candidate)?;
        self.kind.validate(name, &candidate, Some(&previous))?;
        self.stage_change(phase, &mut st, candidate)
    }

    /// Enables or disables a live entity, propagating to its dependents.
    ///
    /// # Errors
    ///
    /// * `InvalidObject` if the entity is missing or being destroyed.
    /// * `NotOperational` when enabling an entity nobody uses.
    pub fn set_enabled(&self, phase: Phase, name: &str, enable: bool) -> Result<()> {
        let entity = self.find_live(name)?;
        let mut st = entity.lock();
        if enable && self.kind.requires_usage_to_enable() && !st.used {
            return Err(DatastoreError::NotOperational(format!(
                "name = {}. is not used.",
                name
            )));
        }
        self.apply_enable(phase, &mut st, enable, true)
    }

    /// Deletes a live entity, disabling its dependents first.
    ///
    /// # Errors
    ///
    /// * `InvalidObject` if the entity is missing or already being destroyed.
    /// * `NotOperational` if another entity uses it.
    pub fn destroy_entity(&self, phase: Phase, name: &str) -> Result<()> {
        let entity = self.find_live(name)?;
        let mut st = entity.lock();
        self.destroy_internal(phase, &mut st, true)
    }

    /// The committed snapshot of `name`.
    pub fn current(&self, name: &str) -> Result<K::Attrs> {
        let entity = self.store.find(name)?;
        let st = entity.lock();
        st.current()
            .cloned()
            .ok_or_else(|| DatastoreError::NotOperational("Not set current.".to_string()))
    }

    /// The pending snapshot of `name`.
    pub fn modified(&self, name: &str) -> Result<K::Attrs> {
        let entity = self.store.find(name)?;
        let st = entity.lock();
        st.modified()
            .cloned()
            .ok_or_else(|| DatastoreError::NotOperational("Not set modified.".to_string()))
    }

    /// A copy of the whole lifecycle record of `name`.
    pub fn state(&self, name: &str) -> Result<EntityState<K::Attrs>> {
        Ok(self.store.find(name)?.lock().clone())
    }

    /// Copies of the live entities of `namespace` (all when `None`).
    pub fn list(&self, namespace: Option<&str>) -> Result<Vec<EntityState<K::Attrs>>> {
        Ok(self
            .store
            .list(namespace)?
            .iter()
            .map(|entity| entity.lock().clone())
            .collect())
    }

    /// Present and not being destroyed.
    pub fn exists(&self, name: &str) -> bool {
        self.store
            .find(name)
            .is_ok_and(|entity| !entity.lock().destroying)
    }

    pub fn is_used(&self, name: &str) -> Result<bool> {
        Ok(self.store.find(name)?.lock().used)
    }

    /// Sets the usage claim on `name`.
    pub fn set_used(&self, name: &str, used: bool) -> Result<()> {
        let entity = self.store.find(name)?;
        entity.lock().used = used;
        debug!("{} {} used = {}", K::TYPE_NAME, name, used);
        Ok(())
    }

    /// Usage claim from a referencing entity. A reference to an entity that
    /// no longer exists is ignored.
    pub fn claim(&self, name: &str, used: bool) -> Result<()> {
        match self.set_used(name, used) {
            Err(DatastoreError::NotFound(_)) => {
                debug!("{} {} not found, claim skipped", K::TYPE_NAME, name);
                Ok(())
            }
            other => other,
        }
    }

    /// Runs the step of `phase` for `name` on behalf of a referencing entity.
    /// A missing entity is skipped.
    pub fn update_propagation(&self, phase: Phase, name: &str) -> Result<()> {
        match self.store.find(name) {
            Ok(entity) => {
                let mut st = entity.lock();
                self.update_internal(phase, &mut st, true, false)
            }
            Err(DatastoreError::NotFound(_)) => {
                debug!("{} {} not found, propagation skipped", K::TYPE_NAME, name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Enables or disables `name` on behalf of a referencing entity, which
    /// holds the usage claim. A missing entity is skipped.
    pub fn enable_propagation(&self, phase: Phase, name: &str, enable: bool) -> Result<()> {
        match self.store.find(name) {
            Ok(entity) => {
                let mut st = entity.lock();
                if st.enabled == enable || st.destroying {
                    return Ok(());
                }
                self.apply_enable(phase, &mut st, enable, true)
            }
            Err(DatastoreError::NotFound(_)) => {
                debug!("{} {} not found, propagation skipped", K::TYPE_NAME, name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Every entity, including those being destroyed, ordered with
    /// [`compare`](Self::compare).
    pub fn sorted(&self) -> Result<Vec<EntityRef<K::Attrs>>> {
        let mut keyed: Vec<(EntityState<K::Attrs>, EntityRef<K::Attrs>)> = self
            .store
            .entries()?
            .into_iter()
            .map(|entity| {
                let st = entity.lock().clone();
                (st, entity)
            })
            .collect();
        keyed.sort_by(|(a, _), (b, _)| Self::compare(a, b));
        Ok(keyed.into_iter().map(|(_, entity)| entity).collect())
    }

    fn find_live(&self, name: &str) -> Result<EntityRef<K::Attrs>> {
        let entity = self
            .store
            .find(name)
            .map_err(|_| DatastoreError::InvalidObject(format!("name = {}", name)))?;
        if entity.lock().destroying {
            return Err(DatastoreError::InvalidObject(format!("name = {}", name)));
        }
        Ok(entity)
    }

    // Engine internals.

    fn stage_change(
        &self,
        phase: Phase,
        st: &mut EntityState<K::Attrs>,
        attrs: K::Attrs,
    ) -> Result<()> {
        if st.is_modified() {
            // Claims of the replaced pending snapshot go away, the committed
            // snapshot keeps its own.
            self.claim_quietly(st.name(), st.modified(), false);
            self.claim_quietly(st.name(), st.current(), true);
        }
        st.stage(attrs);
        st.destroying = false;
        self.update_internal(phase, st, true, false)
    }

    fn apply_enable(
        &self,
        phase: Phase,
        st: &mut EntityState<K::Attrs>,
        enable: bool,
        propagate: bool,
    ) -> Result<()> {
        if phase.is_staging() {
            st.stage_enable(enable);
            return Ok(());
        }
        if st.enabled == enable {
            debug!(
                "{} {} already {}",
                K::TYPE_NAME,
                st.name(),
                if enable { "enabled" } else { "disabled" }
            );
            return Ok(());
        }
        let previous = st.enabled;
        st.enabled = enable;
        if let Err(e) = self.update_internal(phase, st, propagate, true) {
            st.enabled = previous;
            return Err(e);
        }
        if !enable && propagate {
            if let Some(attrs) = st.working() {
                self.kind.disable_dependents(phase, attrs)?;
            }
        }
        Ok(())
    }

    fn destroy_internal(
        &self,
        phase: Phase,
        st: &mut EntityState<K::Attrs>,
        propagate: bool,
    ) -> Result<()> {
        if st.used {
            return Err(DatastoreError::NotOperational(format!(
                "name = {}: is used.",
                st.name()
            )));
        }
        if phase.is_staging() {
            st.stage_destroy();
            debug!("{} {} staged for destroy", K::TYPE_NAME, st.name());
            return Ok(());
        }
        if propagate {
            if let Some(attrs) = st.working() {
                if let Err(e) = self.kind.disable_dependents(phase, attrs) {
                    warn!("{} {}: disabling dependents failed: {}", K::TYPE_NAME, st.name(), e);
                }
            }
        }
        if st.enabled {
            st.enabled = false;
            if let Err(e) = self.update_internal(phase, st, propagate, true) {
                st.enabled = true;
                return Err(e);
            }
        }
        st.destroying = true;
        self.do_destroy(phase, st);
        Ok(())
    }

    fn update_internal(
        &self,
        phase: Phase,
        st: &mut EntityState<K::Attrs>,
        propagate: bool,
        enable_cmd: bool,
    ) -> Result<()> {
        debug!("{} {} update ({})", K::TYPE_NAME, st.name(), phase);
        match phase {
            Phase::AutoCommit => self.auto_commit(st, propagate, enable_cmd),
            Phase::Atomic => {
                self.claim_quietly(st.name(), st.modified(), true);
                Ok(())
            }
            Phase::Committing => {
                st.apply_staged();
                self.do_update(phase, st, propagate, enable_cmd)
            }
            Phase::Committed | Phase::RollBacked => {
                // A creation that was rolled back is never promoted.
                if !(phase == Phase::RollBacked && st.is_pure_creation()) {
                    st.promote();
                }
                self.do_destroy(phase, st);
                st.clear_staged();
                Ok(())
            }
            Phase::RollBacking => {
                if st.is_pure_creation() {
                    self.claim_quietly(st.name(), st.modified(), false);
                    return Ok(());
                }
                st.destroying = false;
                st.revert();
                st.reverse_staged();
                let result = self.do_update(phase, st, propagate, enable_cmd);
                if result.is_err() {
                    // `modified` is promoted back to `current` on RollBacked.
                    self.claim_quietly(st.name(), st.modified(), true);
                }
                result
            }
            Phase::Aborting => {
                st.destroying = false;
                st.clear_staged();
                self.claim_quietly(st.name(), st.modified(), false);
                self.claim_quietly(st.name(), st.current(), true);
                Ok(())
            }
            Phase::Aborted => {
                if st.is_pure_creation() {
                    self.delete_quietly(st.name());
                } else {
                    st.discard_modified();
                }
                Ok(())
            }
            Phase::DryRun => {
                st.promote();
                Ok(())
            }
        }
    }

    /// Bounded convergence: apply the pending snapshot, and on failure fall
    /// back to the previous committed one. The first failure is what the
    /// caller sees, even when the fallback converged.
    fn auto_commit(
        &self,
        st: &mut EntityState<K::Attrs>,
        propagate: bool,
        enable_cmd: bool,
    ) -> Result<()> {
        let mut first_error = None;
        let mut reverts = 0;
        let mut converged = false;
        for attempt in 0..self.retry_bound {
            match self.do_update(Phase::AutoCommit, st, propagate, enable_cmd) {
                Ok(()) => {
                    converged = true;
                    break;
                }
                Err(e) => {
                    let pure_creation = st.is_pure_creation();
                    let error = first_error.get_or_insert(e);
                    if enable_cmd {
                        break;
                    }
                    if pure_creation {
                        self.do_destroy(Phase::AutoCommit, st);
                        break;
                    }
                    st.revert();
                    reverts += 1;
                    warn!(
                        "auto commit of {} {} failed ({}): rollbacking, attempt {}",
                        K::TYPE_NAME,
                        st.name(),
                        error,
                        attempt + 1
                    );
                }
            }
        }
        let Some(error) = first_error else {
            return Ok(());
        };
        if !converged && reverts > 0 {
            // Retries exhausted: keep the committed snapshot and its claims,
            // drop the change that could not be applied.
            if reverts % 2 == 1 {
                st.revert();
            }
            self.claim_quietly(st.name(), st.modified(), false);
            st.discard_modified();
            self.claim_quietly(st.name(), st.current(), true);
        }
        Err(error)
    }

    fn do_update(
        &self,
        phase: Phase,
        st: &mut EntityState<K::Attrs>,
        propagate: bool,
        enable_cmd: bool,
    ) -> Result<()> {
        let name = st.name().to_string();
        let is_modified = st.is_modified();

        if propagate {
            if let Some(attrs) = st.working() {
                self.kind.update_dependents(phase, attrs)?;
            }
        }

        if is_modified {
            let collaborator = self.kind.collaborator();
            if let Some(current) = st.current() {
                self.kind.set_dependents_used(current, false)?;
                if propagate {
                    self.kind.disable_dependents(phase, current)?;
                }
                info!("{} {}: destroy", K::TYPE_NAME, name);
                if let Err(e) = collaborator.destroy(&name, current) {
                    warn!("{} {}: can't destroy: {}", K::TYPE_NAME, name, e);
                    return Err(e.with_name(&name));
                }
            }
            if let Some(modified) = st.modified() {
                info!("{} {}: create", K::TYPE_NAME, name);
                collaborator
                    .create(&name, modified)
                    .map_err(|e| e.with_name(&name))?;
                self.kind.set_dependents_used(modified, true)?;
                if st.enabled {
                    self.start(phase, &name, modified, propagate)?;
                }
            }
            if !matches!(phase, Phase::Committing | Phase::RollBacking) {
                st.promote();
            }
        } else {
            if enable_cmd || st.is_enabling() || st.is_disabling() {
                if let Some(current) = st.current() {
                    if st.enabled {
                        self.start(phase, &name, current, propagate)?;
                    } else {
                        info!("{} {}: stop", K::TYPE_NAME, name);
                        self.kind
                            .collaborator()
                            .stop(&name, current)
                            .map_err(|e| e.with_name(&name))?;
                    }
                }
            }
            if !matches!(phase, Phase::Committing | Phase::RollBacking) {
                st.clear_staged();
            }
        }
        Ok(())
    }

    fn start(&self, phase: Phase, name: &str, attrs: &K::Attrs, propagate: bool) -> Result<()> {
        if propagate {
            self.kind.enable_dependents(phase, attrs)?;
        }
        info!("{} {}: start", K::TYPE_NAME, name);
        self.kind
            .collaborator()
            .start(name, attrs)
            .map_err(|e| e.with_name(name))
    }

    /// Delete-finalization. Failures here are logged, never surfaced.
    fn do_destroy(&self, phase: Phase, st: &mut EntityState<K::Attrs>) {
        if phase == Phase::RollBacked && st.is_pure_creation() {
            self.delete_quietly(st.name());
        } else if phase == Phase::DryRun {
            self.claim_quietly(st.name(), st.current(), false);
            self.claim_quietly(st.name(), st.modified(), false);
            self.delete_quietly(st.name());
        } else if st.destroying || phase == Phase::AutoCommit {
            self.claim_quietly(st.name(), st.current(), false);
            self.claim_quietly(st.name(), st.modified(), false);
            if let Some(current) = st.current() {
                info!("{} {}: destroy", K::TYPE_NAME, st.name());
                if let Err(e) = self.kind.collaborator().destroy(st.name(), current) {
                    warn!("{} {}: destroy failed: {}", K::TYPE_NAME, st.name(), e);
                }
            }
            self.delete_quietly(st.name());
        }
    }

    fn claim_quietly(&self, name: &str, attrs: Option<&K::Attrs>, used: bool) {
        if let Some(attrs) = attrs {
            if let Err(e) = self.kind.set_dependents_used(attrs, used) {
                warn!("{} {}: usage claim ignored: {}", K::TYPE_NAME, name, e);
            }
        }
    }

    fn delete_quietly(&self, name: &str) {
        if let Err(e) = self.store.delete(name) {
            warn!("{} {}: delete failed: {}", K::TYPE_NAME, name, e);
        }
    }
}

impl<K: EntityKind> TypeRegistration for EntityTable<K> {
    fn type_name(&self) -> &'static str {
        K::TYPE_NAME
    }

    fn update(&self, phase: Phase, name: &str) -> Result<()> {
        let entity = self.store.find(name)?;
        EntityTable::update(self, phase, &entity)
    }

    fn enable(&self, phase: Phase, name: &str, request: EnableRequest) -> Result<bool> {
        let entity = self.store.find(name)?;
        EntityTable::enable(self, phase, &entity, request)
    }

    fn serialize(&self, name: &str) -> Result<String> {
        let entity = self.store.find(name)?;
        Ok(EntityTable::serialize(self, &entity))
    }

    fn destroy(&self, phase: Phase, name: &str) -> Result<()> {
        let entity = self.store.find(name)?;
        EntityTable::destroy(self, phase, &entity)
    }

    fn duplicate(&self, name: &str, target_namespace: Option<&str>) -> Result<String> {
        let entity = self.store.find(name)?;
        let copy = EntityTable::duplicate(self, &entity, target_namespace)?;
        let new_name = copy.lock().name().to_string();
        Ok(new_name)
    }

    fn sorted_names(&self) -> Result<Vec<String>> {
        Ok(self
            .sorted()?
            .iter()
            .map(|entity| entity.lock().name().to_string())
            .collect())
    }

    fn live_names(&self, namespace: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .store
            .list(namespace)?
            .iter()
            .map(|entity| entity.lock().name().to_string())
            .collect())
    }

    fn replay(&self, phase: Phase, name: &str, verb: &str, args: Vec<String>) -> Result<()> {
        match verb {
            "create" => {
                let mut attrs = K::Attrs::default();
                let mut args = args.into_iter();
                while let Some(option) = args.next() {
                    attrs.set_option(&option, &mut args)?;
                }
                self.create(phase, name, attrs)
            }
            "enable" | "disable" => {
                let enable = verb == "enable";
                if self.store.find(name)?.lock().enabled == enable {
                    return Ok(());
                }
                self.set_enabled(phase, name, enable)
            }
            other => Err(DatastoreError::InvalidArgs(format!(
                "{} {}: unknown verb = {}",
                K::TYPE_NAME,
                name,
                other
            ))),
        }
    }

    fn shutdown(&self) {
        self.store.shutdown();
    }
}
