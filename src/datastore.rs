use std::sync::Arc;

use ahash::AHashSet as HashSet;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::collaborator::{Collaborator, NoopCollaborator};
use crate::config::DatastoreConfig;
use crate::data_store::entity_state::EntityState;
use crate::engine::EntityTable;
use crate::errors::{DatastoreError, Result};
use crate::namespace::{self, NamespaceResolver, DEFAULT_NAMESPACE};
use crate::phase::Phase;
use crate::registration::{EnableRequest, EntityKind, TypeRegistration};
use crate::replay;
use crate::types::bridge::{BridgeAttrs, BridgeKind};
use crate::types::channel::{ChannelAttrs, ChannelKind};
use crate::types::controller::{ControllerAttrs, ControllerKind};
use crate::types::interface::{InterfaceAttrs, InterfaceKind};
use crate::types::port::{PortAttrs, PortKind};

/// Switchyard Prelude
pub mod prelude {
    pub use crate::collaborator::*;
    pub use crate::config::*;
    pub use crate::data_store::entity_state::*;
    pub use crate::data_store::entity_store::*;
    pub use crate::datastore::{Collaborators, Datastore};
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::phase::*;
    pub use crate::registration::*;
    pub use crate::snapshot::*;
}

/// The external collaborators of every entity type.
pub struct Collaborators {
    pub interface: Arc<dyn Collaborator<InterfaceAttrs>>,
    pub port: Arc<dyn Collaborator<PortAttrs>>,
    pub channel: Arc<dyn Collaborator<ChannelAttrs>>,
    pub controller: Arc<dyn Collaborator<ControllerAttrs>>,
    pub bridge: Arc<dyn Collaborator<BridgeAttrs>>,
}

impl Default for Collaborators {
    /// Collaborators that accept everything and only log.
    fn default() -> Self {
        Self {
            interface: Arc::new(NoopCollaborator),
            port: Arc::new(NoopCollaborator),
            channel: Arc::new(NoopCollaborator),
            controller: Arc::new(NoopCollaborator),
            bridge: Arc::new(NoopCollaborator),
        }
    }
}

/// The configuration datastore and its transaction driver.
///
/// Holds one [`EntityTable`] per entity type, wired to each other explicitly
/// (a bridge table holds the controller and port tables, and so on), plus the
/// namespace resolver and the driver state. The driver state mutex is the
/// coarse lock of a multi-entity transaction: every request and every phase
/// pass runs under it, while read-only queries go straight to the tables.
pub struct Datastore {
    config: DatastoreConfig,
    resolver: NamespaceResolver,
    /// `AutoCommit`, `Atomic` or `DryRun` between calls.
    state: Mutex<Phase>,
    interfaces: Arc<EntityTable<InterfaceKind>>,
    ports: Arc<EntityTable<PortKind>>,
    channels: Arc<EntityTable<ChannelKind>>,
    controllers: Arc<EntityTable<ControllerKind>>,
    bridges: Arc<EntityTable<BridgeKind>>,
    /// Registered types in dependency order.
    registry: Vec<Arc<dyn TypeRegistration>>,
}

impl Datastore {
    /// Creates a datastore in `AutoCommit` with empty stores.
    pub fn new(config: DatastoreConfig, collaborators: Collaborators) -> Self {
        let interfaces = Arc::new(EntityTable::new(
            InterfaceKind::new(collaborators.interface),
            &config,
        ));
        let ports = Arc::new(EntityTable::new(
            PortKind::new(collaborators.port, Arc::clone(&interfaces)),
            &config,
        ));
        let channels = Arc::new(EntityTable::new(
            ChannelKind::new(collaborators.channel),
            &config,
        ));
        let controllers = Arc::new(EntityTable::new(
            ControllerKind::new(collaborators.controller, Arc::clone(&channels)),
            &config,
        ));
        let bridges = Arc::new(EntityTable::new(
            BridgeKind::new(
                collaborators.bridge,
                Arc::clone(&controllers),
                Arc::clone(&ports),
            ),
            &config,
        ));
        let registry: Vec<Arc<dyn TypeRegistration>> = vec![
            Arc::clone(&interfaces) as Arc<dyn TypeRegistration>,
            Arc::clone(&ports) as Arc<dyn TypeRegistration>,
            Arc::clone(&channels) as Arc<dyn TypeRegistration>,
            Arc::clone(&controllers) as Arc<dyn TypeRegistration>,
            Arc::clone(&bridges) as Arc<dyn TypeRegistration>,
        ];
        Self {
            resolver: NamespaceResolver::new(&config),
            config,
            state: Mutex::new(Phase::AutoCommit),
            interfaces,
            ports,
            channels,
            controllers,
            bridges,
            registry,
        }
    }

    pub fn settings(&self) -> &DatastoreConfig {
        &self.config
    }

    pub fn resolver(&self) -> &NamespaceResolver {
        &self.resolver
    }

    /// The driver state requests are currently issued in.
    pub fn phase(&self) -> Phase {
        *self.state.lock()
    }

    pub fn interfaces(&self) -> &EntityTable<InterfaceKind> {
        &self.interfaces
    }

    pub fn ports(&self) -> &EntityTable<PortKind> {
        &self.ports
    }

    pub fn channels(&self) -> &EntityTable<ChannelKind> {
        &self.channels
    }

    pub fn controllers(&self) -> &EntityTable<ControllerKind> {
        &self.controllers
    }

    pub fn bridges(&self) -> &EntityTable<BridgeKind> {
        &self.bridges
    }

    /// Looks up a registered type.
    pub fn registration(&self, type_name: &str) -> Result<&dyn TypeRegistration> {
        self.registry
            .iter()
            .find(|reg| reg.type_name() == type_name)
            .map(|reg| reg.as_ref())
            .ok_or_else(|| DatastoreError::NotFound(format!("type = {}", type_name)))
    }

    /// Resolves `name` against the current namespace.
    pub fn fullname(&self, name: &str) -> Result<String> {
        self.resolver.get_fullname(name)
    }

    // Entity requests.

    /// Creates an entity in the current driver state and returns its
    /// fully-qualified name.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the namespace does not exist (outside a dry run).
    /// * `AlreadyExists` if the name is taken.
    /// * validation errors of the entity type, with nothing mutated.
    /// * collaborator errors when applied immediately.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use switchyard::prelude::*;
    /// use switchyard::types::channel::ChannelAttrs;
    ///
    /// let ds = Datastore::new(DatastoreConfig::default(), Collaborators::default());
    /// let name = ds.create(ds.channels(), "ch1", ChannelAttrs::default()).unwrap();
    /// assert_eq!(name, ":ch1");
    /// ```
    pub fn create<K: EntityKind>(
        &self,
        table: &EntityTable<K>,
        name: &str,
        attrs: K::Attrs,
    ) -> Result<String> {
        let phase = self.state.lock();
        let fullname = self.target_for_create(*phase, name)?;
        table.create(*phase, &fullname, attrs)?;
        Ok(fullname)
    }

    /// Edits the pending snapshot of an entity, creating it when missing.
    pub fn config<K, F>(&self, table: &EntityTable<K>, name: &str, edit: F) -> Result<()>
    where
        K: EntityKind,
        F: FnOnce(&mut K::Attrs) -> Result<()>,
    {
        let phase = self.state.lock();
        let fullname = self.resolver.get_fullname(name)?;
        if !table.store().contains(&fullname) {
            self.target_for_create(*phase, name)?;
        }
        table.config(*phase, &fullname, edit)
    }

    pub fn destroy<K: EntityKind>(&self, table: &EntityTable<K>, name: &str) -> Result<()> {
        let phase = self.state.lock();
        let fullname = self.resolver.get_fullname(name)?;
        table.destroy_entity(*phase, &fullname)
    }

    pub fn set_enabled<K: EntityKind>(
        &self,
        table: &EntityTable<K>,
        name: &str,
        enable: bool,
    ) -> Result<()> {
        let phase = self.state.lock();
        let fullname = self.resolver.get_fullname(name)?;
        table.set_enabled(*phase, &fullname, enable)
    }

    /// The committed snapshot, or `NotOperational("Not set current.")`.
    pub fn current<K: EntityKind>(&self, table: &EntityTable<K>, name: &str) -> Result<K::Attrs> {
        table.current(&self.resolver.get_fullname(name)?)
    }

    /// The pending snapshot, or `NotOperational("Not set modified.")`.
    pub fn modified<K: EntityKind>(&self, table: &EntityTable<K>, name: &str) -> Result<K::Attrs> {
        table.modified(&self.resolver.get_fullname(name)?)
    }

    /// Lists live entities. `None` lists everything; otherwise the target is
    /// resolved like a name (`ns:` and `:` list a namespace).
    pub fn list<K: EntityKind>(
        &self,
        table: &EntityTable<K>,
        target: Option<&str>,
    ) -> Result<Vec<EntityState<K::Attrs>>> {
        let Some(target) = target else {
            return table.list(None);
        };
        match self.resolver.search_target(Some(target))? {
            namespace::SearchTarget::Namespace(ns) => table.list(Some(&ns)),
            namespace::SearchTarget::Entity(fullname) => {
                let st = table.state(&fullname)?;
                if st.is_destroying() {
                    return Err(DatastoreError::NotFound(format!("name = {}", fullname)));
                }
                Ok(vec![st])
            }
        }
    }

    // Registered operations, addressed by type name.

    pub fn update(&self, type_name: &str, phase: Phase, name: &str) -> Result<()> {
        let _guard = self.state.lock();
        let fullname = self.resolver.get_fullname(name)?;
        self.registration(type_name)?.update(phase, &fullname)
    }

    pub fn enable(
        &self,
        type_name: &str,
        phase: Phase,
        name: &str,
        request: EnableRequest,
    ) -> Result<bool> {
        let _guard = self.state.lock();
        let fullname = self.resolver.get_fullname(name)?;
        self.registration(type_name)?.enable(phase, &fullname, request)
    }

    pub fn serialize(&self, type_name: &str, name: &str) -> Result<String> {
        let fullname = self.resolver.get_fullname(name)?;
        self.registration(type_name)?.serialize(&fullname)
    }

    /// Duplicates one entity into `target_namespace` (its own when `None`).
    pub fn duplicate(
        &self,
        type_name: &str,
        name: &str,
        target_namespace: Option<&str>,
    ) -> Result<String> {
        let phase = self.state.lock();
        if let Some(ns) = target_namespace {
            self.check_namespace(*phase, ns)?;
        }
        let fullname = self.resolver.get_fullname(name)?;
        self.registration(type_name)?
            .duplicate(&fullname, target_namespace)
    }

    // Driver-level transactions.

    /// `AutoCommit -> Atomic`.
    pub fn atomic_begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        transition(&mut state, Phase::AutoCommit, Phase::Atomic)?;
        info!("atomic: begin");
        Ok(())
    }

    /// Applies every staged change.
    ///
    /// Runs `Committing` over all entities (types in dependency order,
    /// entities by name), then `Committed`. On the first failure the entities
    /// that already ran `Committing` are rolled back in reverse order, the
    /// others are aborted, and the failure is returned. The driver is back in
    /// `AutoCommit` either way.
    pub fn atomic_commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        transition(&mut state, Phase::Atomic, Phase::Committing)?;
        let result = self.commit_all();
        *state = Phase::AutoCommit;
        result
    }

    /// Drops every staged change.
    pub fn atomic_abort(&self) -> Result<()> {
        let mut state = self.state.lock();
        transition(&mut state, Phase::Atomic, Phase::Aborting)?;
        let result = self
            .run_phase(Phase::Aborting)
            .and_then(|_| self.run_phase(Phase::Aborted));
        *state = Phase::AutoCommit;
        info!("atomic: aborted");
        result
    }

    /// `AutoCommit -> DryRun`.
    pub fn dryrun_begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        transition(&mut state, Phase::AutoCommit, Phase::DryRun)?;
        info!("dryrun: begin");
        Ok(())
    }

    /// `DryRun -> AutoCommit`.
    pub fn dryrun_end(&self) -> Result<()> {
        let mut state = self.state.lock();
        transition(&mut state, Phase::DryRun, Phase::AutoCommit)?;
        info!("dryrun: end");
        Ok(())
    }

    fn commit_all(&self) -> Result<()> {
        let mut touched: Vec<(&dyn TypeRegistration, String)> = Vec::new();
        let mut failure = None;
        'types: for reg in &self.registry {
            for name in reg.sorted_names()? {
                touched.push((reg.as_ref(), name.clone()));
                if let Err(e) = reg.update(Phase::Committing, &name) {
                    warn!("commit failed at {} {}: {}", reg.type_name(), name, e);
                    failure = Some(e);
                    break 'types;
                }
            }
        }

        let Some(error) = failure else {
            self.run_phase(Phase::Committed)?;
            info!("atomic: committed");
            return Ok(());
        };

        for phase in [Phase::RollBacking, Phase::RollBacked] {
            for (reg, name) in touched.iter().rev() {
                step(*reg, phase, name);
            }
        }
        let touched: HashSet<(&str, &str)> = touched
            .iter()
            .map(|(reg, name)| (reg.type_name(), name.as_str()))
            .collect();
        for phase in [Phase::Aborting, Phase::Aborted] {
            for reg in &self.registry {
                for name in reg.sorted_names()? {
                    if !touched.contains(&(reg.type_name(), name.as_str())) {
                        step(reg.as_ref(), phase, &name);
                    }
                }
            }
        }
        info!("atomic: rolled back");
        Err(error)
    }

    fn run_phase(&self, phase: Phase) -> Result<()> {
        debug!("driver: {} pass", phase);
        for reg in &self.registry {
            for name in reg.sorted_names()? {
                step(reg.as_ref(), phase, &name);
            }
        }
        Ok(())
    }

    // Namespaces.

    pub fn add_namespace(&self, ns: &str) -> Result<()> {
        self.resolver.add(ns)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.resolver.namespaces()
    }

    pub fn set_current_namespace(&self, ns: &str) -> Result<()> {
        self.resolver.set_current(ns)
    }

    pub fn unset_current_namespace(&self) {
        self.resolver.unset_current()
    }

    /// Destroys every entity of `ns` (referencing types first) and
    /// unregisters the namespace. Only allowed outside a transaction.
    pub fn delete_namespace(&self, ns: &str) -> Result<()> {
        let phase = self.state.lock();
        if !matches!(*phase, Phase::AutoCommit | Phase::DryRun) {
            return Err(DatastoreError::NotOperational(format!(
                "namespace = {}: transaction in progress.",
                ns
            )));
        }
        self.check_namespace(*phase, ns)?;
        for reg in self.registry.iter().rev() {
            for name in reg.live_names(Some(ns))? {
                reg.destroy(*phase, &name)?;
            }
        }
        if ns != DEFAULT_NAMESPACE && self.resolver.exists(ns) {
            self.resolver.remove(ns)?;
        }
        info!("namespace deleted: {}", ns);
        Ok(())
    }

    /// Copies every live entity of `src` into `dst` and returns the new names.
    pub fn duplicate_namespace(&self, src: &str, dst: &str) -> Result<Vec<String>> {
        let phase = self.state.lock();
        self.check_namespace(*phase, dst)?;
        let mut created = Vec::new();
        for reg in &self.registry {
            for name in reg.live_names(Some(src))? {
                created.push(reg.duplicate(&name, Some(dst))?);
            }
        }
        Ok(created)
    }

    // Replay.

    /// Replay text of the whole datastore: namespaces, then every committed
    /// entity in dependency order, then one enable/disable status line per
    /// entity.
    pub fn serialize_all(&self) -> Result<String> {
        let mut out = String::new();
        for ns in self.resolver.namespaces() {
            out.push_str("namespace");
            replay::push_value(&mut out, &ns);
            out.push_str(" create\n");
        }
        let mut status = String::new();
        for reg in &self.registry {
            let live: HashSet<String> = reg.live_names(None)?.into_iter().collect();
            for name in reg.sorted_names()? {
                if !live.contains(&name) {
                    continue;
                }
                let line = reg.serialize(&name)?;
                if line.is_empty() {
                    continue;
                }
                out.push_str(&line);
                let enabled = reg.enable(Phase::AutoCommit, &name, EnableRequest::Query)?;
                status.push_str(reg.type_name());
                replay::push_value(&mut status, &name);
                status.push_str(if enabled { " enable\n" } else { " disable\n" });
            }
        }
        out.push_str(&status);
        Ok(out)
    }

    /// Applies replay text in the current driver state. Returns the number of
    /// statements applied.
    pub fn load_replay(&self, text: &str) -> Result<usize> {
        let phase = self.state.lock();
        let mut applied = 0;
        for line in text.lines() {
            let Some(stmt) = replay::parse_statement(line)? else {
                continue;
            };
            if stmt.type_name == "namespace" {
                if stmt.verb != "create" {
                    return Err(DatastoreError::InvalidArgs(format!(
                        "namespace {}: unknown verb = {}",
                        stmt.name, stmt.verb
                    )));
                }
                match self.resolver.add(&stmt.name) {
                    Ok(()) | Err(DatastoreError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e),
                }
            } else {
                if stmt.verb == "create" {
                    self.resolver.check_fullname(&stmt.name)?;
                    let (ns, _) = namespace::split_fullname(&stmt.name)?;
                    self.check_namespace(*phase, ns)?;
                }
                self.registration(&stmt.type_name)?
                    .replay(*phase, &stmt.name, &stmt.verb, stmt.args)?;
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Drops every entity and stops every store.
    pub fn shutdown(&self) {
        for reg in self.registry.iter().rev() {
            reg.shutdown();
        }
    }

    fn target_for_create(&self, phase: Phase, name: &str) -> Result<String> {
        let resolved = self.resolver.resolve(name)?;
        if resolved.is_namespace_only() {
            return Err(DatastoreError::InvalidArgs(format!(
                "name is missing: {}",
                name
            )));
        }
        self.check_namespace(phase, &resolved.namespace)?;
        Ok(resolved.fullname)
    }

    fn check_namespace(&self, phase: Phase, ns: &str) -> Result<()> {
        if phase != Phase::DryRun && !self.resolver.exists(ns) {
            return Err(DatastoreError::NotFound(format!("namespace = {}", ns)));
        }
        Ok(())
    }
}

fn transition(state: &mut Phase, from: Phase, to: Phase) -> Result<()> {
    if *state != from {
        return Err(DatastoreError::InvalidStateTransition {
            from: state.to_string(),
            to: to.to_string(),
        });
    }
    *state = to;
    Ok(())
}

/// One phase step of one entity during a driver pass. Entities removed by an
/// earlier step are skipped.
fn step(reg: &dyn TypeRegistration, phase: Phase, name: &str) {
    match reg.update(phase, name) {
        Ok(()) => {}
        Err(DatastoreError::NotFound(_)) => {
            debug!("{} {} gone before {}", reg.type_name(), name, phase);
        }
        Err(e) => warn!("{} {}: {} failed: {}", reg.type_name(), name, phase, e),
    }
}
