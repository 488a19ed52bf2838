//! The contract between the transaction engine and the entity types.
//!
//! A concrete type implements [`EntityKind`]: it names its snapshot type, hands
//! out its external collaborator and, when it references other entities,
//! implements the dependency hooks against the tables it was given at
//! construction. The engine ([`EntityTable`](crate::engine::EntityTable)) turns
//! that into the seven registered operations, which the datastore drives
//! through the object-safe [`TypeRegistration`].

use crate::collaborator::Collaborator;
use crate::errors::Result;
use crate::phase::Phase;
use crate::snapshot::Snapshot;

/// Per-type behavior plugged into the generic engine.
pub trait EntityKind: Send + Sync + 'static {
    type Attrs: Snapshot;

    /// The name the type is registered and serialized under.
    const TYPE_NAME: &'static str;

    fn collaborator(&self) -> &dyn Collaborator<Self::Attrs>;

    /// Whether `enable` requires another entity to hold a usage claim first.
    fn requires_usage_to_enable(&self) -> bool {
        true
    }

    /// Checks a snapshot against the dependent stores before anything is
    /// mutated. `previous` is the snapshot the change is based on, so only
    /// newly introduced references need checking.
    fn validate(
        &self,
        _name: &str,
        _attrs: &Self::Attrs,
        _previous: Option<&Self::Attrs>,
    ) -> Result<()> {
        Ok(())
    }

    /// Sets or clears the usage claim on every entity `attrs` references.
    fn set_dependents_used(&self, _attrs: &Self::Attrs, _used: bool) -> Result<()> {
        Ok(())
    }

    /// Runs the commit path of every referenced entity for `phase`.
    fn update_dependents(&self, _phase: Phase, _attrs: &Self::Attrs) -> Result<()> {
        Ok(())
    }

    fn enable_dependents(&self, _phase: Phase, _attrs: &Self::Attrs) -> Result<()> {
        Ok(())
    }

    fn disable_dependents(&self, _phase: Phase, _attrs: &Self::Attrs) -> Result<()> {
        Ok(())
    }
}

/// An enable call is either a query of the committed `enabled` flag or a
/// command to flip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableRequest {
    Query,
    Enable,
    Disable,
}

/// Type-erased view of one registered entity type, addressed by fully
/// qualified names.
pub trait TypeRegistration: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Runs one phase step for the entity.
    fn update(&self, phase: Phase, name: &str) -> Result<()>;

    /// Queries or flips `enabled`; returns the flag after the call.
    fn enable(&self, phase: Phase, name: &str, request: EnableRequest) -> Result<bool>;

    /// Replay text of the committed snapshot (empty if never committed).
    fn serialize(&self, name: &str) -> Result<String>;

    fn destroy(&self, phase: Phase, name: &str) -> Result<()>;

    /// Copies the entity into `target_namespace` (or its own namespace) and
    /// returns the new fully-qualified name.
    fn duplicate(&self, name: &str, target_namespace: Option<&str>) -> Result<String>;

    /// Every entity, including those being destroyed, ordered by name.
    fn sorted_names(&self) -> Result<Vec<String>>;

    /// Live entities of `namespace` (or all of them), in insertion order.
    fn live_names(&self, namespace: Option<&str>) -> Result<Vec<String>>;

    /// Applies one parsed replay statement (`create`, `enable` or `disable`).
    fn replay(&self, phase: Phase, name: &str, verb: &str, args: Vec<String>) -> Result<()>;

    /// Drops every entity and stops the store.
    fn shutdown(&self);
}
