use crate::errors::Result;
use crate::snapshot::Snapshot;

/// The versioned record of one named configuration entity.
///
/// `current` is the last committed snapshot and `modified` the pending one.
/// Both are explicit options: [`promote`](Self::promote) moves the pending
/// snapshot into the committed slot, and [`revert`](Self::revert) turns the
/// previous committed snapshot into the pending one so that applying it
/// undoes a partially applied change.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState<A> {
    name: String,
    current: Option<A>,
    modified: Option<A>,
    pub(crate) used: bool,
    pub(crate) enabled: bool,
    pub(crate) destroying: bool,
    enabling: bool,
    disabling: bool,
    // Set when a commit turned the staged flag into `enabled`, so a rollback
    // knows whether there is anything to flip back.
    staged_applied: bool,
}

impl<A: Snapshot> EntityState<A> {
    /// A freshly created entity: nothing committed yet, `attrs` pending.
    pub fn new(name: impl Into<String>, attrs: A) -> Self {
        Self {
            name: name.into(),
            current: None,
            modified: Some(attrs),
            used: false,
            enabled: false,
            destroying: false,
            enabling: false,
            disabling: false,
            staged_applied: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> Option<&A> {
        self.current.as_ref()
    }

    pub fn modified(&self) -> Option<&A> {
        self.modified.as_ref()
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_destroying(&self) -> bool {
        self.destroying
    }

    pub fn is_enabling(&self) -> bool {
        self.enabling
    }

    pub fn is_disabling(&self) -> bool {
        self.disabling
    }

    /// The snapshot a new operation should build on: the pending one if any,
    /// otherwise the committed one.
    pub fn working(&self) -> Option<&A> {
        self.modified.as_ref().or(self.current.as_ref())
    }

    /// Never committed, but a snapshot is pending.
    pub fn is_pure_creation(&self) -> bool {
        self.current.is_none() && self.modified.is_some()
    }

    /// A pending snapshot exists and differs from the committed one.
    pub fn is_modified(&self) -> bool {
        match (&self.current, &self.modified) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(current), Some(modified)) => current != modified,
        }
    }

    /// Replaces the pending snapshot.
    pub fn stage(&mut self, attrs: A) {
        self.modified = Some(attrs);
    }

    /// `current <- modified`, `modified <- absent`. No-op when nothing is
    /// pending.
    pub fn promote(&mut self) {
        if let Some(modified) = self.modified.take() {
            self.current = Some(modified);
        }
    }

    /// Exchanges the committed and pending snapshots. No-op when nothing is
    /// pending.
    pub fn revert(&mut self) {
        if let Some(modified) = self.modified.take() {
            self.modified = self.current.replace(modified);
        }
    }

    /// Drops the pending snapshot.
    pub fn discard_modified(&mut self) -> Option<A> {
        self.modified.take()
    }

    /// Records an enable (`true`) or disable (`false`) request without
    /// flipping `enabled`.
    pub fn stage_enable(&mut self, enable: bool) {
        self.enabling = enable;
        self.disabling = !enable;
    }

    /// Marks the entity for removal when the transaction finalizes.
    pub fn stage_destroy(&mut self) {
        self.destroying = true;
        self.enabling = false;
        self.disabling = true;
    }

    /// Resolves the staged flags into `enabled`.
    pub fn apply_staged(&mut self) {
        if !self.enabled && self.enabling {
            self.enabled = true;
            self.staged_applied = true;
        } else if self.enabled && self.disabling {
            self.enabled = false;
            self.staged_applied = true;
        }
    }

    /// Undoes [`apply_staged`](Self::apply_staged) and re-stages the opposite
    /// request so that the commit logic performs the reverse start/stop.
    pub fn reverse_staged(&mut self) {
        if self.staged_applied {
            self.enabled = !self.enabled;
            std::mem::swap(&mut self.enabling, &mut self.disabling);
            self.staged_applied = false;
        } else {
            self.clear_staged();
        }
    }

    pub fn clear_staged(&mut self) {
        self.enabling = false;
        self.disabling = false;
        self.staged_applied = false;
    }

    /// Deep copy of this entity under a new name, with namespace-qualified
    /// references in both snapshots moved to `namespace`. Lifecycle flags are
    /// carried over, so a namespace copied as a whole keeps its usage claims.
    pub fn duplicate(&self, name: impl Into<String>, namespace: &str) -> Result<Self> {
        let current = self
            .current
            .as_ref()
            .map(|attrs| attrs.with_namespace(namespace))
            .transpose()?;
        let modified = self
            .modified
            .as_ref()
            .map(|attrs| attrs.with_namespace(namespace))
            .transpose()?;
        Ok(Self {
            name: name.into(),
            current,
            modified,
            used: self.used,
            enabled: self.enabled,
            destroying: self.destroying,
            enabling: self.enabling,
            disabling: self.disabling,
            staged_applied: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::OptionArgs;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Attrs {
        peer: String,
        value: u32,
    }

    impl Snapshot for Attrs {
        fn with_namespace(&self, namespace: &str) -> Result<Self> {
            Ok(Self {
                peer: crate::namespace::replace_namespace(&self.peer, namespace)?,
                value: self.value,
            })
        }

        fn to_options(&self) -> Vec<(&'static str, Vec<String>)> {
            vec![("-value", vec![self.value.to_string()])]
        }

        fn set_option(&mut self, option: &str, args: OptionArgs<'_>) -> Result<()> {
            self.value = crate::snapshot::parse_arg(option, args)?;
            Ok(())
        }
    }

    fn attrs(value: u32) -> Attrs {
        Attrs {
            peer: ":peer".into(),
            value,
        }
    }

    #[test]
    fn test_promote_and_revert() {
        let mut st = EntityState::new(":a", attrs(1));
        assert!(st.is_pure_creation());
        assert!(st.is_modified());
        st.promote();
        assert_eq!(st.current(), Some(&attrs(1)));
        assert!(st.modified().is_none());

        st.stage(attrs(2));
        assert!(st.is_modified());
        st.revert();
        assert_eq!(st.current(), Some(&attrs(2)));
        assert_eq!(st.modified(), Some(&attrs(1)));
    }

    #[test]
    fn test_equal_pending_is_not_modified() {
        let mut st = EntityState::new(":a", attrs(1));
        st.promote();
        st.stage(attrs(1));
        assert!(st.modified().is_some());
        assert!(!st.is_modified());
    }

    #[test]
    fn test_staged_flags_apply_and_reverse() {
        let mut st = EntityState::new(":a", attrs(1));
        st.stage_enable(true);
        assert!(st.is_enabling() && !st.is_disabling());
        st.apply_staged();
        assert!(st.is_enabled());
        st.reverse_staged();
        assert!(!st.is_enabled());
        assert!(st.is_disabling() && !st.is_enabling());

        // Disabling an already disabled entity has nothing to undo.
        let mut st = EntityState::new(":b", attrs(1));
        st.stage_enable(false);
        st.apply_staged();
        st.reverse_staged();
        assert!(!st.is_enabled());
        assert!(!st.is_enabling() && !st.is_disabling());
    }

    #[test]
    fn test_duplicate_rewrites_namespace() {
        let mut st = EntityState::new(":a", attrs(7));
        st.promote();
        st.used = true;
        let dup = st.duplicate("ns1:a", "ns1").unwrap();
        assert_eq!(dup.name(), "ns1:a");
        assert_eq!(dup.current().unwrap().peer, "ns1:peer");
        assert!(dup.is_used());
        assert_eq!(st.current().unwrap().peer, ":peer");
    }
}
