use std::fmt;

/// The phase a transaction-driver call is issued in.
///
/// Every update carries its phase explicitly. There is no separate initial or
/// terminal state object: each entity is at whatever lifecycle stage its own
/// flags encode, and the phase tells the engine which step to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Every request is applied immediately, with a bounded local fallback
    /// when the collaborator rejects it.
    AutoCommit,
    /// Requests are only staged: usage claims are recorded and enable/disable
    /// is remembered, no external side effects happen.
    Atomic,
    /// Staged changes are applied against the collaborators.
    Committing,
    /// Finalization after a successful `Committing` pass.
    Committed,
    /// Applied changes are undone by applying the previous state as new.
    RollBacking,
    /// Finalization after `RollBacking`.
    RollBacked,
    /// Staged usage claims are released.
    Aborting,
    /// Pending edits are dropped.
    Aborted,
    /// Changes are accepted without any side effect.
    DryRun,
}

impl Phase {
    /// Phases in which a caller request only records intent.
    pub fn is_staging(self) -> bool {
        matches!(self, Phase::Atomic)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::AutoCommit => "auto_commit",
            Phase::Atomic => "atomic",
            Phase::Committing => "committing",
            Phase::Committed => "committed",
            Phase::RollBacking => "rollbacking",
            Phase::RollBacked => "rollbacked",
            Phase::Aborting => "aborting",
            Phase::Aborted => "aborted",
            Phase::DryRun => "dryrun",
        };
        f.write_str(s)
    }
}
