//! Signals that have already fired.

use std::collections::HashSet;

use crate::signal::{Signal, SignalIdentity};

/// Set of identities that have fired during the current list membership.
///
/// Insertion is idempotent and there is no eviction while the list stays
/// the same. When the list is replaced, [`retain_members`](Self::retain_members)
/// forgets identities whose signal was removed, so removing a signal and
/// adding it back makes it eligible again.
#[derive(Debug, Default)]
pub struct DeduplicationRegistry {
    fired: HashSet<SignalIdentity>,
}

impl DeduplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, identity: &SignalIdentity) -> bool {
        self.fired.contains(identity)
    }

    /// Record that `identity` fired. Returns false if it was already known.
    pub fn mark(&mut self, identity: SignalIdentity) -> bool {
        self.fired.insert(identity)
    }

    /// Start a new membership epoch for `signals`.
    pub fn retain_members(&mut self, signals: &[Signal]) {
        let members: HashSet<SignalIdentity> = signals.iter().map(Signal::identity).collect();
        self.fired.retain(|identity| members.contains(identity));
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}
