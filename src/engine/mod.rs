mod cascade;
mod versioning;

pub(crate) use cascade::{cascade_delete, cascade_restore, cascade_save};
pub(crate) use versioning::{newest_closed, restore_record, update_all_history};

use crate::temporal::Timestamp;
use std::collections::HashSet;

/// State carried through one top-level operation. Every timestamp written
/// anywhere in the traversal comes from `now`, so an owner and everything it
/// cascades into share one instant. The visited set breaks cycles in the
/// association graph.
pub struct TraversalContext {
    pub now: Timestamp,
    visited: HashSet<String>,
}

impl TraversalContext {
    pub fn at(now: Timestamp) -> Self {
        Self {
            now,
            visited: HashSet::new(),
        }
    }

    /// Marks a fingerprint as visited; false when it was already seen.
    pub fn visit(&mut self, fingerprint: String) -> bool {
        self.visited.insert(fingerprint)
    }

    pub fn seen(&self, fingerprint: &str) -> bool {
        self.visited.contains(fingerprint)
    }
}
