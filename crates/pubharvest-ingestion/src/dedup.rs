//! Run-wide deduplication of PubMed identifiers.
//!
//! One [`Registry`] is shared by every category in a run. `try_claim` is
//! the only way to add an id: it inserts atomically and hands back a
//! [`Claim`]. Committing keeps the id; dropping an uncommitted claim
//! releases it so a later category may still use that paper.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // A poisoned set is still a consistent set of strings.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Insert `id` if absent. `None` means another holder already owns it.
    pub fn try_claim(&self, id: &str) -> Option<Claim> {
        if self.lock().insert(id.to_string()) {
            Some(Claim {
                registry: self.clone(),
                id: id.to_string(),
                committed: false,
            })
        } else {
            None
        }
    }
}

/// Provisional ownership of an id.
#[derive(Debug)]
#[must_use = "dropping a claim releases the id"]
pub struct Claim {
    registry: Registry,
    id: String,
    committed: bool,
}

impl Claim {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.lock().remove(&self.id);
        }
    }
}
