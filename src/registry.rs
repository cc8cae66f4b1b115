//! Ownership tree primitives.
//!
//! Every handle (database, connection, statement, result set) carries a [`NodeState`] and
//! keeps its live children in a [`ChildRegistry`]. Children are held weakly so the tree has no
//! reference cycles; a parent only ever walks down, never up.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::BridgeError;

/// Closed flag of one handle.
#[derive(Debug, Default)]
pub struct NodeState {
    closed: AtomicBool,
}

impl NodeState {
    /// Mark the node closed. Returns `true` only for the call that actually closed it.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// `Err(Closed(kind))` once the node is closed.
    pub(crate) fn ensure_open(&self, kind: &'static str) -> Result<(), BridgeError> {
        if self.is_closed() {
            Err(BridgeError::Closed(kind))
        } else {
            Ok(())
        }
    }
}

struct ChildSet<T> {
    closing: bool,
    next_id: u64,
    children: BTreeMap<u64, Weak<T>>,
}

/// Live children of one handle.
///
/// Registration and the start of a close take the same lock, so once
/// [`ChildRegistry::begin_close`] returned no new child can appear.
pub struct ChildRegistry<T> {
    inner: Mutex<ChildSet<T>>,
}

impl<T> Default for ChildRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ChildSet {
                closing: false,
                next_id: 1,
                children: BTreeMap::new(),
            }),
        }
    }
}

impl<T> ChildRegistry<T> {
    fn lock(&self) -> MutexGuard<'_, ChildSet<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a child with the id it must later deregister under, and track it.
    ///
    /// # Errors
    /// Returns `BridgeError::Closed(parent)` once the owner started closing; `build` is not
    /// called then.
    pub fn register(
        &self,
        parent: &'static str,
        build: impl FnOnce(u64) -> Arc<T>,
    ) -> Result<Arc<T>, BridgeError> {
        let mut set = self.lock();
        if set.closing {
            return Err(BridgeError::Closed(parent));
        }
        let id = set.next_id;
        set.next_id += 1;
        let child = build(id);
        set.children.insert(id, Arc::downgrade(&child));
        Ok(child)
    }

    pub fn remove(&self, id: u64) {
        self.lock().children.remove(&id);
    }

    /// Refuse further registrations and hand back every child still alive, newest first.
    pub fn begin_close(&self) -> Vec<Arc<T>> {
        let mut set = self.lock();
        set.closing = true;
        let children = std::mem::take(&mut set.children);
        children.into_values().rev().filter_map(|c| c.upgrade()).collect()
    }

    /// Children still alive, oldest first, without starting a close.
    pub fn live(&self) -> Vec<Arc<T>> {
        self.lock()
            .children
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.lock()
            .children
            .values()
            .filter(|c| c.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_closed_reports_first_close_only() {
        let state = NodeState::default();
        assert!(state.ensure_open("Statement").is_ok());
        assert!(state.mark_closed());
        assert!(!state.mark_closed());
        assert!(matches!(
            state.ensure_open("Statement"),
            Err(BridgeError::Closed("Statement"))
        ));
    }

    #[test]
    fn begin_close_drains_newest_first_and_blocks_registration() {
        let registry: ChildRegistry<(u64, u32)> = ChildRegistry::default();
        let a = registry.register("Connection", |id| Arc::new((id, 1))).unwrap();
        let b = registry.register("Connection", |id| Arc::new((id, 2))).unwrap();
        let c = registry.register("Connection", |id| Arc::new((id, 3))).unwrap();
        registry.remove(b.0);
        assert_eq!(registry.live_count(), 2);

        let drained: Vec<u32> = registry.begin_close().iter().map(|c| c.1).collect();
        assert_eq!(drained, vec![3, 1]);
        assert_eq!(registry.live_count(), 0);
        let refused = registry.register("Connection", |id| Arc::new((id, 4)));
        assert!(refused.unwrap_err().is_closed());
        drop((a, c));
    }

    #[test]
    fn dropped_children_are_not_counted() {
        let registry: ChildRegistry<String> = ChildRegistry::default();
        let _kept = registry
            .register("Database", |_| Arc::new("kept".to_string()))
            .unwrap();
        drop(registry.register("Database", |_| Arc::new("gone".to_string())));
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.live().len(), 1);
    }
}
