//! Locals carrier
//!
//! A [`Carrier`] holds the bindings of the most recently completed activation
//! of a captured function. Instrumented code hands it a fresh map at every
//! exit; readers always observe a whole snapshot, never a partially updated
//! one.

use crate::value::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Index;
use std::sync::{Mutex, MutexGuard};

/// Immutable name-to-value view of one frame's bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalsSnapshot(BTreeMap<String, Value>);

impl LocalsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Binding names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for LocalsSnapshot {
    fn from(map: BTreeMap<String, Value>) -> Self {
        LocalsSnapshot(map)
    }
}

impl FromIterator<(String, Value)> for LocalsSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        LocalsSnapshot(iter.into_iter().collect())
    }
}

impl Index<&str> for LocalsSnapshot {
    type Output = Value;

    /// Panics if `name` is not bound.
    fn index(&self, name: &str) -> &Value {
        match self.0.get(name) {
            Some(value) => value,
            None => panic!("no local named '{}' in snapshot", name),
        }
    }
}

impl<'a> IntoIterator for &'a LocalsSnapshot {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Shared holder of the latest locals snapshot.
#[derive(Debug, Default)]
pub struct Carrier {
    snapshot: Mutex<LocalsSnapshot>,
}

impl Carrier {
    /// Create a carrier holding an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> LocalsSnapshot {
        self.lock().clone()
    }

    /// Swap in a new snapshot wholesale.
    pub fn replace(&self, snapshot: LocalsSnapshot) {
        *self.lock() = snapshot;
    }

    /// Go back to the empty snapshot.
    pub fn reset(&self) {
        self.replace(LocalsSnapshot::new());
    }

    fn lock(&self) -> MutexGuard<'_, LocalsSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
