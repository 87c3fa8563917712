//! Utility types and functions.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

/// Lazily populated map from source objects to their counterpart.
pub struct Dispatcher<K, V> {
    items: HashMap<K, V>,
}

impl<K, V> Default for Dispatcher<K, V> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
        }
    }
}

impl<K, V> Dispatcher<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_new<F: FnOnce() -> V>(&mut self, k: &K, f: F) -> &mut V {
        self.items.entry(k.clone()).or_insert_with(f)
    }

    /// Like [`Dispatcher::get_or_new`], but nothing is stored when `f` fails.
    pub fn try_get_or_new<E, F>(&mut self, k: &K, f: F) -> Result<&mut V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        match self.items.entry(k.clone()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => Ok(e.insert(f()?)),
        }
    }

    pub fn get(&self, k: &K) -> Option<&V> {
        self.items.get(k)
    }

    pub fn get_mut(&mut self, k: &K) -> Option<&mut V> {
        self.items.get_mut(k)
    }

    pub fn contains(&self, k: &K) -> bool {
        self.items.contains_key(k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.items.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.items.values_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
