//! Insertion-ordered account registry
//!
//! Records live in a `Vec` and are looked up through an id → slot index.
//! Callers read by reference and write back whole records with
//! [`Registry::replace`], so a staged copy never aliases the stored one.

use crate::types::AccountId;
use std::collections::HashMap;

/// Record stored in a [`Registry`]
pub trait Keyed {
    /// Registry key
    fn key(&self) -> &AccountId;
}

impl Keyed for crate::types::Vault {
    fn key(&self) -> &AccountId {
        &self.id
    }
}

impl Keyed for crate::types::Provider {
    fn key(&self) -> &AccountId {
        &self.id
    }
}

/// Arena of records keyed by account id
#[derive(Debug, Clone)]
pub struct Registry<T> {
    records: Vec<T>,
    index: HashMap<AccountId, usize>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Keyed> Registry<T> {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `id`, if registered
    pub fn slot(&self, id: &AccountId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &AccountId) -> bool {
        self.index.contains_key(id)
    }

    /// Record by id
    pub fn get(&self, id: &AccountId) -> Option<&T> {
        self.slot(id).map(|slot| &self.records[slot])
    }

    /// Record by slot
    pub fn at(&self, slot: usize) -> &T {
        &self.records[slot]
    }

    /// Append a record; returns `false` and drops it if the key is taken
    pub fn insert(&mut self, record: T) -> bool {
        if self.index.contains_key(record.key()) {
            return false;
        }
        self.index.insert(record.key().clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Overwrite the record in `slot`
    pub fn replace(&mut self, slot: usize, record: T) {
        debug_assert_eq!(self.records[slot].key(), record.key());
        self.records[slot] = record;
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
