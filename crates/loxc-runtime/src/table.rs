//! Open-addressed hash table keyed by interned strings.
//!
//! Keys are `ObjRef`s of interned strings, so key comparison during probing
//! is plain identity. Each entry caches the key's hash, which keeps probing
//! free of heap lookups and lets the table rehash without consulting the
//! pool. Deletion leaves a tombstone (no key, value `true`) that probe
//! chains continue past.

use crate::object::{LoxString, ObjRef};
use crate::value::Value;

/// Maximum load factor before growth: 3/4.
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

/// Minimum non-zero capacity.
const MIN_CAPACITY: usize = 8;

/// One table slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Entry {
    /// `None` for both empty slots and tombstones; the value disambiguates
    /// (empty = nil, tombstone = true).
    pub(crate) key: Option<ObjRef>,
    /// Cached hash of the key; meaningless when `key` is `None`.
    pub(crate) hash: u32,
    pub(crate) value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: None,
        hash: 0,
        value: Value::Nil,
    };
}

/// Open-addressed hash table with linear probing and tombstones.
#[derive(Debug, Default)]
pub struct Table {
    /// Live entries plus tombstones.
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots (live, tombstone, or empty).
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Live entries plus tombstones, for the load-factor invariant.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Finds the slot for `key`: either the slot holding it, or the slot an
    /// insert should use (the first tombstone passed, if any, else the
    /// terminating empty slot).
    fn find_entry(entries: &[Entry], key: ObjRef, hash: u32) -> usize {
        let capacity = entries.len();
        let mut index = hash as usize % capacity;
        let mut tombstone: Option<usize> = None;

        loop {
            let entry = &entries[index];
            match entry.key {
                None => {
                    if entry.value == Value::Nil {
                        // Truly empty: the probe chain ends here.
                        return tombstone.unwrap_or(index);
                    }
                    // A tombstone; remember the first one and keep probing.
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Some(existing) if existing == key => return index,
                Some(_) => {}
            }

            index = (index + 1) % capacity;
        }
    }

    /// Looks up the value stored under `key`.
    pub fn get(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.count == 0 {
            return None;
        }

        let index = Self::find_entry(&self.entries, key, hash);
        let entry = &self.entries[index];
        entry.key.map(|_| entry.value)
    }

    /// Inserts or replaces the value under `key`.
    ///
    /// Returns true if the key was not present before. Grows at 3/4 load;
    /// inserting over a tombstone does not bump the count (the tombstone
    /// already did).
    pub fn set(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        if (self.count + 1) * MAX_LOAD_DEN > self.entries.len() * MAX_LOAD_NUM {
            self.grow();
        }

        let index = Self::find_entry(&self.entries, key, hash);
        let entry = &mut self.entries[index];
        let is_new_key = entry.key.is_none();
        if is_new_key && entry.value == Value::Nil {
            self.count += 1;
        }

        *entry = Entry {
            key: Some(key),
            hash,
            value,
        };
        is_new_key
    }

    /// Removes `key`, leaving a tombstone so later probes keep walking the
    /// collision chain. Returns whether the key was present.
    pub fn delete(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.count == 0 {
            return false;
        }

        let index = Self::find_entry(&self.entries, key, hash);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }

        *entry = Entry {
            key: None,
            hash: 0,
            value: Value::Bool(true),
        };
        true
    }

    /// Copies every live entry of `from` into `self`.
    pub fn add_all(&mut self, from: &Table) {
        for i in 0..from.entries.len() {
            let entry = from.entries[i];
            if let Some(key) = entry.key {
                self.set(key, entry.hash, entry.value);
            }
        }
    }

    /// Content-based lookup used by the interner: finds the key whose string
    /// equals `chars`, comparing hash first and bytes only on a hash match.
    ///
    /// `resolve` maps a key handle to its string payload.
    pub fn find_string<'h>(
        &self,
        chars: &str,
        hash: u32,
        resolve: impl Fn(ObjRef) -> &'h LoxString,
    ) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }

        let capacity = self.entries.len();
        let mut index = hash as usize % capacity;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    // Stop at a truly empty slot; skip tombstones.
                    if entry.value == Value::Nil {
                        return None;
                    }
                }
                Some(key) => {
                    let string = resolve(key);
                    if string.hash == hash && &*string.chars == chars {
                        return Some(key);
                    }
                }
            }

            index = (index + 1) % capacity;
        }
    }

    /// The live pair at slot `index`, if any. Used by GC marking and the
    /// weak-string prune, which walk slots directly.
    pub fn entry_at(&self, index: usize) -> Option<(ObjRef, Value)> {
        let entry = &self.entries[index];
        entry.key.map(|key| (key, entry.value))
    }

    /// Cached hash of the key at slot `index`.
    pub(crate) fn hash_at(&self, index: usize) -> u32 {
        self.entries[index].hash
    }

    /// Doubles capacity (from a floor of 8) and rehashes live entries.
    /// Tombstones are dropped, so the count is recomputed.
    fn grow(&mut self) {
        let new_capacity = if self.entries.len() < MIN_CAPACITY {
            MIN_CAPACITY
        } else {
            self.entries.len() * 2
        };

        let old = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; new_capacity]);
        self.count = 0;

        for entry in old {
            if let Some(key) = entry.key {
                let index = Self::find_entry(&self.entries, key, entry.hash);
                self.entries[index] = entry;
                self.count += 1;
            }
        }
    }
}
