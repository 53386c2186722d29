//! Compact insertion-ordered hash containers.
//!
//! Entries live in one dense vector in insertion order; a power-of-two bucket
//! array holds the 1-based index of the newest entry per bucket and each entry
//! links to the next entry of its bucket. Growth doubles the bucket array and
//! relinks every entry. Indexes handed out by `add`/`insert` stay valid for
//! the lifetime of the container.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh64::Xxh64;

fn hash_of<Q: Hash + ?Sized>(item: &Q) -> u64 {
    let mut hasher = Xxh64::new(0);
    item.hash(&mut hasher);
    hasher.finish()
}

#[derive(Clone)]
struct Slot<T> {
    hash: u64,
    // 1-based index of the next entry in the same bucket, 0 ends the chain
    next: u32,
    item: T,
}

/// Insertion-ordered hash set addressed by dense indexes.
#[derive(Clone)]
pub struct SetSlim<T> {
    buckets: Vec<u32>,
    slots: Vec<Slot<T>>,
}

impl<T> Default for SetSlim<T> {
    fn default() -> Self {
        SetSlim {
            buckets: Vec::new(),
            slots: Vec::new(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SetSlim<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T> SetSlim<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket capacity is rounded up to a power of two, at least 2.
    pub fn with_capacity(capacity: usize) -> Self {
        SetSlim {
            buckets: vec![0; capacity.max(2).next_power_of_two()],
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Item at insertion index `i`.
    pub fn get(&self, i: usize) -> Option<&T> {
        self.slots.get(i).map(|s| &s.item)
    }

    /// Items in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &T> + '_ {
        self.slots.iter().map(|s| &s.item)
    }

    fn grow(&mut self) {
        let capacity = (self.buckets.len() * 2).max(2);
        let mask = (capacity - 1) as u64;
        let mut buckets = vec![0u32; capacity];
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let b = (slot.hash & mask) as usize;
            slot.next = buckets[b];
            buckets[b] = i as u32 + 1;
        }
        self.buckets = buckets;
    }

    fn find<Q>(&self, item: &Q, hash: u64) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if self.buckets.is_empty() {
            return None;
        }
        let mask = (self.buckets.len() - 1) as u64;
        let mut i = self.buckets[(hash & mask) as usize];
        while i != 0 {
            let slot = &self.slots[i as usize - 1];
            if slot.hash == hash && slot.item.borrow() == item {
                return Some(i as usize - 1);
            }
            i = slot.next;
        }
        None
    }

    fn push(&mut self, item: T, hash: u64) -> usize {
        if self.slots.len() == self.buckets.len() {
            self.grow();
        }
        let i = self.slots.len();
        let b = (hash & (self.buckets.len() - 1) as u64) as usize;
        self.slots.push(Slot {
            hash,
            next: self.buckets[b],
            item,
        });
        self.buckets[b] = i as u32 + 1;
        i
    }
}

impl<T: Hash + Eq> SetSlim<T> {
    /// Insert `item` unless present; returns its index either way.
    pub fn add(&mut self, item: T) -> usize {
        let hash = hash_of(&item);
        match self.find(&item, hash) {
            Some(i) => i,
            None => self.push(item, hash),
        }
    }

    pub fn index_of<Q>(&self, item: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(item, hash_of(item))
    }

    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index_of(item).is_some()
    }
}

impl<T: Hash + Eq> FromIterator<T> for SetSlim<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = SetSlim::new();
        for item in iter {
            set.add(item);
        }
        set
    }
}

/// Insertion-ordered hash map with the same layout as [`SetSlim`].
#[derive(Clone)]
pub struct MapSlim<K, V> {
    keys: SetSlim<K>,
    values: Vec<V>,
}

impl<K, V> Default for MapSlim<K, V> {
    fn default() -> Self {
        MapSlim {
            keys: SetSlim::default(),
            values: Vec::new(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for MapSlim<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> MapSlim<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn key(&self, i: usize) -> Option<&K> {
        self.keys.get(i)
    }

    pub fn value(&self, i: usize) -> Option<&V> {
        self.values.get(i)
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.keys.iter()
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + '_ {
        self.values.iter()
    }

    /// Pairs in first-insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &V)> + '_ {
        self.keys.iter().zip(self.values.iter())
    }
}

impl<K: Hash + Eq, V> MapSlim<K, V> {
    /// Insert or overwrite; returns the entry's index.
    pub fn insert(&mut self, key: K, value: V) -> usize {
        let i = self.keys.add(key);
        if i == self.values.len() {
            self.values.push(value);
        } else {
            self.values[i] = value;
        }
        i
    }

    pub fn index_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.keys.index_of(key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index_of(key).map(|i| &self.values[i])
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index_of(key).map(move |i| &mut self.values[i])
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index_of(key).is_some()
    }
}
