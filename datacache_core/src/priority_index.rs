//! Keyed dual-orientation priority structure backing both the residency
//! heap (min-on-pin) and the demand heap (max-on-pending-count).
//!
//! A bare `std::collections::BinaryHeap` has no lookup-by-key, no update,
//! and no removal of an arbitrary element — all three are first-class
//! operations here. This follows the `entry_finder` + tombstone idiom (a
//! side index plus lazy deletion on pop/peek) rather than a decrease-key
//! heap, trading a few discarded tombstones for O(log n) `adjust`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use thiserror::Error;

/// Which direction `peek`/`pop` favor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Smallest weight first (residency heap: evict pin==0 first).
    MinOnWeight,
    /// Largest weight first (demand heap: admit highest pending count first).
    MaxOnWeight,
}

/// Error adjusting a key's weight.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PriorityIndexError {
    /// A residency-oriented index's weight would have gone negative.
    #[error("weight for key would go below zero")]
    NegativeWeight,
}

struct IndexEntry {
    weight: u64,
    generation: u64,
}

struct HeapEntry<K> {
    order_key: i64,
    seq: Reverse<u64>,
    generation: u64,
    weight: u64,
    key: K,
}

impl<K> PartialEq for HeapEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.order_key == other.order_key && self.seq == other.seq
    }
}
impl<K> Eq for HeapEntry<K> {}

impl<K> PartialOrd for HeapEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<K> Ord for HeapEntry<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.order_key, self.seq).cmp(&(other.order_key, other.seq))
    }
}

/// A keyed priority structure with O(log n) insert/adjust/pop and O(1)
/// `contains`.
pub struct PriorityIndex<K> {
    orientation: Orientation,
    heap: BinaryHeap<HeapEntry<K>>,
    index: HashMap<K, IndexEntry>,
    next_seq: u64,
    next_generation: u64,
}

impl<K: Eq + Hash + Clone> PriorityIndex<K> {
    /// Construct an empty index with the given orientation.
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            heap: BinaryHeap::new(),
            index: HashMap::new(),
            next_seq: 0,
            next_generation: 0,
        }
    }

    fn order_key(&self, weight: u64) -> i64 {
        match self.orientation {
            Orientation::MinOnWeight => -(weight as i64),
            Orientation::MaxOnWeight => weight as i64,
        }
    }

    /// Insert a fresh key, or replace an existing key's weight. The
    /// previous heap entry (if any) becomes a tombstone, discarded lazily.
    pub fn insert_or_update(&mut self, key: K, weight: u64) {
        let generation = self.next_generation;
        self.next_generation += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        self.index.insert(
            key.clone(),
            IndexEntry {
                weight,
                generation,
            },
        );
        self.heap.push(HeapEntry {
            order_key: self.order_key(weight),
            seq: Reverse(seq),
            generation,
            weight,
            key,
        });
    }

    /// Adjust `key`'s weight by `delta`, creating it at weight 0 first if
    /// absent. Residency-oriented (`MinOnWeight`) indexes error rather than
    /// go negative; demand-oriented (`MaxOnWeight`) indexes saturate at 0.
    /// Validation happens before any mutation — a rejected adjustment
    /// leaves the index untouched.
    pub fn adjust(&mut self, key: &K, delta: i64) -> Result<(), PriorityIndexError> {
        let current = self.index.get(key).map(|e| e.weight).unwrap_or(0);
        let signed = current as i64 + delta;

        let new_weight = match self.orientation {
            Orientation::MinOnWeight => {
                if signed < 0 {
                    return Err(PriorityIndexError::NegativeWeight);
                }
                signed as u64
            }
            Orientation::MaxOnWeight => signed.max(0) as u64,
        };

        self.insert_or_update(key.clone(), new_weight);
        Ok(())
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            match self.index.get(&top.key) {
                Some(entry) if entry.generation == top.generation => break,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }

    /// Peek the front (key, weight) without removing it.
    pub fn peek(&mut self) -> Option<(K, u64)> {
        self.discard_stale();
        self.heap.peek().map(|e| (e.key.clone(), e.weight))
    }

    /// Remove and return the front (key, weight).
    pub fn pop(&mut self) -> Option<(K, u64)> {
        self.discard_stale();
        let top = self.heap.pop()?;
        self.index.remove(&top.key);
        Some((top.key, top.weight))
    }

    /// Drop `key`'s entry without touching the heap. The stale heap node
    /// (if any) is left for `discard_stale` to skip lazily on the next
    /// `peek`/`pop`. A no-op if `key` has no live entry.
    pub fn remove(&mut self, key: &K) {
        self.index.remove(key);
    }

    /// Whether `key` currently has a live (non-tombstoned) entry.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Current weight of `key`, if present.
    pub fn weight(&self, key: &K) -> Option<u64> {
        self.index.get(key).map(|e| e.weight)
    }

    /// Whether the index holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }
}
