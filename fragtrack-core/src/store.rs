//! In-memory fragment byte store, keyed by fragment hash.
//!
//! Deduplicates by hash and enforces a total capacity so a runaway publisher
//! cannot exhaust the process. Bytes are handed out as shared slices; readers
//! never copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{Result, TrackError};

pub const DEFAULT_CAPACITY: u64 = 256 * 1024 * 1024;

#[derive(Debug)]
pub struct FragmentStore {
    capacity: u64,
    used: AtomicU64,
    fragments: DashMap<String, Arc<[u8]>>,
}

impl Default for FragmentStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl FragmentStore {
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity,
            used: AtomicU64::new(0),
            fragments: DashMap::new(),
        }
    }

    /// Store fragment bytes. Storing the same hash twice is a no-op and costs
    /// no additional space.
    pub fn put(&self, fragment_hash: &str, bytes: Vec<u8>) -> Result<()> {
        match self.fragments.entry(fragment_hash.to_string()) {
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                let len = bytes.len() as u64;
                self.reserve(len)?;
                slot.insert(Arc::from(bytes.into_boxed_slice()));
                Ok(())
            }
        }
    }

    pub fn get(&self, fragment_hash: &str) -> Option<Arc<[u8]>> {
        self.fragments.get(fragment_hash).map(|b| Arc::clone(&b))
    }

    pub fn contains(&self, fragment_hash: &str) -> bool {
        self.fragments.contains_key(fragment_hash)
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    fn reserve(&self, len: u64) -> Result<()> {
        self.used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                used.checked_add(len).filter(|total| *total <= self.capacity)
            })
            .map(|_| ())
            .map_err(|used| TrackError::StorageExhausted {
                needed: len,
                free: self.capacity - used,
            })
    }
}
