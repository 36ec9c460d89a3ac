//! FragmentDistributionIndex: which peers hold which fragments of which files.
//!
//! Keyed by file identifier. Each file keeps its fragment hashes in first-seen
//! order (reconstruction order) plus a per-fragment holder set. Mutations to
//! one file are serialized by the shard lock; distinct files proceed
//! concurrently. Queries clone a point-in-time snapshot of the one file they
//! touch.

use std::collections::{BTreeSet, HashMap};

use dashmap::DashMap;

use crate::domain::{FileDistribution, PeerEndpoint};
use crate::error::{Result, TrackError};

#[derive(Clone, Debug)]
pub struct FragmentRecord {
    pub length: u64,
    pub holders: BTreeSet<PeerEndpoint>,
}

#[derive(Clone, Debug)]
pub struct FileEntry {
    pub declared_size: u64,
    fragment_order: Vec<String>,
    fragments: HashMap<String, FragmentRecord>,
}

#[derive(Debug, Default)]
pub struct FragmentDistributionIndex {
    files: DashMap<String, FileEntry>,
}

impl FragmentDistributionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset, on re-initiation after a failed upload) the entry for
    /// `file_hash`. Records are never deleted within process lifetime.
    pub fn create_file(&self, file_hash: &str, declared_size: u64) {
        self.files.insert(
            file_hash.to_string(),
            FileEntry {
                declared_size,
                fragment_order: Vec::new(),
                fragments: HashMap::new(),
            },
        );
    }

    pub fn contains_file(&self, file_hash: &str) -> bool {
        self.files.contains_key(file_hash)
    }

    /// Add `endpoint` to the holder set of (`file_hash`, `fragment_hash`),
    /// creating the fragment record on first sight. Hash and length are
    /// immutable once set: a re-registration with a different length fails
    /// with `HashConflict` and leaves the existing record untouched.
    pub fn register_fragment(
        &self,
        file_hash: &str,
        fragment_hash: &str,
        length: u64,
        endpoint: PeerEndpoint,
    ) -> Result<()> {
        let mut entry = self
            .files
            .get_mut(file_hash)
            .ok_or_else(|| TrackError::UnknownFile(file_hash.to_string()))?;

        if let Some(rec) = entry.fragments.get_mut(fragment_hash) {
            if rec.length != length {
                return Err(TrackError::HashConflict {
                    hash: fragment_hash.to_string(),
                    existing: rec.length,
                    given: length,
                });
            }
            rec.holders.insert(endpoint);
            return Ok(());
        }

        entry.fragment_order.push(fragment_hash.to_string());
        entry.fragments.insert(
            fragment_hash.to_string(),
            FragmentRecord {
                length,
                holders: BTreeSet::from([endpoint]),
            },
        );
        Ok(())
    }

    /// Snapshot of a file's reconstruction order and holder sets.
    pub fn distribution(&self, file_hash: &str) -> Result<FileDistribution> {
        let entry = self
            .files
            .get(file_hash)
            .ok_or_else(|| TrackError::UnknownFile(file_hash.to_string()))?;

        Ok(FileDistribution {
            fragment_order: entry.fragment_order.clone(),
            distribution: entry
                .fragments
                .iter()
                .map(|(h, rec)| (h.clone(), rec.holders.clone()))
                .collect(),
        })
    }

    /// Aggregate view for NetworkInfo: (files, fragments, declared bytes,
    /// union of holder endpoints). Recomputed per call.
    pub fn aggregate(&self) -> (u64, u64, u64, BTreeSet<PeerEndpoint>) {
        let mut files = 0u64;
        let mut fragments = 0u64;
        let mut bytes = 0u64;
        let mut endpoints = BTreeSet::new();
        for entry in self.files.iter() {
            files += 1;
            fragments += entry.fragments.len() as u64;
            bytes += entry.declared_size;
            for rec in entry.fragments.values() {
                endpoints.extend(rec.holders.iter().cloned());
            }
        }
        (files, fragments, bytes, endpoints)
    }
}
