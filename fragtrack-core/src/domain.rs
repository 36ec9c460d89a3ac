use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Opaque reachable peer address (host:port or equivalent). The tracker never
/// dials it; it only hands it back to downloaders.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerEndpoint(pub String);

impl PeerEndpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Initiated,
    InProgress,
    Complete,
    /// Terminal; never transitions away.
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Failed)
    }
}

/// Result of a distribution query: reconstruction order plus holder sets.
/// A snapshot, stale the instant after it is returned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileDistribution {
    pub fragment_order: Vec<String>,
    pub distribution: HashMap<String, BTreeSet<PeerEndpoint>>,
}

/// Derived network snapshot; recomputed per query, never stored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub hash_algorithm: String,
    pub endpoints: BTreeSet<PeerEndpoint>,
    pub files: u64,
    pub fragments: u64,
    pub declared_bytes: u64,
}
