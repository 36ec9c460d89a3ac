//! Pluggable content hashing.
//!
//! Fragment and file identifiers are lowercase hex digests. The digest
//! algorithm is a deployment choice; everything else treats hash values as
//! opaque normalized strings.

pub trait HashProvider: Send + Sync {
    /// Canonical algorithm name advertised in network info (e.g. "SHA-256").
    fn algorithm(&self) -> &'static str;

    /// One-shot digest of `data`, lowercase hex.
    fn compute(&self, data: &[u8]) -> String;

    /// Incremental calculator for whole-file digests spanning many fragments.
    fn begin(&self) -> Box<dyn IncrementalHash>;

    /// Whether `value` is a well-formed textual digest for this algorithm.
    fn validate(&self, value: &str) -> bool;

    /// Canonical form of a well-formed digest (case folding).
    fn normalize(&self, value: &str) -> String {
        value.to_ascii_lowercase()
    }
}

pub trait IncrementalHash: Send {
    fn update(&mut self, data: &[u8]);
    fn finish(self: Box<Self>) -> String;
}

pub mod sha256;
