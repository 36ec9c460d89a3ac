//! UploadCoordinator: per-file publication lifecycle.
//!
//! `Initiated -> InProgress -> Complete`, with `Failed` reachable from the two
//! non-terminal states on explicit abort or a fatal conflict. Completion is
//! evaluated after every registration when the fragment count was declared up
//! front; without a declared count the upload stays `InProgress` until the
//! publisher sends an explicit finalize signal.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::domain::UploadStatus;
use crate::error::{Result, TrackError};

#[derive(Clone, Debug)]
struct UploadRecord {
    declared_fragments: Option<u64>,
    received: HashSet<String>,
    status: UploadStatus,
}

#[derive(Debug, Default)]
pub struct UploadCoordinator {
    uploads: DashMap<String, UploadRecord>,
}

impl UploadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an upload. Fails with `DuplicateUpload` while a
    /// non-failed record exists; a failed upload may be re-initiated.
    pub fn initiate(&self, file_hash: &str, declared_fragments: Option<u64>) -> Result<()> {
        if declared_fragments == Some(0) {
            return Err(TrackError::InvalidArgument(
                "declared fragment count cannot be zero".into(),
            ));
        }
        if let Some(existing) = self.uploads.get(file_hash) {
            if !existing.status.is_terminal() {
                return Err(TrackError::DuplicateUpload(file_hash.to_string()));
            }
        }
        self.uploads.insert(
            file_hash.to_string(),
            UploadRecord {
                declared_fragments,
                received: HashSet::new(),
                status: UploadStatus::Initiated,
            },
        );
        Ok(())
    }

    /// Whether `record_fragment` would accept this registration, without
    /// mutating anything. Lets callers validate before committing side
    /// effects elsewhere; only meaningful while the caller serializes
    /// mutations of this file.
    pub fn can_record(&self, file_hash: &str, fragment_hash: &str) -> Result<()> {
        let rec = self
            .uploads
            .get(file_hash)
            .ok_or_else(|| TrackError::UnknownUpload(file_hash.to_string()))?;
        Self::check_recordable(&rec, file_hash, fragment_hash)
    }

    /// Count one received fragment. Idempotent per hash. Returns the status
    /// after the transition check.
    pub fn record_fragment(&self, file_hash: &str, fragment_hash: &str) -> Result<UploadStatus> {
        let mut rec = self
            .uploads
            .get_mut(file_hash)
            .ok_or_else(|| TrackError::UnknownUpload(file_hash.to_string()))?;

        Self::check_recordable(&rec, file_hash, fragment_hash)?;
        if rec.status == UploadStatus::Complete {
            // extra holders of a known fragment; nothing to count
            return Ok(UploadStatus::Complete);
        }

        rec.received.insert(fragment_hash.to_string());
        rec.status = match rec.declared_fragments {
            Some(declared) if rec.received.len() as u64 == declared => UploadStatus::Complete,
            _ => UploadStatus::InProgress,
        };
        Ok(rec.status)
    }

    fn check_recordable(rec: &UploadRecord, file_hash: &str, fragment_hash: &str) -> Result<()> {
        match rec.status {
            UploadStatus::Failed => Err(TrackError::InvalidArgument(format!(
                "upload for file {file_hash} has failed; re-initiate first"
            ))),
            // a new hash on a complete (or fully counted) upload would exceed
            // the declared layout; known hashes just gain holders
            UploadStatus::Complete if !rec.received.contains(fragment_hash) => {
                Err(TrackError::InvalidArgument(format!(
                    "fragment {fragment_hash} exceeds the declared fragment count"
                )))
            }
            UploadStatus::Complete => Ok(()),
            UploadStatus::Initiated | UploadStatus::InProgress => {
                if let Some(declared) = rec.declared_fragments {
                    if rec.received.len() as u64 >= declared
                        && !rec.received.contains(fragment_hash)
                    {
                        return Err(TrackError::InvalidArgument(format!(
                            "fragment {fragment_hash} exceeds the declared fragment count"
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    pub fn status(&self, file_hash: &str) -> Result<UploadStatus> {
        self.uploads
            .get(file_hash)
            .map(|rec| rec.status)
            .ok_or_else(|| TrackError::UnknownFile(file_hash.to_string()))
    }

    /// Explicit abort (or fatal-conflict) transition. Idempotent on an
    /// already failed upload; a completed upload can no longer fail.
    pub fn abort(&self, file_hash: &str) -> Result<()> {
        let mut rec = self
            .uploads
            .get_mut(file_hash)
            .ok_or_else(|| TrackError::UnknownUpload(file_hash.to_string()))?;
        match rec.status {
            UploadStatus::Complete => Err(TrackError::InvalidArgument(format!(
                "upload for file {file_hash} already completed"
            ))),
            _ => {
                rec.status = UploadStatus::Failed;
                Ok(())
            }
        }
    }

    /// Explicit completion signal for uploads initiated without a declared
    /// fragment count: fixes the count at what has been received. Idempotent
    /// on a completed upload.
    pub fn finalize(&self, file_hash: &str) -> Result<UploadStatus> {
        let mut rec = self
            .uploads
            .get_mut(file_hash)
            .ok_or_else(|| TrackError::UnknownUpload(file_hash.to_string()))?;

        match rec.status {
            UploadStatus::Complete => Ok(UploadStatus::Complete),
            UploadStatus::Failed => Err(TrackError::InvalidArgument(format!(
                "upload for file {file_hash} has failed; re-initiate first"
            ))),
            _ => {
                let received = rec.received.len() as u64;
                if received == 0 {
                    return Err(TrackError::InvalidArgument(
                        "cannot finalize an upload with no fragments".into(),
                    ));
                }
                if let Some(declared) = rec.declared_fragments {
                    if received != declared {
                        return Err(TrackError::InvalidArgument(format!(
                            "finalize with {received} of {declared} declared fragments"
                        )));
                    }
                }
                rec.declared_fragments = Some(received);
                rec.status = UploadStatus::Complete;
                Ok(UploadStatus::Complete)
            }
        }
    }
}
