//! Tracker: the coordination service peers talk to.
//!
//! Owns the distribution index, the upload coordinator and this node's
//! fragment store. One fragment registration is made visible in index and
//! coordinator atomically by serializing all mutations of a file behind a
//! per-file lock; queries bypass the locks and read point-in-time snapshots.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use fragtrack_core::{
    FileDistribution, FragmentDistributionIndex, FragmentStore, HashProvider, NetworkInfo,
    PeerEndpoint, Result, Sha256Provider, TrackError, UploadCoordinator, UploadStatus,
};

use crate::proto::FragmentUploadInfo;

pub struct TrackerService {
    hasher: Arc<dyn HashProvider>,
    index: FragmentDistributionIndex,
    uploads: UploadCoordinator,
    store: Arc<FragmentStore>,
    // serializes mutations per file; entries are never removed (file records
    // live for the process lifetime anyway)
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Default for TrackerService {
    fn default() -> Self {
        Self::new(Arc::new(Sha256Provider), Arc::new(FragmentStore::default()))
    }
}

impl TrackerService {
    pub fn new(hasher: Arc<dyn HashProvider>, store: Arc<FragmentStore>) -> Self {
        Self {
            hasher,
            index: FragmentDistributionIndex::new(),
            uploads: UploadCoordinator::new(),
            store,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> Arc<FragmentStore> {
        Arc::clone(&self.store)
    }

    pub fn hasher(&self) -> Arc<dyn HashProvider> {
        Arc::clone(&self.hasher)
    }

    /// Derived snapshot; side-effect-free.
    pub fn network_info(&self) -> NetworkInfo {
        let (files, fragments, declared_bytes, endpoints) = self.index.aggregate();
        NetworkInfo {
            hash_algorithm: self.hasher.algorithm().to_string(),
            endpoints,
            files,
            fragments,
            declared_bytes,
        }
    }

    pub fn upload_status(&self, file_hash: &str) -> Result<UploadStatus> {
        let file_hash = self.checked_hash(file_hash, "file")?;
        self.uploads.status(&file_hash)
    }

    /// Thin wrapper the transfer service delegates to.
    pub fn file_distribution(&self, file_hash: &str) -> Result<FileDistribution> {
        let file_hash = self.checked_hash(file_hash, "file")?;
        self.index.distribution(&file_hash)
    }

    pub async fn initiate_upload(
        &self,
        size: u64,
        file_hash: &str,
        fragment_count: Option<u64>,
    ) -> Result<()> {
        if size == 0 {
            return Err(TrackError::InvalidArgument("file size cannot be zero".into()));
        }
        let file_hash = self.checked_hash(file_hash, "file")?;

        let lock = self.file_lock(&file_hash);
        let _guard = lock.lock().await;

        self.uploads.initiate(&file_hash, fragment_count)?;
        // re-initiation after a failed upload starts the layout over
        self.index.create_file(&file_hash, size);

        info!(file = %file_hash, size, ?fragment_count, "upload initiated");
        Ok(())
    }

    /// Validate and register one fragment: bytes into the store, then
    /// coordinator and index under the file lock. A hash conflict is fatal
    /// for the upload.
    pub async fn upload_fragment(
        &self,
        info: &FragmentUploadInfo,
        data: &[u8],
    ) -> Result<UploadStatus> {
        let file_hash = self.checked_hash(&info.file_hash, "file")?;
        let fragment_hash = self.checked_hash(&info.fragment_hash, "fragment")?;

        if data.is_empty() {
            return Err(TrackError::InvalidArgument("empty fragment".into()));
        }
        if data.len() as u64 != info.length {
            return Err(TrackError::InvalidArgument(format!(
                "fragment length mismatch: declared {}, got {}",
                info.length,
                data.len()
            )));
        }
        let computed = self.hasher.compute(data);
        if computed != fragment_hash {
            return Err(TrackError::ChecksumMismatch {
                declared: fragment_hash,
                computed,
            });
        }

        let lock = self.file_lock(&file_hash);
        let _guard = lock.lock().await;

        // Validate against the coordinator before committing anything: a
        // registration it would reject must not consume store capacity or
        // leak into the index.
        self.uploads.can_record(&file_hash, &fragment_hash)?;
        self.store.put(&fragment_hash, data.to_vec())?;

        // Index before coordinator: a status query may lag behind the index,
        // but Complete must never be observable while the final fragment has
        // no registered endpoint.
        if let Err(err) = self.index.register_fragment(
            &file_hash,
            &fragment_hash,
            info.length,
            PeerEndpoint::new(info.endpoint.clone()),
        ) {
            // same hash, different declared length: the first record (and its
            // stored bytes) stay, but the upload is dead
            warn!(file = %file_hash, fragment = %fragment_hash, %err, "fatal conflict, failing upload");
            self.uploads.abort(&file_hash)?;
            return Err(err);
        }
        let status = self.uploads.record_fragment(&file_hash, &fragment_hash)?;

        debug!(file = %file_hash, fragment = %fragment_hash, ?status, "fragment registered");
        Ok(status)
    }

    /// Explicit completion signal for uploads without a declared fragment
    /// count.
    pub async fn finalize_upload(&self, file_hash: &str) -> Result<UploadStatus> {
        let file_hash = self.checked_hash(file_hash, "file")?;
        let lock = self.file_lock(&file_hash);
        let _guard = lock.lock().await;
        let status = self.uploads.finalize(&file_hash)?;
        info!(file = %file_hash, "upload finalized");
        Ok(status)
    }

    pub async fn abort_upload(&self, file_hash: &str) -> Result<()> {
        let file_hash = self.checked_hash(file_hash, "file")?;
        let lock = self.file_lock(&file_hash);
        let _guard = lock.lock().await;
        self.uploads.abort(&file_hash)?;
        info!(file = %file_hash, "upload aborted");
        Ok(())
    }

    /// Client-streaming upload of all fragments of one file, in file order.
    /// The whole-file digest is verified when the stream ends; the stream
    /// ending is also the finalize signal for uploads without a declared
    /// fragment count. Any failure aborts the upload.
    pub async fn upload_fragments<S>(&self, mut items: S) -> Result<FileDistribution>
    where
        S: Stream<Item = (FragmentUploadInfo, Vec<u8>)> + Send + Unpin,
    {
        let Some((info, data)) = items.next().await else {
            return Err(TrackError::InvalidArgument("no fragment was transmitted".into()));
        };
        let file_hash = self.checked_hash(&info.file_hash, "file")?;

        let mut whole = self.hasher.begin();
        let mut next = Some((info, data));
        while let Some((info, data)) = next.take() {
            if self.hasher.normalize(&info.file_hash) != file_hash {
                return self.fail_with(
                    &file_hash,
                    TrackError::InvalidArgument(
                        "fragment packets name inconsistent file hashes".into(),
                    ),
                );
            }
            whole.update(&data);
            if let Err(err) = self.upload_fragment(&info, &data).await {
                return self.fail_with(&file_hash, err);
            }
            next = items.next().await;
        }

        let computed = whole.finish();
        if computed != file_hash {
            return self.fail_with(
                &file_hash,
                TrackError::ChecksumMismatch {
                    declared: file_hash.clone(),
                    computed,
                },
            );
        }

        if self.uploads.status(&file_hash)? != UploadStatus::Complete {
            if let Err(err) = self.finalize_upload(&file_hash).await {
                return self.fail_with(&file_hash, err);
            }
        }

        info!(file = %file_hash, "fragment stream complete");
        self.index.distribution(&file_hash)
    }

    fn fail_with<T>(&self, file_hash: &str, err: TrackError) -> Result<T> {
        warn!(file = %file_hash, %err, "upload stream failed");
        let _ = self.uploads.abort(file_hash);
        Err(err)
    }

    fn file_lock(&self, file_hash: &str) -> Arc<Mutex<()>> {
        self.locks.entry(file_hash.to_string()).or_default().clone()
    }

    fn checked_hash(&self, value: &str, what: &str) -> Result<String> {
        if !self.hasher.validate(value) {
            return Err(TrackError::InvalidArgument(format!(
                "invalid {what} hash format: {value:?}"
            )));
        }
        Ok(self.hasher.normalize(value))
    }
}
