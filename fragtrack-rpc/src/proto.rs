//! Transport-neutral operation contracts.
//!
//! One tagged request and one tagged response variant per RPC operation; any
//! framing that can carry these (and pair a request stream with a response
//! stream for downloads) can expose the services.

use serde::{Deserialize, Serialize};

use fragtrack_core::{FileDistribution, NetworkInfo, TrackError, UploadStatus};

/// Metadata accompanying one fragment upload. `endpoint` is the transfer
/// address the publishing peer serves the fragment from; source addresses of
/// upload connections are not reachable endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FragmentUploadInfo {
    pub file_hash: String,
    pub fragment_hash: String,
    pub length: u64,
    pub endpoint: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FragmentDownloadRequest {
    pub fragment_hash: String,
}

/// Per-item download outcome. An `Error` reply keeps the stream open; the
/// caller may retry later fragments independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentDownloadReply {
    Data {
        fragment_hash: String,
        #[serde(with = "serde_bytes_vec")]
        data: Vec<u8>,
    },
    Error {
        fragment_hash: String,
        error: WireError,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    GetNetworkInfo,
    GetUploadStatus {
        file_hash: String,
    },
    InitiateUpload {
        size: u64,
        file_hash: String,
        #[serde(default)]
        fragment_count: Option<u64>,
    },
    UploadFragment {
        info: FragmentUploadInfo,
        #[serde(with = "serde_bytes_vec")]
        data: Vec<u8>,
    },
    FinalizeUpload {
        file_hash: String,
    },
    AbortUpload {
        file_hash: String,
    },
    GetFileDistribution {
        file_hash: String,
    },
    DownloadFileFragment(FragmentDownloadRequest),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    NetworkInfo(NetworkInfo),
    UploadStatus { status: UploadStatus },
    Ok,
    FileDistribution(FileDistribution),
    Fragment(FragmentDownloadReply),
    Error(WireError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnknownFile,
    UnknownFragment,
    UnknownUpload,
    DuplicateUpload,
    InvalidArgument,
    HashConflict,
    ChecksumMismatch,
    StorageExhausted,
    TransportInterrupted,
    Internal,
}

/// Structured failure crossing the wire; `code` preserves the taxonomy,
/// `message` is human-readable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&TrackError> for WireError {
    fn from(err: &TrackError) -> Self {
        let code = match err {
            TrackError::UnknownFile(_) => ErrorCode::UnknownFile,
            TrackError::UnknownUpload(_) => ErrorCode::UnknownUpload,
            TrackError::DuplicateUpload(_) => ErrorCode::DuplicateUpload,
            TrackError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            TrackError::HashConflict { .. } => ErrorCode::HashConflict,
            TrackError::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
            TrackError::StorageExhausted { .. } => ErrorCode::StorageExhausted,
            TrackError::TransportInterrupted(_) => ErrorCode::TransportInterrupted,
            TrackError::Io(_) => ErrorCode::Internal,
        };
        WireError {
            code,
            message: err.to_string(),
        }
    }
}

impl From<TrackError> for WireError {
    fn from(err: TrackError) -> Self {
        WireError::from(&err)
    }
}

/// Compact byte payloads: hex in human-readable formats, raw otherwise.
mod serde_bytes_vec {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        if ser.is_human_readable() {
            ser.serialize_str(&hex::encode(bytes))
        } else {
            ser.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        if de.is_human_readable() {
            let s = String::deserialize(de)?;
            hex::decode(&s).map_err(D::Error::custom)
        } else {
            Vec::<u8>::deserialize(de)
        }
    }
}
