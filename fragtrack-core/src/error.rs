use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("unknown file: {0}")]
    UnknownFile(String),

    #[error("upload for file {0} was never initiated")]
    UnknownUpload(String),

    #[error("upload for file {0} already initiated")]
    DuplicateUpload(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("fragment {hash} already registered with length {existing}, got {given}")]
    HashConflict {
        hash: String,
        existing: u64,
        given: u64,
    },

    #[error("checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch { declared: String, computed: String },

    #[error("fragment store exhausted: {needed} bytes needed, {free} free")]
    StorageExhausted { needed: u64, free: u64 },

    #[error("transport interrupted: {0}")]
    TransportInterrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, TrackError>;
