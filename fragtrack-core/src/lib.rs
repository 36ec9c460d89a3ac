#![forbid(unsafe_code)]

pub mod domain;
pub mod error;

pub mod hash;

pub mod index;
pub mod store;
pub mod upload;

// Re-exports: stable API surface
pub use domain::{FileDistribution, NetworkInfo, PeerEndpoint, UploadStatus};
pub use error::{Result, TrackError};
pub use hash::{HashProvider, sha256::Sha256Provider};
pub use index::FragmentDistributionIndex;
pub use store::FragmentStore;
pub use upload::UploadCoordinator;
