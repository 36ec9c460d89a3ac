#![forbid(unsafe_code)]

pub mod proto;
pub mod tracker;
pub mod transfer;

pub use tracker::TrackerService;
pub use transfer::TransferService;
