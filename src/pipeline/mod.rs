//! The two pipeline stages and their shared key-derivation logic.

pub mod audio;
pub mod download;
pub mod keys;

pub use audio::{AudioExtractionStage, AudioRequest};
pub use download::{DownloadRequest, DownloadStage};
