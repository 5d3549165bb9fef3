//! Error types for the AVI demuxer

use crate::chunk::FourCC;
use std::io;
use thiserror::Error;

/// Result type for demuxer operations
pub type Result<T> = std::result::Result<T, DemuxError>;

#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("Not an AVI stream (form {form}, type {form_type})")]
    NotAnAviStream { form: FourCC, form_type: FourCC },
    #[error("Header list (hdrl) missing before movie data")]
    HeaderListMissing,
    #[error("Truncated stream: needed {needed} bytes, got {got}")]
    TruncatedStream { needed: usize, got: usize },
    #[error("Unsupported integer width: {0} bytes")]
    UnsupportedWidth(usize),
    #[error("Unrecognized chunk: {0}")]
    UnrecognizedChunk(FourCC),
    #[error("Header block out of bounds: {needed} bytes at offset {offset}, block is {len} bytes")]
    HeaderOutOfBounds {
        offset: usize,
        needed: usize,
        len: usize,
    },
    #[error("Stream format chunk at offset {offset} has no stream header")]
    OrphanStreamFormat { offset: usize },
    #[error("Cannot frame PCM with {channels} channels at {bits_per_sample} bits")]
    InvalidPcmFormat { channels: u16, bits_per_sample: u16 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DemuxError {
    /// End of data reached before a read could complete.
    pub fn is_truncation(&self) -> bool {
        matches!(self, DemuxError::TruncatedStream { .. })
    }
}
