//! # avidemux Core
//!
//! Streaming AVI (RIFF) demultiplexer. Splits the interleaved movie data of
//! an AVI byte stream into a video sink and an audio sink, while a remuxer
//! combines both into the stream the consumer reads.

// ============================================================================
// Container Parsing
// ============================================================================
pub mod chunk;
pub mod header;
pub mod track;

// ============================================================================
// Demultiplexing
// ============================================================================
pub mod demux;
pub mod pcm;

// ============================================================================
// Session
// ============================================================================
pub mod config;
pub mod gate;
pub mod remux;
pub mod stream;

pub mod error;

#[cfg(test)]
mod fixtures;

pub use chunk::FourCC;
pub use config::DemuxConfig;
pub use demux::{ChunkDemuxer, DemuxSummary, Sink};
pub use error::{DemuxError, Result};
pub use gate::{GateConfig, ParseStatus, Readiness, ReadinessGate, SessionState};
pub use header::HeaderParser;
pub use pcm::{PcmFormat, PcmFramingSink};
pub use remux::{DownstreamConnector, OutputPipe, RemuxLauncher, RemuxPlan};
pub use stream::AviDemuxStream;
pub use track::{TrackDescriptor, TrackKind, TrackTable, MAX_AUDIO_TRACKS};
