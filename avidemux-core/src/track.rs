//! Per-stream metadata discovered in the AVI header list

use crate::chunk::FourCC;
use bytes::Bytes;
use serde::Serialize;

/// Audio streams beyond this count are skipped
pub const MAX_AUDIO_TRACKS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Metadata for one elementary stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDescriptor {
    pub kind: TrackKind,
    /// Compressor code from the stream header (video only)
    pub codec_tag: Option<FourCC>,
    pub time_scale: u32,
    pub time_rate: u32,
    /// Bytes per sample unit; -1 for video
    pub sample_size: i32,
    /// BITMAPINFOHEADER / WAVEFORMAT block, verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    format_blob: Option<Bytes>,
    pub bits_per_sample: u16,
    pub channel_count: u16,
    pub sample_rate: u32,
}

impl TrackDescriptor {
    pub fn video(codec_tag: FourCC, time_scale: u32, time_rate: u32) -> Self {
        Self {
            kind: TrackKind::Video,
            codec_tag: Some(codec_tag),
            time_scale,
            time_rate,
            sample_size: -1,
            format_blob: None,
            bits_per_sample: 0,
            channel_count: 0,
            sample_rate: 0,
        }
    }

    pub fn audio(time_scale: u32, time_rate: u32, sample_size: i32) -> Self {
        Self {
            kind: TrackKind::Audio,
            codec_tag: None,
            time_scale,
            time_rate,
            sample_size,
            format_blob: None,
            bits_per_sample: 0,
            channel_count: 0,
            sample_rate: 0,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }

    pub fn format_blob(&self) -> Option<&[u8]> {
        self.format_blob.as_deref()
    }

    pub fn has_format(&self) -> bool {
        self.format_blob.is_some()
    }

    /// Attach the stream format block. Returns false if one was already bound.
    pub(crate) fn bind_format(&mut self, blob: Bytes) -> bool {
        if self.format_blob.is_some() {
            return false;
        }
        self.format_blob = Some(blob);
        true
    }

    /// Frames (or samples) per second: rate / scale
    pub fn units_per_second(&self) -> f64 {
        if self.time_scale > 0 {
            self.time_rate as f64 / self.time_scale as f64
        } else {
            0.0
        }
    }
}

/// Every track found in one header list, plus the video data tag
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackTable {
    pub video: Option<TrackDescriptor>,
    pub audio: Vec<TrackDescriptor>,
    /// Data chunk tag derived from the video stream number
    pub video_tag: Option<FourCC>,
    /// Video and audio streams counted so far
    pub stream_count: u32,
}

impl TrackTable {
    pub fn audio_channel_count(&self) -> u32 {
        self.audio.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_empty()
    }
}
