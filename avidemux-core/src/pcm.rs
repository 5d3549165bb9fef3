//! PCM framing for lossless audio output
//!
//! The remuxer expects LPCM audio as a WAVE stream. Raw samples leaving the
//! AVI are little-endian already, so framing is just a header up front.

use crate::chunk::{encode_le16, encode_le32};
use crate::error::{DemuxError, Result};
use std::io::{self, Write};
use tracing::debug;

/// Length fields of a stream whose size is not known up front
pub const STREAMING_LENGTH: u32 = 0xFFFF_FFFF;

/// Sample rate used when the format block does not carry one
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

const WAVE_FORMAT_PCM: u16 = 0x0001;

pub const HEADER_LEN: usize = 44;

/// Shape of the raw samples being framed.
///
/// Values come from the file, so every derived header field is checked to
/// fit its WAVE field width at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    block_align: u16,
    byte_rate: u32,
}

impl PcmFormat {
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Result<Self> {
        let invalid = || DemuxError::InvalidPcmFormat {
            channels,
            bits_per_sample,
        };
        if channels == 0 || bits_per_sample == 0 || bits_per_sample > 32 {
            return Err(invalid());
        }
        let sample_rate = if sample_rate == 0 {
            DEFAULT_SAMPLE_RATE
        } else {
            sample_rate
        };
        let block_align = channels
            .checked_mul(bits_per_sample.div_ceil(8))
            .ok_or_else(invalid)?;
        let byte_rate = sample_rate
            .checked_mul(block_align as u32)
            .ok_or_else(invalid)?;
        Ok(Self {
            channels,
            sample_rate,
            bits_per_sample,
            block_align,
            byte_rate,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    /// Bytes holding one sample (20-bit audio sits in 3 bytes)
    pub fn container_bytes(&self) -> u16 {
        self.bits_per_sample.div_ceil(8)
    }

    pub fn block_align(&self) -> u16 {
        self.block_align
    }

    pub fn byte_rate(&self) -> u32 {
        self.byte_rate
    }

    /// Canonical RIFF/WAVE header with streaming length placeholders
    pub fn header(&self) -> [u8; HEADER_LEN] {
        let mut h = [0u8; HEADER_LEN];
        h[0..4].copy_from_slice(b"RIFF");
        h[4..8].copy_from_slice(&encode_le32(STREAMING_LENGTH));
        h[8..12].copy_from_slice(b"WAVE");
        h[12..16].copy_from_slice(b"fmt ");
        h[16..20].copy_from_slice(&encode_le32(16));
        h[20..22].copy_from_slice(&encode_le16(WAVE_FORMAT_PCM));
        h[22..24].copy_from_slice(&encode_le16(self.channels));
        h[24..28].copy_from_slice(&encode_le32(self.sample_rate));
        h[28..32].copy_from_slice(&encode_le32(self.byte_rate));
        h[32..34].copy_from_slice(&encode_le16(self.block_align));
        h[34..36].copy_from_slice(&encode_le16(self.bits_per_sample));
        h[36..40].copy_from_slice(b"data");
        h[40..44].copy_from_slice(&encode_le32(STREAMING_LENGTH));
        h
    }
}

/// Writes a WAVE header, then forwards samples untouched
pub struct PcmFramingSink<W: Write> {
    inner: W,
    format: PcmFormat,
    samples_written: u64,
}

impl<W: Write> PcmFramingSink<W> {
    pub fn new(mut inner: W, format: PcmFormat) -> Result<Self> {
        inner.write_all(&format.header())?;
        debug!(
            channels = format.channels,
            sample_rate = format.sample_rate,
            bits = format.bits_per_sample,
            "PCM framing header written"
        );
        Ok(Self {
            inner,
            format,
            samples_written: 0,
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Sample bytes forwarded so far, header excluded
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for PcmFramingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.samples_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
