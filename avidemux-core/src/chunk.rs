// RIFF CHUNK READER - tags, lengths and raw bytes off a blocking source
//
// Sources are pipes and sockets as often as files, so nothing here seeks.
// Every read retries short reads until the byte count is met or the
// source reports end of data.

use crate::error::{DemuxError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::{self, ErrorKind, Read};

// ============================================================================
// FourCC
// ============================================================================

/// Four character code used for chunk ids, list types and stream tags
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn to_ascii_uppercase(self) -> Self {
        FourCC(self.0.map(|b| b.to_ascii_uppercase()))
    }

    /// ASCII case-insensitive comparison, the way AVI writers disagree on case
    pub fn matches(&self, other: FourCC) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Data chunk tag for a stream number, e.g. 0 -> "00db"
    pub fn stream_data(stream_number: u32) -> Self {
        let n = (stream_number % 100) as u8;
        FourCC([b'0' + n / 10, b'0' + n % 10, b'd', b'b'])
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC(\"{}\")", self)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Well-known RIFF/AVI tags
pub mod tags {
    use super::FourCC;

    pub const RIFF: FourCC = FourCC(*b"RIFF");
    pub const AVI: FourCC = FourCC(*b"AVI ");
    pub const LIST: FourCC = FourCC(*b"LIST");
    pub const JUNK: FourCC = FourCC(*b"JUNK");
    pub const HDRL: FourCC = FourCC(*b"hdrl");
    pub const MOVI: FourCC = FourCC(*b"movi");
    pub const STRH: FourCC = FourCC(*b"strh");
    pub const STRF: FourCC = FourCC(*b"strf");
    pub const VIDS: FourCC = FourCC(*b"vids");
    pub const AUDS: FourCC = FourCC(*b"auds");
    pub const IDX1: FourCC = FourCC(*b"idx1");
    // Misspelled index list seen in the wild
    pub const IDDX: FourCC = FourCC(*b"iddx");
}

// ============================================================================
// Chunk Header
// ============================================================================

/// Tag and declared payload length of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: FourCC,
    pub length: u32,
}

impl ChunkHeader {
    pub fn read<R: Read + ?Sized>(source: &mut R) -> Result<Self> {
        let tag = read_fourcc(source)?;
        let length = read_uint_le(source, 4)?;
        Ok(ChunkHeader { tag, length })
    }

    /// Payload length rounded up to the word boundary
    pub fn padded_length(&self) -> u64 {
        padded(self.length)
    }

    pub fn is_odd(&self) -> bool {
        self.length % 2 == 1
    }
}

/// RIFF chunks are word aligned: odd lengths carry one pad byte
pub fn padded(length: u32) -> u64 {
    (length as u64 + 1) & !1
}

// ============================================================================
// Stream Reads
// ============================================================================

/// Fill `buf` completely, retrying short reads.
pub fn read_exact_into<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(DemuxError::TruncatedStream {
                    needed: buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Read exactly `n` bytes.
pub fn read_exact<R: Read + ?Sized>(source: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    read_exact_into(source, &mut buf)?;
    Ok(buf)
}

/// Assemble an unsigned little-endian integer of 1 to 4 bytes.
pub fn read_uint_le<R: Read + ?Sized>(source: &mut R, n: usize) -> Result<u32> {
    if !(1..=4).contains(&n) {
        return Err(DemuxError::UnsupportedWidth(n));
    }
    let mut buf = [0u8; 4];
    read_exact_into(source, &mut buf[..n])?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_fourcc<R: Read + ?Sized>(source: &mut R) -> Result<FourCC> {
    let mut tag = [0u8; 4];
    read_exact_into(source, &mut tag)?;
    Ok(FourCC(tag))
}

/// Consume and discard `n` bytes.
pub fn skip<R: Read + ?Sized>(source: &mut R, n: u64) -> Result<()> {
    let skipped = io::copy(&mut source.take(n), &mut io::sink())?;
    if skipped < n {
        return Err(DemuxError::TruncatedStream {
            needed: n as usize,
            got: skipped as usize,
        });
    }
    Ok(())
}

// ============================================================================
// Buffered Little-Endian Helpers
// ============================================================================

fn window(data: &[u8], offset: usize, needed: usize) -> Result<&[u8]> {
    offset
        .checked_add(needed)
        .and_then(|end| data.get(offset..end))
        .ok_or(DemuxError::HeaderOutOfBounds {
            offset,
            needed,
            len: data.len(),
        })
}

pub fn decode_le16(data: &[u8], offset: usize) -> Result<u16> {
    let b = window(data, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub fn decode_le32(data: &[u8], offset: usize) -> Result<u32> {
    let b = window(data, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn decode_fourcc(data: &[u8], offset: usize) -> Result<FourCC> {
    let b = window(data, offset, 4)?;
    Ok(FourCC([b[0], b[1], b[2], b[3]]))
}

pub fn decode_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    window(data, offset, len)
}

pub fn encode_le16(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

pub fn encode_le32(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}
