//! In-memory AVI construction for tests

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Chunk with header and pad byte
pub fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    out.extend_from_slice(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

pub fn list(list_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut payload = list_type.to_vec();
    payload.extend_from_slice(body);
    chunk(b"LIST", &payload)
}

fn stream_header(kind: &[u8; 4], handler: &[u8; 4], scale: u32, rate: u32, sample_size: u32) -> Vec<u8> {
    let mut strh = Vec::with_capacity(56);
    strh.extend_from_slice(kind);
    strh.extend_from_slice(handler);
    strh.extend_from_slice(&0u32.to_le_bytes()); // flags
    strh.extend_from_slice(&0u16.to_le_bytes()); // priority
    strh.extend_from_slice(&0u16.to_le_bytes()); // language
    strh.extend_from_slice(&0u32.to_le_bytes()); // initial frames
    strh.extend_from_slice(&scale.to_le_bytes());
    strh.extend_from_slice(&rate.to_le_bytes());
    strh.extend_from_slice(&0u32.to_le_bytes()); // start
    strh.extend_from_slice(&0u32.to_le_bytes()); // length
    strh.extend_from_slice(&0u32.to_le_bytes()); // suggested buffer
    strh.extend_from_slice(&0u32.to_le_bytes()); // quality
    strh.extend_from_slice(&sample_size.to_le_bytes());
    strh.extend_from_slice(&[0u8; 8]); // frame rect
    chunk(b"strh", &strh)
}

pub fn video_strh(codec: &[u8; 4], scale: u32, rate: u32) -> Vec<u8> {
    stream_header(b"vids", codec, scale, rate, 0)
}

pub fn audio_strh(scale: u32, rate: u32, sample_size: u32) -> Vec<u8> {
    stream_header(b"auds", &[0; 4], scale, rate, sample_size)
}

/// BITMAPINFOHEADER
pub fn bitmap_info(codec: &[u8; 4], width: i32, height: i32, bit_count: u16) -> Vec<u8> {
    let mut bih = Vec::with_capacity(40);
    bih.extend_from_slice(&40u32.to_le_bytes());
    bih.extend_from_slice(&width.to_le_bytes());
    bih.extend_from_slice(&height.to_le_bytes());
    bih.extend_from_slice(&1u16.to_le_bytes());
    bih.extend_from_slice(&bit_count.to_le_bytes());
    bih.extend_from_slice(codec);
    bih.extend_from_slice(&[0u8; 20]);
    bih
}

/// WAVEFORMATEX without extra data
pub fn wave_format(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Vec<u8> {
    // Wrapping, so malformed formats can be built too
    let block_align = channels.wrapping_mul(bits_per_sample.div_ceil(8));
    let mut wf = Vec::with_capacity(18);
    wf.extend_from_slice(&1u16.to_le_bytes());
    wf.extend_from_slice(&channels.to_le_bytes());
    wf.extend_from_slice(&sample_rate.to_le_bytes());
    wf.extend_from_slice(&sample_rate.wrapping_mul(block_align as u32).to_le_bytes());
    wf.extend_from_slice(&block_align.to_le_bytes());
    wf.extend_from_slice(&bits_per_sample.to_le_bytes());
    wf.extend_from_slice(&0u16.to_le_bytes());
    wf
}

/// Builds RIFF/AVI files stream by stream
#[derive(Default)]
pub struct AviBuilder {
    strls: Vec<Vec<u8>>,
    movi: Vec<u8>,
    trailer: Vec<u8>,
}

impl AviBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video_stream(mut self, codec: &[u8; 4], width: i32, height: i32) -> Self {
        let mut body = video_strh(codec, 1, 25);
        body.extend(chunk(b"strf", &bitmap_info(codec, width, height, 24)));
        self.strls.push(list(b"strl", &body));
        self
    }

    pub fn audio_stream(mut self, channels: u16, sample_rate: u32, bits: u16) -> Self {
        let block_align = (channels * bits.div_ceil(8)) as u32;
        let mut body = audio_strh(1, sample_rate, block_align);
        body.extend(chunk(b"strf", &wave_format(channels, sample_rate, bits)));
        self.strls.push(list(b"strl", &body));
        self
    }

    /// Raw strl body, for malformed header lists
    pub fn raw_strl(mut self, body: Vec<u8>) -> Self {
        self.strls.push(list(b"strl", &body));
        self
    }

    pub fn movi_chunk(mut self, tag: &[u8; 4], payload: &[u8]) -> Self {
        self.movi.extend(chunk(tag, payload));
        self
    }

    pub fn movi_raw(mut self, bytes: &[u8]) -> Self {
        self.movi.extend_from_slice(bytes);
        self
    }

    pub fn index(mut self, entries: usize) -> Self {
        self.trailer.extend(chunk(b"idx1", &vec![0u8; entries * 16]));
        self
    }

    pub fn header_list(&self) -> Vec<u8> {
        let mut hdrl = chunk(b"avih", &[0u8; 56]);
        for strl in &self.strls {
            hdrl.extend_from_slice(strl);
        }
        hdrl
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = b"AVI ".to_vec();
        body.extend(list(b"hdrl", &self.header_list()));
        body.extend(chunk(b"JUNK", &[0u8; 12]));
        body.extend(list(b"movi", &self.movi));
        body.extend_from_slice(&self.trailer);

        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend(body);
        out
    }
}

/// Cloneable sink that records writes and flushes
#[derive(Clone, Default)]
pub struct CaptureSink {
    data: Arc<Mutex<Vec<u8>>>,
    flushes: Arc<AtomicUsize>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// True once every other handle, the writer side included, is dropped
    pub fn is_closed(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }
}

impl Write for CaptureSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
