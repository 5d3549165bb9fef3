// AVI CHUNK DEMULTIPLEXER - movie data into a video sink and an audio sink
//
// Runs over the `movi` payload left behind by the header parser. Wrapper
// chunks (LIST, RIFF, JUNK) are stepped over, video chunks are matched by
// the stream tag prefix, everything else belongs to audio.

use crate::chunk::{read_fourcc, read_uint_le, skip, FourCC};
use crate::error::{DemuxError, Result};
use crate::gate::SessionState;
use crate::track::TrackTable;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Write-only byte destination; dropping it closes the pipe
pub type Sink = Box<dyn Write + Send>;

const LIST: FourCC = FourCC(*b"LIST");
const RIFF: FourCC = FourCC(*b"RIFF");
const JUNK: FourCC = FourCC(*b"JUNK");
const IDX1: FourCC = FourCC(*b"IDX1");

/// Bytes of the nested form type skipped on a nested RIFF
const NESTED_FORM_TYPE: u32 = 4;

/// Leading bytes dropped from the first audio payload
const AUDIO_LEAD_IN: u64 = 4;

/// Totals for one demux pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DemuxSummary {
    pub video_bytes: u64,
    pub audio_bytes: u64,
    pub video_chunks: u64,
    pub audio_chunks: u64,
    pub index_chunks: u64,
}

pub struct ChunkDemuxer<R: Read> {
    source: R,
    video: Sink,
    audio: Sink,
    video_prefix: Option<[u8; 3]>,
    audio_channels: u32,
    audio_lead_in_pending: bool,
    session: Arc<SessionState>,
    summary: DemuxSummary,
}

fn is_wrapper(tag: FourCC) -> bool {
    tag == LIST || tag == RIFF || tag == JUNK
}

impl<R: Read> ChunkDemuxer<R> {
    pub fn new(source: R, tracks: &TrackTable, video: Sink, audio: Sink) -> Self {
        let video_prefix = tracks.video_tag.map(|tag| {
            let upper = tag.to_ascii_uppercase().0;
            [upper[0], upper[1], upper[2]]
        });
        Self {
            source,
            video,
            audio,
            video_prefix,
            audio_channels: tracks.audio_channel_count(),
            audio_lead_in_pending: true,
            session: Arc::new(SessionState::new()),
            summary: DemuxSummary::default(),
        }
    }

    /// Report byte counts into a shared session instead of a private one
    pub fn with_session(mut self, session: Arc<SessionState>) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Demux until the source ends. Both sinks are flushed and closed on
    /// every exit path.
    pub fn run(mut self) -> Result<DemuxSummary> {
        debug!(
            video_prefix = ?self.video_prefix.map(|p| String::from_utf8_lossy(&p).into_owned()),
            audio_channels = self.audio_channels,
            "Demuxing movie data"
        );
        let pumped = self.pump();

        let ChunkDemuxer {
            mut video,
            mut audio,
            summary,
            ..
        } = self;
        let flushed = audio.flush().and(video.flush());
        drop(audio);
        drop(video);
        trace!("Output pipes closed");

        pumped?;
        flushed?;
        info!(
            video_bytes = summary.video_bytes,
            audio_bytes = summary.audio_bytes,
            video_chunks = summary.video_chunks,
            audio_chunks = summary.audio_chunks,
            "Movie data demuxed"
        );
        Ok(summary)
    }

    fn pump(&mut self) -> Result<()> {
        loop {
            let Some(mut tag) = self.next_tag()? else {
                return Ok(());
            };
            let mut length = read_uint_le(&mut self.source, 4)?;

            while is_wrapper(tag) {
                // Oversized lengths wrap negative in 32-bit writers
                let skip_len = if tag == RIFF || length > i32::MAX as u32 {
                    NESTED_FORM_TYPE
                } else {
                    length
                };
                trace!(%tag, skip_len, "Stepping over wrapper");
                skip(&mut self.source, skip_len as u64)?;

                let Some(next) = self.next_tag()? else {
                    return Ok(());
                };
                tag = next;
                length = read_uint_le(&mut self.source, 4)?;
                if is_wrapper(tag) && skip_len % 2 == 1 {
                    skip(&mut self.source, 1)?;
                }
            }

            if self.is_video(tag) {
                forward(&mut self.source, &mut self.video, length as u64)?;
                self.summary.video_bytes += length as u64;
                self.summary.video_chunks += 1;
                self.session.add_video_bytes(length as u64);
            } else if tag == IDX1 {
                skip(&mut self.source, length as u64)?;
                self.summary.index_chunks += 1;
            } else if self.audio_channels > 0 {
                let written = self.forward_audio(length as u64)?;
                self.summary.audio_bytes += written;
                self.summary.audio_chunks += 1;
                self.session.add_audio_bytes(written);
            } else {
                return Err(DemuxError::UnrecognizedChunk(tag));
            }

            if length % 2 == 1 {
                match skip(&mut self.source, 1) {
                    Err(e) if e.is_truncation() => return Ok(()),
                    other => other?,
                }
            }
        }
    }

    /// Upper-cased tag of the next chunk, or None at end of data
    fn next_tag(&mut self) -> Result<Option<FourCC>> {
        match read_fourcc(&mut self.source) {
            Ok(tag) => Ok(Some(tag.to_ascii_uppercase())),
            Err(e) if e.is_truncation() => {
                trace!("End of movie data");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// "00DB", "00DC" for stream 0 and so on
    fn is_video(&self, tag: FourCC) -> bool {
        let Some(prefix) = self.video_prefix else {
            return false;
        };
        tag.0[..3] == prefix && matches!(tag.0[3], b'B' | b'C')
    }

    /// The first audio payload loses its first four bytes, once per session
    fn forward_audio(&mut self, length: u64) -> Result<u64> {
        if self.audio_lead_in_pending {
            self.audio_lead_in_pending = false;
            let lead_in = length.min(AUDIO_LEAD_IN);
            skip(&mut self.source, lead_in)?;
            let rest = length - lead_in;
            forward(&mut self.source, &mut self.audio, rest)?;
            return Ok(rest);
        }
        forward(&mut self.source, &mut self.audio, length)?;
        Ok(length)
    }
}

/// Copy exactly `n` bytes from source to sink
fn forward<R: Read + ?Sized>(source: &mut R, sink: &mut Sink, n: u64) -> Result<()> {
    let copied = io::copy(&mut source.take(n), sink)?;
    if copied < n {
        return Err(DemuxError::TruncatedStream {
            needed: n as usize,
            got: copied as usize,
        });
    }
    Ok(())
}
