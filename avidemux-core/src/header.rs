// AVI HEADER PARSER
//
// Walks the RIFF envelope up to the start of movie data, buffers the
// header list and decodes its stream headers into track descriptors.
//
// RIFF 'AVI '
// ├── LIST 'hdrl'          buffered whole
// │   ├── avih
// │   └── LIST 'strl'      walked structurally, per stream
// │       ├── strh         -> track descriptor
// │       └── strf         -> format block of that track
// ├── JUNK / idx1 / ...    discarded
// └── LIST 'movi'          left unread for the demuxer

use crate::chunk::{
    decode_fourcc, decode_le16, decode_le32, decode_slice, padded, read_exact, read_fourcc,
    read_uint_le, skip, tags, ChunkHeader, FourCC,
};
use crate::config::DemuxConfig;
use crate::demux::Sink;
use crate::error::{DemuxError, Result};
use crate::pcm::{PcmFormat, PcmFramingSink};
use crate::track::{TrackDescriptor, TrackTable, MAX_AUDIO_TRACKS};
use bytes::Bytes;
use std::io::{self, Read};
use tracing::{debug, info, trace, warn};

// Offsets from the start of a chunk (tag at +0, size at +4, payload at +8)
const STRH_TYPE: usize = 8;
const STRH_HANDLER: usize = 12;
const STRH_SCALE: usize = 28;
const STRH_RATE: usize = 32;
const STRH_SAMPLE_SIZE: usize = 52;
const CHUNK_PAYLOAD: usize = 8;
const LIST_HEADER: usize = 12;

// Offsets inside a WAVEFORMAT block
const WF_CHANNELS: usize = 2;
const WF_SAMPLE_RATE: usize = 4;
const WF_BITS_PER_SAMPLE: usize = 14;

/// Track slot a stream format chunk binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackSlot {
    Video,
    Audio(usize),
}

/// Binding between a stream header and the format chunk after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Idle,
    AwaitingFormat(TrackSlot),
    /// Stream we do not carry (text, second video, audio overflow)
    Skipping,
}

pub struct HeaderParser<'c> {
    config: &'c DemuxConfig,
    pcm_framed: bool,
}

impl<'c> HeaderParser<'c> {
    pub fn new(config: &'c DemuxConfig) -> Self {
        Self {
            config,
            pcm_framed: false,
        }
    }

    /// Parse everything before movie data. On success the source sits on the
    /// first chunk inside `movi`, and `audio` may have been decorated.
    pub fn parse<R: Read + ?Sized>(&mut self, source: &mut R, audio: &mut Sink) -> Result<TrackTable> {
        trace!("Parsing AVI stream");
        read_envelope(source)?;
        let hdrl = locate_header_list(source)?;
        self.scan(&hdrl, audio)
    }

    /// Decode a buffered hdrl block
    pub fn scan(&mut self, block: &[u8], audio: &mut Sink) -> Result<TrackTable> {
        let mut table = TrackTable::default();
        let mut binding = Binding::Idle;
        let mut i = 0usize;

        while i + CHUNK_PAYLOAD <= block.len() {
            let tag = decode_fourcc(block, i)?;
            let size = decode_le32(block, i + 4)?;

            if tag.matches(tags::LIST) {
                i += LIST_HEADER;
                continue;
            }

            if tag.matches(tags::STRH) {
                binding = self.stream_header(block, i, &mut table)?;
            } else if tag.matches(tags::STRF) {
                match binding {
                    Binding::Idle => return Err(DemuxError::OrphanStreamFormat { offset: i }),
                    Binding::Skipping => trace!(offset = i, "Ignoring format of skipped stream"),
                    Binding::AwaitingFormat(slot) => {
                        let blob = decode_slice(block, i + CHUNK_PAYLOAD, size as usize)?;
                        self.bind_format(slot, Bytes::copy_from_slice(blob), &mut table, audio)?;
                    }
                }
                binding = Binding::Idle;
            }

            i = i
                .checked_add(CHUNK_PAYLOAD + padded(size) as usize)
                .ok_or(DemuxError::HeaderOutOfBounds {
                    offset: i,
                    needed: size as usize,
                    len: block.len(),
                })?;
        }

        if i < block.len() {
            trace!(trailing = block.len() - i, "Ignoring trailing header bytes");
        }

        info!(
            streams = table.stream_count,
            video_tag = ?table.video_tag,
            audio_channels = table.audio_channel_count(),
            "Found {} stream(s)",
            table.stream_count
        );
        Ok(table)
    }

    fn stream_header(&self, block: &[u8], i: usize, table: &mut TrackTable) -> Result<Binding> {
        let kind = decode_fourcc(block, i + STRH_TYPE)?;

        if kind.matches(tags::VIDS) {
            let codec = decode_fourcc(block, i + STRH_HANDLER)?;
            let scale = decode_le32(block, i + STRH_SCALE)?;
            let rate = decode_le32(block, i + STRH_RATE)?;
            let stream_number = table.stream_count;
            table.stream_count += 1;

            if table.video.is_some() {
                warn!(stream = stream_number, "Additional video stream ignored");
                return Ok(Binding::Skipping);
            }

            debug!(stream = stream_number, %codec, scale, rate, "Video stream");
            table.video = Some(TrackDescriptor::video(codec, scale, rate));
            table.video_tag = Some(FourCC::stream_data(stream_number));
            return Ok(Binding::AwaitingFormat(TrackSlot::Video));
        }

        if kind.matches(tags::AUDS) {
            let scale = decode_le32(block, i + STRH_SCALE)?;
            let rate = decode_le32(block, i + STRH_RATE)?;
            let sample_size = decode_le32(block, i + STRH_SAMPLE_SIZE)? as i32;
            let stream_number = table.stream_count;
            table.stream_count += 1;

            if table.audio.len() >= MAX_AUDIO_TRACKS {
                warn!(stream = stream_number, max = MAX_AUDIO_TRACKS, "Audio stream over limit ignored");
                return Ok(Binding::Skipping);
            }

            debug!(stream = stream_number, scale, rate, sample_size, "Audio stream");
            table.audio.push(TrackDescriptor::audio(scale, rate, sample_size));
            return Ok(Binding::AwaitingFormat(TrackSlot::Audio(table.audio.len() - 1)));
        }

        debug!(%kind, "Skipping unsupported stream type");
        Ok(Binding::Skipping)
    }

    fn bind_format(
        &mut self,
        slot: TrackSlot,
        blob: Bytes,
        table: &mut TrackTable,
        audio: &mut Sink,
    ) -> Result<()> {
        let track = match slot {
            TrackSlot::Video => table.video.as_mut(),
            TrackSlot::Audio(index) => table.audio.get_mut(index),
        };
        let Some(track) = track else {
            return Ok(());
        };

        if let TrackSlot::Audio(_) = slot {
            track.bits_per_sample = decode_le16(&blob, WF_BITS_PER_SAMPLE)?;
            track.channel_count = decode_le16(&blob, WF_CHANNELS)?;
            track.sample_rate = decode_le32(&blob, WF_SAMPLE_RATE)?;

            if self.config.frames_pcm() && !self.pcm_framed {
                let format = PcmFormat::new(track.channel_count, track.sample_rate, track.bits_per_sample)?;
                frame_pcm(audio, format)?;
                self.pcm_framed = true;
            }
        }

        if !track.bind_format(blob) {
            warn!(?slot, "Stream format already bound");
        }
        Ok(())
    }
}

/// Wrap the audio sink so raw samples go out as a WAVE stream
fn frame_pcm(audio: &mut Sink, format: PcmFormat) -> Result<()> {
    let inner = std::mem::replace(audio, Box::new(io::sink()));
    *audio = Box::new(PcmFramingSink::new(inner, format)?);
    debug!(?format, "Audio sink framed as LPCM");
    Ok(())
}

fn read_envelope<R: Read + ?Sized>(source: &mut R) -> Result<()> {
    let form = read_fourcc(source)?;
    read_uint_le(source, 4)?;
    let form_type = read_fourcc(source)?;

    if !form.matches(tags::RIFF) || !form_type.matches(tags::AVI) {
        return Err(DemuxError::NotAnAviStream { form, form_type });
    }
    Ok(())
}

/// Consume top-level chunks until `movi`, returning the hdrl payload
fn locate_header_list<R: Read + ?Sized>(source: &mut R) -> Result<Vec<u8>> {
    let mut hdrl = None;

    loop {
        let header = match ChunkHeader::read(source) {
            Ok(header) => header,
            Err(e) if e.is_truncation() && hdrl.is_none() => return Err(DemuxError::HeaderListMissing),
            Err(e) => return Err(e),
        };
        let length = header.padded_length();

        if !header.tag.matches(tags::LIST) {
            trace!(tag = %header.tag, length, "Skipping chunk");
            skip(source, length)?;
            continue;
        }

        let list_type = read_fourcc(source)?;
        let length = length.saturating_sub(4);

        if list_type.matches(tags::MOVI) {
            debug!("Movie data found");
            break;
        }

        if list_type.matches(tags::HDRL) {
            hdrl = Some(read_exact(source, length as usize)?);
        } else if list_type.matches(tags::IDX1) || list_type.matches(tags::IDDX) {
            skip(source, length)?;
        } else {
            // Other lists are entered; their children get skipped one by one
            trace!(%list_type, "Entering list");
        }
    }

    hdrl.ok_or(DemuxError::HeaderListMissing)
}
