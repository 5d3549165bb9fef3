//! Public blocking stream over a demux session
//!
//! Construction starts the remuxer right away. The header parser and chunk
//! demultiplexer share one background thread that starts on the first read.
//! Reads then wait at the readiness gate and pass through to whatever the
//! remuxer connected.
//!
//! Reading takes `&mut self`: a stream has exactly one consumer.

use crate::config::DemuxConfig;
use crate::demux::{ChunkDemuxer, DemuxSummary, Sink};
use crate::error::Result;
use crate::gate::{ParseStatus, Readiness, ReadinessGate, SessionState};
use crate::header::HeaderParser;
use crate::remux::{spawn_launcher, OutputPipe, RemuxLauncher, RemuxPlan};
use crate::track::TrackTable;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, trace};

/// Everything the parser thread takes ownership of
struct ParseJob {
    source: Box<dyn Read + Send>,
    video: Sink,
    audio: Sink,
    config: DemuxConfig,
}

/// Blocking byte stream over the remuxed output of one AVI source.
///
/// The parser and remux threads are detached. Dropping the stream does not
/// wait for them: the parser ends with its source, the remuxer with whatever
/// it launched. Sinks never handed to the parser close on drop.
pub struct AviDemuxStream {
    session: Arc<SessionState>,
    gate: ReadinessGate,
    job: Option<ParseJob>,
    downstream: Option<Box<dyn Read + Send>>,
    bytes_read: u64,
}

impl AviDemuxStream {
    pub fn new<R, L>(
        source: R,
        video: OutputPipe,
        audio: OutputPipe,
        config: DemuxConfig,
        launcher: L,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        L: RemuxLauncher,
    {
        let session = Arc::new(SessionState::new());
        let plan = RemuxPlan::new(&config, video.location(), audio.location());
        spawn_launcher(Box::new(launcher), plan, session.clone())?;
        trace!("Ready to mux");

        Ok(Self {
            session,
            gate: ReadinessGate::new(config.readiness),
            job: Some(ParseJob {
                source: Box::new(source),
                video: video.into_writer(),
                audio: audio.into_writer(),
                config,
            }),
            downstream: None,
            bytes_read: 0,
        })
    }

    /// Tracks found in the header list, once it has been parsed
    pub fn tracks(&self) -> Option<Arc<TrackTable>> {
        self.session.tracks()
    }

    pub fn status(&self) -> ParseStatus {
        self.session.status()
    }

    /// Bytes handed to the consumer so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Single-byte read; `None` at end of stream
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8];
        loop {
            match self.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn start_parser(&mut self) -> io::Result<()> {
        let Some(job) = self.job.take() else {
            return Ok(());
        };
        self.session.set_status(ParseStatus::Running);
        let session = self.session.clone();
        thread::Builder::new()
            .name("avi-demux-parser".into())
            .spawn(move || run_session(job, session))?;
        Ok(())
    }

    /// Wait at the gate until the remuxer's output can be read
    fn downstream(&mut self) -> io::Result<Option<&mut Box<dyn Read + Send>>> {
        if self.downstream.is_none() {
            match self.gate.wait(&self.session) {
                Readiness::Ready => self.downstream = self.session.take_downstream(),
                Readiness::TimedOut | Readiness::Exhausted => return Ok(None),
                Readiness::Failed(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            }
        }
        Ok(self.downstream.as_mut())
    }
}

impl Read for AviDemuxStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.start_parser()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let Some(downstream) = self.downstream()? else {
            return Ok(0);
        };
        let n = downstream.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl fmt::Debug for AviDemuxStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AviDemuxStream")
            .field("status", &self.session.status())
            .field("parser_started", &self.job.is_none())
            .field("connected", &self.session.is_connected())
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

/// Parser thread body; the outcome lands in the session
fn run_session(job: ParseJob, session: Arc<SessionState>) {
    match demux_session(job, &session) {
        Ok(summary) => session.set_status(ParseStatus::Completed(summary)),
        Err(e) => {
            error!("Parsing error: {}", e);
            session.set_status(ParseStatus::Failed(Arc::new(e)));
        }
    }
}

/// Both sinks are closed when this returns, on failure too, so the remuxer
/// sees end of input instead of waiting on an open pipe.
fn demux_session(job: ParseJob, session: &Arc<SessionState>) -> Result<DemuxSummary> {
    let ParseJob {
        mut source,
        video,
        mut audio,
        config,
    } = job;

    let tracks = HeaderParser::new(&config).parse(&mut source, &mut audio)?;
    session.publish_tracks(Arc::new(tracks.clone()));
    debug!(tracks = tracks.stream_count, "Header parsed");

    ChunkDemuxer::new(source, &tracks, video, audio)
        .with_session(session.clone())
        .run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DemuxError;
    use crate::fixtures::{audio_strh, chunk, wave_format, AviBuilder, CaptureSink};
    use crate::gate::GateConfig;
    use crate::remux::DownstreamConnector;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn quick_config() -> DemuxConfig {
        DemuxConfig {
            readiness: GateConfig {
                poll_interval_ms: 10,
                max_attempts: 2,
            },
            ..Default::default()
        }
    }

    fn av_file() -> Vec<u8> {
        AviBuilder::new()
            .video_stream(b"XVID", 16, 16)
            .audio_stream(2, 48_000, 16)
            .movi_chunk(b"00dc", &[1; 32])
            .movi_chunk(b"01wb", &[2; 16])
            .movi_chunk(b"00dc", &[3; 32])
            .index(3)
            .build()
    }

    fn pipes() -> (OutputPipe, OutputPipe, CaptureSink, CaptureSink) {
        let video = CaptureSink::new();
        let audio = CaptureSink::new();
        (
            OutputPipe::new("video.pipe", video.clone()),
            OutputPipe::new("audio.pipe", audio.clone()),
            video,
            audio,
        )
    }

    fn no_remuxer(_: RemuxPlan, _: DownstreamConnector) -> io::Result<()> {
        Ok(())
    }

    #[test]
    fn test_end_to_end() {
        let (video_pipe, audio_pipe, video, audio) = pipes();
        let config = DemuxConfig {
            readiness: GateConfig {
                poll_interval_ms: 20,
                max_attempts: 250,
            },
            ..Default::default()
        };
        let launcher = |plan: RemuxPlan, connector: DownstreamConnector| -> io::Result<()> {
            assert!(plan.meta_script().contains("\"video.pipe\""));
            connector.connect(Cursor::new(b"muxed transport stream".to_vec()));
            Ok(())
        };
        let mut stream =
            AviDemuxStream::new(Cursor::new(av_file()), video_pipe, audio_pipe, config, launcher).unwrap();

        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "muxed transport stream");
        assert_eq!(stream.bytes_read(), out.len() as u64);

        let tracks = stream.tracks().unwrap();
        assert!(tracks.video.is_some());
        assert_eq!(tracks.audio_channel_count(), 1);

        // Both counters were non-zero before the gate opened
        assert!(video.len() > 0);
        assert!(audio.len() > 0);
    }

    #[test]
    fn test_read_times_out_without_remuxer() {
        let (video_pipe, audio_pipe, _, _) = pipes();
        let mut stream =
            AviDemuxStream::new(Cursor::new(av_file()), video_pipe, audio_pipe, quick_config(), no_remuxer)
                .unwrap();

        let started = Instant::now();
        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(stream.bytes_read(), 0);
    }

    #[test]
    fn test_not_an_avi_is_reported() {
        let (video_pipe, audio_pipe, video, audio) = pipes();
        let config = DemuxConfig {
            readiness: GateConfig {
                poll_interval_ms: 20,
                max_attempts: 250,
            },
            ..Default::default()
        };
        let mut stream = AviDemuxStream::new(
            Cursor::new(b"RIFF\x04\x00\x00\x00WAVE".to_vec()),
            video_pipe,
            audio_pipe,
            config,
            no_remuxer,
        )
        .unwrap();

        let err = stream.read_byte().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(stream.status(), ParseStatus::Failed(_)));
        assert_eq!(video.len(), 0);
        assert_eq!(audio.len(), 0);
        // Closed without a write, so the remuxer reads end of input
        assert!(video.is_closed());
        assert!(audio.is_closed());
    }

    #[test]
    fn test_unframeable_lossless_audio_fails_parse() {
        let (video_pipe, audio_pipe, _, audio) = pipes();
        let mut strl = audio_strh(1, 48_000, 4);
        strl.extend(chunk(b"strf", &wave_format(40_000, 48_000, 16)));
        let data = AviBuilder::new()
            .video_stream(b"XVID", 8, 8)
            .raw_strl(strl)
            .movi_chunk(b"00dc", &[1; 4])
            .build();
        let config = DemuxConfig {
            lossless_audio: true,
            readiness: GateConfig {
                poll_interval_ms: 20,
                max_attempts: 250,
            },
            ..Default::default()
        };
        let mut stream = AviDemuxStream::new(Cursor::new(data), video_pipe, audio_pipe, config, no_remuxer).unwrap();

        let err = stream.read_byte().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        match stream.status() {
            ParseStatus::Failed(e) => assert!(matches!(*e, DemuxError::InvalidPcmFormat { .. })),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(audio.len(), 0);
    }

    #[test]
    fn test_drop_detaches_threads() {
        let (video_pipe, audio_pipe, video, audio) = pipes();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let launcher = move |_: RemuxPlan, _: DownstreamConnector| -> io::Result<()> {
            thread::sleep(Duration::from_millis(50));
            let _ = done_tx.send(());
            Ok(())
        };
        let stream =
            AviDemuxStream::new(Cursor::new(av_file()), video_pipe, audio_pipe, quick_config(), launcher).unwrap();
        drop(stream);

        // Parser never started: its sinks went with the stream
        assert!(video.is_closed());
        assert!(audio.is_closed());
        // The remuxer keeps running on its own
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_parser_starts_on_first_read() {
        let (video_pipe, audio_pipe, video, _) = pipes();
        let mut stream =
            AviDemuxStream::new(Cursor::new(av_file()), video_pipe, audio_pipe, quick_config(), no_remuxer)
                .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(matches!(stream.status(), ParseStatus::Pending));
        assert!(stream.tracks().is_none());
        assert_eq!(video.len(), 0);

        let _ = stream.read_byte().unwrap();
        assert!(!matches!(stream.status(), ParseStatus::Pending));
    }

    #[test]
    fn test_video_only_file_is_exhausted() {
        let (video_pipe, audio_pipe, _, _) = pipes();
        let data = AviBuilder::new()
            .video_stream(b"MJPG", 8, 8)
            .movi_chunk(b"00dc", &[0xAB; 16])
            .index(1)
            .build();
        let config = DemuxConfig {
            readiness: GateConfig {
                poll_interval_ms: 20,
                max_attempts: 250,
            },
            ..Default::default()
        };
        let mut stream = AviDemuxStream::new(Cursor::new(data), video_pipe, audio_pipe, config, no_remuxer).unwrap();

        assert_eq!(stream.read_byte().unwrap(), None);
        match stream.status() {
            ParseStatus::Completed(summary) => assert_eq!(summary.video_bytes, 16),
            other => panic!("unexpected {:?}", other),
        }
    }
}
