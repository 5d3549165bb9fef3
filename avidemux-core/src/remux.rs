//! Remux collaborator boundary
//!
//! The demuxer writes two elementary streams into named pipes and a remuxer
//! combines them into the byte stream the consumer reads. The remuxer itself
//! lives outside this crate; it is reached through [`RemuxLauncher`].

use crate::config::DemuxConfig;
use crate::demux::Sink;
use crate::gate::SessionState;
use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

const MUX_OPTIONS: &str =
    "MUXOPT --no-pcr-on-video-pid --no-asyncio --new-audio-pes --vbr --vbv-len=500";
const DEFAULT_VIDEO_TYPE: &str = "V_MPEG-2";
const LPCM_AUDIO_TYPE: &str = "A_LPCM";
const AC3_AUDIO_TYPE: &str = "A_AC3";

/// A named, write-only destination handed to the demuxer
pub struct OutputPipe {
    location: String,
    writer: Sink,
}

impl OutputPipe {
    pub fn new(location: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Self {
            location: location.into(),
            writer: Box::new(writer),
        }
    }

    /// Where the remuxer should read this pipe from
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn into_writer(self) -> Sink {
        self.writer
    }
}

impl fmt::Debug for OutputPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPipe")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// What the remuxer is told about the two elementary streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemuxPlan {
    pub video_type: String,
    pub video_location: String,
    pub fps: Option<String>,
    pub audio_type: String,
    pub audio_location: String,
}

impl RemuxPlan {
    pub fn new(config: &DemuxConfig, video_location: &str, audio_location: &str) -> Self {
        let video_type = match (&config.force_type, config.no_video_encode) {
            (Some(forced), true) => forced.clone(),
            _ => DEFAULT_VIDEO_TYPE.to_string(),
        };
        let audio_type = if config.lossy_audio {
            AC3_AUDIO_TYPE
        } else {
            LPCM_AUDIO_TYPE
        };
        Self {
            video_type,
            video_location: video_location.to_string(),
            fps: config.force_fps.clone(),
            audio_type: audio_type.to_string(),
            audio_location: audio_location.to_string(),
        }
    }

    /// Meta description consumed by the remuxer, one line per entry
    pub fn meta_script(&self) -> String {
        let fps = self
            .fps
            .as_deref()
            .map(|fps| format!("fps={}, ", fps))
            .unwrap_or_default();
        format!(
            "{}\n{}, \"{}\", {}level=4.1, insertSEI, contSPS, track=1\n{}, \"{}\", track=2\n",
            MUX_OPTIONS,
            self.video_type,
            self.video_location,
            fps,
            self.audio_type,
            self.audio_location
        )
    }
}

/// One-shot handle for delivering the remuxer's combined output
pub struct DownstreamConnector {
    session: Arc<SessionState>,
}

impl DownstreamConnector {
    pub(crate) fn new(session: Arc<SessionState>) -> Self {
        Self { session }
    }

    /// Returns false if a downstream was already connected
    pub fn connect<R: Read + Send + 'static>(self, reader: R) -> bool {
        let connected = self.session.connect_downstream(Box::new(reader));
        if connected {
            debug!("Remux output connected");
        } else {
            warn!("Remux output already connected; ignoring second source");
        }
        connected
    }
}

impl fmt::Debug for DownstreamConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownstreamConnector")
            .field("connected", &self.session.is_connected())
            .finish()
    }
}

/// Starts the external remuxer for one session.
///
/// Runs on its own thread as soon as the stream is constructed, so it may
/// block for as long as the remuxer lives.
pub trait RemuxLauncher: Send + 'static {
    fn launch(self: Box<Self>, plan: RemuxPlan, connector: DownstreamConnector) -> io::Result<()>;
}

impl<F> RemuxLauncher for F
where
    F: FnOnce(RemuxPlan, DownstreamConnector) -> io::Result<()> + Send + 'static,
{
    fn launch(self: Box<Self>, plan: RemuxPlan, connector: DownstreamConnector) -> io::Result<()> {
        (*self)(plan, connector)
    }
}

/// Launch the remuxer on a named thread; failures are logged, not raised
pub(crate) fn spawn_launcher(
    launcher: Box<dyn RemuxLauncher>,
    plan: RemuxPlan,
    session: Arc<SessionState>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("avi-demux-remux".into())
        .spawn(move || {
            debug!(video = %plan.video_location, audio = %plan.audio_location, "Launching remuxer");
            if let Err(e) = launcher.launch(plan, DownstreamConnector::new(session)) {
                error!("Remuxer failed: {}", e);
            }
        })
}
