//! # Readiness Gate
//!
//! Consumer reads block here until the remuxer has connected its output
//! and the demuxer has pushed bytes down both tracks.
//!
//! ```text
//! ┌───────────┐ add_*_bytes ┌──────────────┐  wait   ┌──────────┐
//! │  Parser   │────────────►│ SessionState │◄────────│ Consumer │
//! │  Thread   │ set_status  │ (Condvar)    │         │ Thread   │
//! └───────────┘             └──────────────┘         └──────────┘
//!                                  ▲ connect
//!                           ┌──────┴─────┐
//!                           │   Remux    │
//!                           │   Thread   │
//!                           └────────────┘
//! ```
//!
//! The wait is bounded: by default 15 polls of 500 ms. Running out of
//! time reads as end of stream, never as a hang.

use crate::demux::DemuxSummary;
use crate::error::DemuxError;
use crate::track::TrackTable;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_attempts: 15,
        }
    }
}

impl GateConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest a single read waits for readiness
    pub fn deadline(&self) -> Duration {
        self.poll_interval() * self.max_attempts
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Where the background parse stands
#[derive(Debug, Clone)]
pub enum ParseStatus {
    /// No read issued yet
    Pending,
    Running,
    Completed(DemuxSummary),
    Failed(Arc<DemuxError>),
}

impl ParseStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ParseStatus::Completed(_) | ParseStatus::Failed(_))
    }
}

struct Shared {
    downstream: Option<Box<dyn Read + Send>>,
    connected: bool,
    status: ParseStatus,
    tracks: Option<Arc<TrackTable>>,
}

/// State shared by the parser, remux and consumer threads
pub struct SessionState {
    video_bytes: AtomicU64,
    audio_bytes: AtomicU64,
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            video_bytes: AtomicU64::new(0),
            audio_bytes: AtomicU64::new(0),
            shared: Mutex::new(Shared {
                downstream: None,
                connected: false,
                status: ParseStatus::Pending,
                tracks: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn video_bytes(&self) -> u64 {
        self.video_bytes.load(Ordering::SeqCst)
    }

    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes.load(Ordering::SeqCst)
    }

    pub fn add_video_bytes(&self, n: u64) {
        if n > 0 && self.video_bytes.fetch_add(n, Ordering::SeqCst) == 0 {
            trace!("First video bytes demuxed");
            self.notify();
        }
    }

    pub fn add_audio_bytes(&self, n: u64) {
        if n > 0 && self.audio_bytes.fetch_add(n, Ordering::SeqCst) == 0 {
            trace!("First audio bytes demuxed");
            self.notify();
        }
    }

    /// Hand over the remuxer's combined output. Only the first call wins.
    pub fn connect_downstream(&self, reader: Box<dyn Read + Send>) -> bool {
        let mut shared = self.shared.lock();
        if shared.connected {
            return false;
        }
        shared.downstream = Some(reader);
        shared.connected = true;
        self.changed.notify_all();
        true
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    pub(crate) fn take_downstream(&self) -> Option<Box<dyn Read + Send>> {
        self.shared.lock().downstream.take()
    }

    pub fn set_status(&self, status: ParseStatus) {
        let mut shared = self.shared.lock();
        shared.status = status;
        self.changed.notify_all();
    }

    pub fn status(&self) -> ParseStatus {
        self.shared.lock().status.clone()
    }

    pub fn publish_tracks(&self, tracks: Arc<TrackTable>) {
        self.shared.lock().tracks = Some(tracks);
    }

    pub fn tracks(&self) -> Option<Arc<TrackTable>> {
        self.shared.lock().tracks.clone()
    }

    fn both_tracks_flowing(&self) -> bool {
        self.video_bytes() > 0 && self.audio_bytes() > 0
    }

    fn notify(&self) {
        // Taking the lock orders this wakeup after any waiter's check
        let _shared = self.shared.lock();
        self.changed.notify_all();
    }
}

// ============================================================================
// Readiness Gate
// ============================================================================

/// Result of waiting at the gate
#[derive(Debug, Clone)]
pub enum Readiness {
    Ready,
    /// Deadline passed; read as end of stream
    TimedOut,
    /// Parse finished without data on both tracks; can never become ready
    Exhausted,
    /// Parse failed before both tracks flowed
    Failed(Arc<DemuxError>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadinessGate {
    config: GateConfig,
}

impl ReadinessGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> GateConfig {
        self.config
    }

    /// Block until the session is ready, it can no longer become ready, or
    /// the deadline passes.
    pub fn wait(&self, session: &SessionState) -> Readiness {
        let start = Instant::now();
        let deadline = start + self.config.deadline();
        let mut shared = session.shared.lock();

        loop {
            let flowing = session.both_tracks_flowing();
            if shared.connected && flowing {
                trace!(waited = ?start.elapsed(), "Gate open");
                return Readiness::Ready;
            }

            if !flowing {
                match &shared.status {
                    ParseStatus::Failed(e) => return Readiness::Failed(e.clone()),
                    ParseStatus::Completed(_) => return Readiness::Exhausted,
                    _ => {}
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(
                    connected = shared.connected,
                    video_bytes = session.video_bytes(),
                    audio_bytes = session.audio_bytes(),
                    "Gate timed out"
                );
                return Readiness::TimedOut;
            }

            let wake = (now + self.config.poll_interval()).min(deadline);
            session.changed.wait_until(&mut shared, wake);
        }
    }
}
