//! Demuxer configuration, resolved once per session

use crate::gate::GateConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxConfig {
    /// Video is passed through instead of re-encoded
    pub no_video_encode: bool,
    /// Declared video type when passing video through, e.g. "V_MPEG4/ISO/AVC"
    pub force_type: Option<String>,
    pub force_fps: Option<String>,
    /// Audio is re-encoded to AC3
    pub lossy_audio: bool,
    /// Audio is framed as LPCM before reaching the remuxer
    pub lossless_audio: bool,
    pub readiness: GateConfig,
}

impl DemuxConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Whether the audio sink gets the PCM framing decorator
    pub fn frames_pcm(&self) -> bool {
        self.lossless_audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = DemuxConfig::default();
        assert!(!config.frames_pcm());
        assert_eq!(config.readiness.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.readiness.max_attempts, 15);
    }

    #[test]
    fn test_from_json_partial() {
        let config = DemuxConfig::from_json(
            r#"{
                "no_video_encode": true,
                "force_type": "V_MPEG4/ISO/AVC",
                "lossless_audio": true,
                "readiness": { "poll_interval_ms": 10, "max_attempts": 2 }
            }"#,
        )
        .unwrap();
        assert!(config.no_video_encode);
        assert_eq!(config.force_type.as_deref(), Some("V_MPEG4/ISO/AVC"));
        assert!(config.frames_pcm());
        assert!(!config.lossy_audio);
        assert_eq!(config.readiness.deadline(), Duration::from_millis(20));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(DemuxConfig::from_json("{ not json").is_err());
    }
}
