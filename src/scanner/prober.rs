// src/scanner/prober.rs
//
// Media probing port
//
// The scanner never decodes media itself. Whatever implements
// `MetadataProber` (an ffprobe wrapper, a test double) fills in the
// technical fields of new scenes.

use std::path::Path;

use crate::domain::Scene;
use crate::error::AppResult;

/// Technical metadata of one video file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    /// Seconds
    pub duration: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    /// Container format
    pub format: Option<String>,
    pub framerate: Option<f64>,
    pub bitrate: Option<i64>,
}

impl VideoMetadata {
    /// Copy every probed field onto `scene`
    pub fn apply_to(&self, scene: &mut Scene) {
        scene.duration = self.duration;
        scene.width = self.width;
        scene.height = self.height;
        scene.video_codec = self.video_codec.clone();
        scene.audio_codec = self.audio_codec.clone();
        scene.format = self.format.clone();
        scene.framerate = self.framerate;
        scene.bitrate = self.bitrate;
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait MetadataProber: Send + Sync {
    fn probe(&self, path: &Path) -> AppResult<VideoMetadata>;
}

/// Prober for setups without a media toolchain; reports nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProber;

impl MetadataProber for NullProber {
    fn probe(&self, _path: &Path) -> AppResult<VideoMetadata> {
        Ok(VideoMetadata::default())
    }
}
