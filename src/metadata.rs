// Video metadata and source-representation models
// VideoMetadata must round-trip across the service process boundary

use serde::{Deserialize, Serialize};

/// Target bitrate (kbps) used when choosing between flat file representations
pub const TARGET_BIT_RATE: i32 = 640;

/// Mimetypes the playback pipeline accepts
pub const VALID_VIDEO_MIMETYPES: &[&str] = &["video/webm", "video/mp4", "video/3gpp"];

/// Display metadata for the currently loaded video.
///
/// Owned by the service; the `paused` flag tracks last-known user intent and
/// is flipped on start/pause commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub video_uri: String,
    pub title: String,
    pub artist: String,
    /// Duration hint in milliseconds; the engine reports the real duration
    /// once prepared
    pub duration_hint_ms: i64,
    pub image_url: String,
    pub click_url: String,
    pub next_enabled: bool,
    pub prev_enabled: bool,
    pub paused: bool,
}

/// One downloadable (non-adaptive) representation of a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFlatFile {
    pub url: String,
    /// Bitrate in kbps
    pub bitrate: i32,
    pub mimetype: String,
}

/// A playable video: an optional adaptive manifest plus zero or more flat
/// file representations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    dash_manifest_id: Option<String>,
    flat_files: Vec<VideoFlatFile>,
}

impl Video {
    pub fn new(dash_manifest_id: Option<String>, flat_files: Vec<VideoFlatFile>) -> Self {
        Self {
            dash_manifest_id,
            flat_files,
        }
    }

    pub fn dash_manifest_id(&self) -> Option<&str> {
        self.dash_manifest_id.as_deref()
    }

    pub fn is_adaptive_streaming_supported(&self) -> bool {
        self.dash_manifest_id.is_some()
    }

    /// Returns the most suited flat file given the accepted mimetypes and the
    /// desired bitrate, or `None` if no suitable representation exists.
    ///
    /// Picks the valid-mimetype file whose bitrate is closest to the target.
    pub fn most_suitable_flat_file(
        &self,
        valid_mimetypes: &[&str],
        target_bitrate: i32,
    ) -> Option<&VideoFlatFile> {
        let mut closest_video: Option<&VideoFlatFile> = None;
        let mut closest_value = i32::MAX;

        for flat_file in &self.flat_files {
            if valid_mimetypes.contains(&flat_file.mimetype.as_str()) {
                let distance_from_target = (target_bitrate - flat_file.bitrate).abs();
                if distance_from_target <= closest_value {
                    closest_value = distance_from_target;
                    closest_video = Some(flat_file);
                }
            }
        }

        closest_video
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(url: &str, bitrate: i32, mimetype: &str) -> VideoFlatFile {
        VideoFlatFile {
            url: url.to_string(),
            bitrate,
            mimetype: mimetype.to_string(),
        }
    }

    #[test]
    fn test_selects_closest_bitrate() {
        let video = Video::new(
            None,
            vec![
                flat("a", 200, "video/mp4"),
                flat("b", 600, "video/mp4"),
                flat("c", 2000, "video/mp4"),
            ],
        );

        let chosen = video
            .most_suitable_flat_file(VALID_VIDEO_MIMETYPES, TARGET_BIT_RATE)
            .unwrap();
        assert_eq!(chosen.url, "b");
    }

    #[test]
    fn test_skips_invalid_mimetypes() {
        let video = Video::new(
            None,
            vec![
                flat("a", 640, "video/x-flv"),
                flat("b", 100, "video/webm"),
            ],
        );

        let chosen = video
            .most_suitable_flat_file(VALID_VIDEO_MIMETYPES, TARGET_BIT_RATE)
            .unwrap();
        assert_eq!(chosen.url, "b");
    }

    #[test]
    fn test_no_suitable_file() {
        let video = Video::new(Some("manifest-1".to_string()), vec![]);
        assert!(video
            .most_suitable_flat_file(VALID_VIDEO_MIMETYPES, TARGET_BIT_RATE)
            .is_none());
        assert!(video.is_adaptive_streaming_supported());
    }

    #[test]
    fn test_metadata_round_trip() {
        let metadata = VideoMetadata {
            video_uri: "https://example.com/v.mp4".to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            duration_hint_ms: 90_000,
            image_url: "https://example.com/art.jpg".to_string(),
            click_url: "https://example.com/click".to_string(),
            next_enabled: true,
            prev_enabled: false,
            paused: false,
        };

        let encoded = serde_json::to_string(&metadata).unwrap();
        let decoded: VideoMetadata = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, metadata);
    }
}
