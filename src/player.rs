// Core video player trait and engine event contract
// The decode/render engine lives behind VideoPlayer so implementations can be
// swapped (including a scripted engine for tests)

use crate::error::VideoError;
use crate::surface::{DisplayInfo, SurfaceHandle};
use std::path::PathBuf;

/// Playback state as seen by the service and its observers.
///
/// Transitions are driven only by the engine: `Idle -> Preparing ->
/// {Buffering <-> Ready} -> Ended`, with `Error` reachable from any non-idle
/// state and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No media loaded
    Idle,
    /// Asynchronous preparation in flight
    Preparing,
    /// Prepared but stalled waiting for data
    Buffering,
    /// Prepared with enough data to render
    Ready,
    /// Playback reached the end of the media
    Ended,
    /// Engine failure; the instance is being torn down
    Error,
}

/// The media source handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    /// Remote stream URI
    Remote(String),
    /// Local file; opened at initialize time and held until teardown
    Local(PathBuf),
}

impl MediaSource {
    /// `file://` URIs resolve to local files, everything else streams
    pub fn from_uri(uri: &str) -> Self {
        match uri.strip_prefix("file://") {
            Some(path) => MediaSource::Local(PathBuf::from(path)),
            None => MediaSource::Remote(uri.to_string()),
        }
    }
}

/// Core video engine trait.
///
/// Exactly one service instance owns the engine and serializes commands into
/// it; methods take `&self` because engine callbacks may re-enter the owner
/// (implementations guard their own state).
pub trait VideoPlayer: Send + Sync {
    /// Begin asynchronous preparation of a new source. Tears down any prior
    /// pipeline first and resets the prepared flag. Failures to open the
    /// source are reported through the error callback, not returned.
    fn initialize(&self, source: MediaSource);

    /// Start or resume playback. Meaningful once Ready or Buffering.
    fn start(&self);

    /// Pause playback. Meaningful once Ready or Buffering.
    fn pause(&self);

    /// Stop playback and release pipeline resources unconditionally.
    fn stop(&self);

    /// Seek to a position in milliseconds. Valid only once prepared; the
    /// caller gates.
    fn seek_to(&self, position_ms: u64);

    /// Rebind the render target. `None` detaches (audio-only) and blocks
    /// until the engine acknowledges the release; attaching may complete
    /// asynchronously.
    fn attach_surface(&self, surface: Option<SurfaceHandle>, display: Option<DisplayInfo>);

    /// Disable or re-enable the video render stage while audio keeps going.
    fn set_backgrounded(&self, backgrounded: bool);

    /// Recompute and publish the surface aspect ratio from the last known
    /// video dimensions.
    fn reset_surface_aspect_ratio(&self);

    /// Whether a pipeline instance currently exists.
    fn is_active(&self) -> bool;

    /// Whether the engine is set to play when ready.
    fn is_playing(&self) -> bool;

    fn playback_state(&self) -> PlaybackState;

    fn duration_ms(&self) -> u64;

    fn current_position_ms(&self) -> u64;

    fn buffered_percentage(&self) -> u8;

    /// Release all engine resources, including any open local file handle.
    fn tear_down(&self);
}

/// Events raised by the engine toward its single owner (the service).
///
/// Delivery order follows the order the engine raised them; an error is the
/// last event for the engine instance.
pub trait VideoPlayerEvents: Send + Sync {
    /// Mapped playback state change
    fn on_playback_state(&self, state: PlaybackState);

    /// Fires exactly once per initialize, on the first transition into
    /// Buffering or Ready, with the now-known duration
    fn on_prepared(&self, duration_ms: u64);

    /// Terminal: playback reached the end of the media
    fn on_completed(&self);

    /// Terminal: engine failure; teardown always follows
    fn on_error(&self, error: VideoError);

    /// A frame was rendered to the attached surface
    fn on_drawn_to_surface(&self);

    /// Video dimensions changed; `aspect_ratio` is pixel-ratio-corrected
    fn on_size_changed(&self, aspect_ratio: f32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_resolution_from_uri() {
        assert_eq!(
            MediaSource::from_uri("https://example.com/v.mp4"),
            MediaSource::Remote("https://example.com/v.mp4".to_string())
        );
        assert_eq!(
            MediaSource::from_uri("file:///sdcard/v.mp4"),
            MediaSource::Local(PathBuf::from("/sdcard/v.mp4"))
        );
    }
}
