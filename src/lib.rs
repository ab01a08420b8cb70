// Background video playback service
// Keeps video/audio playing while the host UI comes and goes: the engine
// lives here, foreground surfaces attach and detach around it.

pub mod engine;
pub mod error;
pub mod listener;
pub mod metadata;
pub mod player;
pub mod progress;
pub mod service;
pub mod surface;
pub mod worker;

// Re-exports
pub use engine::{DecodePipeline, MediaEngine, PipelineEvent, PipelineFactory, PipelineState};
pub use error::{Result, VideoError};
pub use listener::{ListenerSet, VideoServiceListener};
pub use metadata::{Video, VideoFlatFile, VideoMetadata, TARGET_BIT_RATE, VALID_VIDEO_MIMETYPES};
pub use player::{MediaSource, PlaybackState, VideoPlayer, VideoPlayerEvents};
pub use progress::{ProgressConfig, ProgressEvent, ProgressPoller, ProgressTracker};
pub use service::{EngineFactory, MediaKey, ServiceCommand, ServiceHost, VideoService};
pub use surface::{DisplayInfo, SurfaceHandle};

// Initialize logging based on platform
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("BackgroundVideo"),
        );
    }
}
