// Video engine shell over a pluggable decode/render pipeline
// Owns the prepared-once logic, state mapping, aspect ratio bookkeeping and
// the local file handle lifetime; the pipeline itself only decodes and renders

use crate::error::{Result, VideoError};
use crate::player::{MediaSource, PlaybackState, VideoPlayer, VideoPlayerEvents};
use crate::surface::{DisplayInfo, SurfaceHandle};
use parking_lot::Mutex;
use std::fs::File;
use std::sync::{Arc, Weak};

/// Raw pipeline state, before the engine layers its error tracking on top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Preparing,
    Buffering,
    Ready,
    Ended,
}

/// Events raised by the decode pipeline toward the engine
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Pipeline state or play-when-ready changed
    StateChanged {
        play_when_ready: bool,
        state: PipelineState,
    },

    /// Decoder initialization, crypto or track error
    DecoderError { message: String },

    /// Unexpected pipeline fault
    PlaybackError { message: String },

    /// Video dimensions or pixel aspect changed
    VideoSizeChanged {
        width: u32,
        height: u32,
        pixel_ratio: f32,
    },

    /// A frame was rendered to the attached surface
    DrawnToSurface,
}

/// Decode/render pipeline contract (the substitutable backend).
///
/// One pipeline instance per initialize; the engine creates a fresh one for
/// every new source and releases the old one first.
pub trait DecodePipeline: Send {
    /// Begin asynchronous preparation of a remote stream
    fn prepare_uri(&mut self, uri: &str) -> Result<()>;

    /// Begin asynchronous preparation from an open local file. The caller
    /// keeps the handle alive until release.
    fn prepare_file(&mut self, file: &File) -> Result<()>;

    fn set_play_when_ready(&mut self, play: bool);

    fn play_when_ready(&self) -> bool;

    /// Enable or disable the video render stage; audio is unaffected
    fn set_video_enabled(&mut self, enabled: bool);

    /// Rebind the render target asynchronously
    fn set_surface(&mut self, surface: Option<SurfaceHandle>, display: Option<DisplayInfo>);

    /// Rebind the render target and wait until the pipeline has let go of the
    /// previous one. Used when detaching so the caller can safely destroy it.
    fn set_surface_blocking(&mut self, surface: Option<SurfaceHandle>, display: Option<DisplayInfo>);

    fn seek_to(&mut self, position_ms: u64);

    fn stop(&mut self);

    /// Release all pipeline resources
    fn release(&mut self);

    fn state(&self) -> PipelineState;

    fn duration_ms(&self) -> u64;

    fn position_ms(&self) -> u64;

    fn buffered_percentage(&self) -> u8;
}

/// Factory for pipeline instances; the injection seam for tests and for
/// alternative decode backends
pub type PipelineFactory = Box<dyn Fn() -> Box<dyn DecodePipeline> + Send + Sync>;

// Notifications computed under the state lock, dispatched after it is
// released so a callback can re-enter the engine
enum Emit {
    State(PlaybackState),
    Prepared(u64),
    Completed,
    Error(VideoError),
    Drawn,
    Size(f32),
}

struct EngineInner {
    pipeline: Option<Box<dyn DecodePipeline>>,
    prepared: bool,
    failed: bool,
    surface: Option<SurfaceHandle>,
    display: Option<DisplayInfo>,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    // Held open for the lifetime of local playback, released on teardown
    local_file: Option<File>,
}

impl EngineInner {
    fn new() -> Self {
        Self {
            pipeline: None,
            prepared: false,
            failed: false,
            surface: None,
            display: None,
            width: 0,
            height: 0,
            pixel_ratio: 1.0,
            local_file: None,
        }
    }

    fn aspect_ratio(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            (self.pixel_ratio * self.width as f32) / self.height as f32
        }
    }
}

/// Video engine built on a `DecodePipeline`.
///
/// Maps pipeline states onto `PlaybackState`, detects the prepared transition
/// exactly once per initialize, and routes every pipeline fault through the
/// owner's error callback.
pub struct MediaEngine {
    pipeline_factory: PipelineFactory,
    inner: Mutex<EngineInner>,
    events: Weak<dyn VideoPlayerEvents>,
}

impl MediaEngine {
    pub fn new(pipeline_factory: PipelineFactory, events: Weak<dyn VideoPlayerEvents>) -> Self {
        Self {
            pipeline_factory,
            inner: Mutex::new(EngineInner::new()),
            events,
        }
    }

    fn events(&self) -> Option<Arc<dyn VideoPlayerEvents>> {
        self.events.upgrade()
    }

    fn dispatch(&self, emits: Vec<Emit>) {
        if emits.is_empty() {
            return;
        }
        let Some(events) = self.events() else {
            return;
        };
        for emit in emits {
            match emit {
                Emit::State(state) => events.on_playback_state(state),
                Emit::Prepared(duration) => events.on_prepared(duration),
                Emit::Completed => events.on_completed(),
                Emit::Error(error) => {
                    log::error!("Engine error: {}", error);
                    events.on_error(error);
                }
                Emit::Drawn => events.on_drawn_to_surface(),
                Emit::Size(ratio) => events.on_size_changed(ratio),
            }
        }
    }

    fn map_state(state: PipelineState) -> PlaybackState {
        match state {
            PipelineState::Idle => PlaybackState::Idle,
            PipelineState::Preparing => PlaybackState::Preparing,
            PipelineState::Buffering => PlaybackState::Buffering,
            PipelineState::Ready => PlaybackState::Ready,
            PipelineState::Ended => PlaybackState::Ended,
        }
    }

    /// Entry point for pipeline callbacks. The hosting glue wires the backend
    /// here; tests drive it directly.
    pub fn handle_pipeline_event(&self, event: PipelineEvent) {
        let mut emits = Vec::new();
        {
            let mut inner = self.inner.lock();
            match event {
                PipelineEvent::StateChanged {
                    play_when_ready,
                    state,
                } => {
                    log::debug!(
                        "Pipeline state changed: {:?} (play_when_ready = {})",
                        state,
                        play_when_ready
                    );
                    emits.push(Emit::State(Self::map_state(state)));
                    match state {
                        PipelineState::Buffering | PipelineState::Ready => {
                            // First entry into either state means the
                            // duration is now known
                            if !inner.prepared {
                                inner.prepared = true;
                                let duration = inner
                                    .pipeline
                                    .as_ref()
                                    .map(|p| p.duration_ms())
                                    .unwrap_or(0);
                                emits.push(Emit::Prepared(duration));
                            }
                        }
                        PipelineState::Ended => emits.push(Emit::Completed),
                        PipelineState::Idle | PipelineState::Preparing => {}
                    }
                }
                PipelineEvent::DecoderError { message } => {
                    inner.failed = true;
                    emits.push(Emit::Error(VideoError::Decoder(message)));
                }
                PipelineEvent::PlaybackError { message } => {
                    inner.failed = true;
                    emits.push(Emit::Error(VideoError::Runtime(message)));
                }
                PipelineEvent::VideoSizeChanged {
                    width,
                    height,
                    pixel_ratio,
                } => {
                    inner.width = width;
                    inner.height = height;
                    inner.pixel_ratio = pixel_ratio;
                    emits.push(Emit::Size(inner.aspect_ratio()));
                }
                PipelineEvent::DrawnToSurface => emits.push(Emit::Drawn),
            }
        }
        self.dispatch(emits);
    }

    fn prepare_source(
        inner: &mut EngineInner,
        pipeline_factory: &PipelineFactory,
        source: &MediaSource,
    ) -> Result<()> {
        let mut pipeline = (pipeline_factory)();

        match source {
            MediaSource::Remote(uri) => pipeline.prepare_uri(uri)?,
            MediaSource::Local(path) => {
                let file = File::open(path).map_err(|e| {
                    VideoError::Initialization(format!("failed to open {}: {}", path.display(), e))
                })?;
                pipeline.prepare_file(&file)?;
                inner.local_file = Some(file);
            }
        }

        // Video stays disabled until the service foregrounds us
        pipeline.set_video_enabled(false);
        inner.pipeline = Some(pipeline);
        Ok(())
    }

    fn release_pipeline(inner: &mut EngineInner) {
        if let Some(mut pipeline) = inner.pipeline.take() {
            pipeline.release();
        }
        if inner.local_file.take().is_some() {
            log::debug!("Released local file handle");
        }
    }
}

impl VideoPlayer for MediaEngine {
    fn initialize(&self, source: MediaSource) {
        log::debug!("initialize: {:?}", source);

        let mut emits = Vec::new();
        {
            let mut inner = self.inner.lock();
            Self::release_pipeline(&mut inner);
            *inner = EngineInner::new();

            if let Err(e) = Self::prepare_source(&mut inner, &self.pipeline_factory, &source) {
                // Source failures surface through the error callback so the
                // service runs its one teardown path
                Self::release_pipeline(&mut inner);
                inner.failed = true;
                emits.push(Emit::Error(e));
            }
        }
        self.dispatch(emits);
    }

    fn start(&self) {
        if let Some(pipeline) = self.inner.lock().pipeline.as_mut() {
            pipeline.set_play_when_ready(true);
        }
    }

    fn pause(&self) {
        if let Some(pipeline) = self.inner.lock().pipeline.as_mut() {
            pipeline.set_play_when_ready(false);
        }
    }

    fn stop(&self) {
        let mut inner = self.inner.lock();
        if let Some(pipeline) = inner.pipeline.as_mut() {
            pipeline.stop();
        }
        Self::release_pipeline(&mut inner);
    }

    fn seek_to(&self, position_ms: u64) {
        if let Some(pipeline) = self.inner.lock().pipeline.as_mut() {
            pipeline.seek_to(position_ms);
        }
    }

    fn attach_surface(&self, surface: Option<SurfaceHandle>, display: Option<DisplayInfo>) {
        log::debug!("attach_surface: {:?}", surface);
        let mut inner = self.inner.lock();
        inner.surface = surface.clone();
        inner.display = display;
        if let Some(pipeline) = inner.pipeline.as_mut() {
            if surface.is_some() {
                pipeline.set_surface(surface, display);
            } else {
                // Block until the pipeline has stopped referencing the old
                // surface; the caller is about to destroy it
                pipeline.set_surface_blocking(None, display);
            }
        }
    }

    fn set_backgrounded(&self, backgrounded: bool) {
        if let Some(pipeline) = self.inner.lock().pipeline.as_mut() {
            pipeline.set_video_enabled(!backgrounded);
        }
    }

    fn reset_surface_aspect_ratio(&self) {
        let ratio = self.inner.lock().aspect_ratio();
        self.dispatch(vec![Emit::Size(ratio)]);
    }

    fn is_active(&self) -> bool {
        self.inner.lock().pipeline.is_some()
    }

    fn is_playing(&self) -> bool {
        self.inner
            .lock()
            .pipeline
            .as_ref()
            .map(|p| p.play_when_ready())
            .unwrap_or(false)
    }

    fn playback_state(&self) -> PlaybackState {
        let inner = self.inner.lock();
        if inner.failed {
            return PlaybackState::Error;
        }
        match inner.pipeline.as_ref() {
            Some(pipeline) => Self::map_state(pipeline.state()),
            None => PlaybackState::Idle,
        }
    }

    fn duration_ms(&self) -> u64 {
        self.inner
            .lock()
            .pipeline
            .as_ref()
            .map(|p| p.duration_ms())
            .unwrap_or(0)
    }

    fn current_position_ms(&self) -> u64 {
        self.inner
            .lock()
            .pipeline
            .as_ref()
            .map(|p| p.position_ms())
            .unwrap_or(0)
    }

    fn buffered_percentage(&self) -> u8 {
        self.inner
            .lock()
            .pipeline
            .as_ref()
            .map(|p| p.buffered_percentage())
            .unwrap_or(0)
    }

    fn tear_down(&self) {
        log::debug!("tear_down");
        let mut inner = self.inner.lock();
        Self::release_pipeline(&mut inner);
    }
}

impl Drop for MediaEngine {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        Self::release_pipeline(&mut inner);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::VideoError;

    /// Scripted pipeline recording every command it receives
    pub struct PipelineProbe {
        pub calls: Mutex<Vec<String>>,
        pub state: Mutex<PipelineState>,
        pub play_when_ready: Mutex<bool>,
        pub duration_ms: Mutex<u64>,
        pub position_ms: Mutex<u64>,
    }

    impl Default for PipelineProbe {
        fn default() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                state: Mutex::new(PipelineState::Idle),
                play_when_ready: Mutex::new(false),
                duration_ms: Mutex::new(0),
                position_ms: Mutex::new(0),
            }
        }
    }

    pub struct FakePipeline {
        pub probe: Arc<PipelineProbe>,
    }

    impl DecodePipeline for FakePipeline {
        fn prepare_uri(&mut self, uri: &str) -> Result<()> {
            self.probe.calls.lock().push(format!("prepare_uri:{}", uri));
            *self.probe.state.lock() = PipelineState::Preparing;
            Ok(())
        }

        fn prepare_file(&mut self, _file: &File) -> Result<()> {
            self.probe.calls.lock().push("prepare_file".to_string());
            *self.probe.state.lock() = PipelineState::Preparing;
            Ok(())
        }

        fn set_play_when_ready(&mut self, play: bool) {
            self.probe
                .calls
                .lock()
                .push(format!("set_play_when_ready:{}", play));
            *self.probe.play_when_ready.lock() = play;
        }

        fn play_when_ready(&self) -> bool {
            *self.probe.play_when_ready.lock()
        }

        fn set_video_enabled(&mut self, enabled: bool) {
            self.probe
                .calls
                .lock()
                .push(format!("set_video_enabled:{}", enabled));
        }

        fn set_surface(&mut self, surface: Option<SurfaceHandle>, _display: Option<DisplayInfo>) {
            self.probe
                .calls
                .lock()
                .push(format!("set_surface:{}", surface.is_some()));
        }

        fn set_surface_blocking(
            &mut self,
            surface: Option<SurfaceHandle>,
            _display: Option<DisplayInfo>,
        ) {
            self.probe
                .calls
                .lock()
                .push(format!("set_surface_blocking:{}", surface.is_some()));
        }

        fn seek_to(&mut self, position_ms: u64) {
            self.probe
                .calls
                .lock()
                .push(format!("seek_to:{}", position_ms));
            *self.probe.position_ms.lock() = position_ms;
        }

        fn stop(&mut self) {
            self.probe.calls.lock().push("stop".to_string());
            *self.probe.play_when_ready.lock() = false;
        }

        fn release(&mut self) {
            self.probe.calls.lock().push("release".to_string());
            *self.probe.state.lock() = PipelineState::Idle;
        }

        fn state(&self) -> PipelineState {
            *self.probe.state.lock()
        }

        fn duration_ms(&self) -> u64 {
            *self.probe.duration_ms.lock()
        }

        fn position_ms(&self) -> u64 {
            *self.probe.position_ms.lock()
        }

        fn buffered_percentage(&self) -> u8 {
            50
        }
    }

    /// Capture-style events sink, in the manner of the service listeners
    #[derive(Default)]
    pub struct EventProbe {
        pub states: Mutex<Vec<PlaybackState>>,
        pub prepared: Mutex<Vec<u64>>,
        pub completed: Mutex<u32>,
        pub errors: Mutex<Vec<VideoError>>,
        pub ratios: Mutex<Vec<f32>>,
        pub drawn: Mutex<u32>,
    }

    impl VideoPlayerEvents for EventProbe {
        fn on_playback_state(&self, state: PlaybackState) {
            self.states.lock().push(state);
        }

        fn on_prepared(&self, duration_ms: u64) {
            self.prepared.lock().push(duration_ms);
        }

        fn on_completed(&self) {
            *self.completed.lock() += 1;
        }

        fn on_error(&self, error: VideoError) {
            self.errors.lock().push(error);
        }

        fn on_drawn_to_surface(&self) {
            *self.drawn.lock() += 1;
        }

        fn on_size_changed(&self, aspect_ratio: f32) {
            self.ratios.lock().push(aspect_ratio);
        }
    }

    pub fn engine_with_probes() -> (MediaEngine, Arc<PipelineProbe>, Arc<EventProbe>) {
        let probe = Arc::new(PipelineProbe::default());
        let events = Arc::new(EventProbe::default());
        let factory_probe = probe.clone();
        let factory: PipelineFactory = Box::new(move || {
            Box::new(FakePipeline {
                probe: factory_probe.clone(),
            })
        });
        let events_dyn: Arc<dyn VideoPlayerEvents> = events.clone();
        let weak: Weak<dyn VideoPlayerEvents> = Arc::downgrade(&events_dyn);
        let engine = MediaEngine::new(factory, weak);
        (engine, probe, events)
    }
}
