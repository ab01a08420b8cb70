// Background video service: owns the engine lifecycle, applies transport
// commands against the playback state machine, coordinates the foreground
// surface and fans events out to registered observers.
//
// Command entry points are the serialization boundary; the host delivers
// commands one at a time.

use crate::error::VideoError;
use crate::listener::{ListenerSet, VideoServiceListener};
use crate::metadata::{Video, VideoMetadata, TARGET_BIT_RATE, VALID_VIDEO_MIMETYPES};
use crate::player::{MediaSource, PlaybackState, VideoPlayer, VideoPlayerEvents};
use crate::progress::{ProgressConfig, ProgressPoller};
use crate::surface::{DisplayInfo, SurfaceHandle};
use crate::worker::BackgroundWorker;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Hardware media key codes the service understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKey {
    PlayPause,
    Next,
    Previous,
    HeadsetHook,
}

/// The external command surface (originally delivered as service intents)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceCommand {
    /// Prepare the engine for the given media, do not play
    LoadVideo {
        metadata: VideoMetadata,
        video: Option<Video>,
    },
    /// Load if needed, then play; optionally request the foreground UI
    StartVideo {
        metadata: Option<VideoMetadata>,
        video: Option<Video>,
        with_foreground_ui: bool,
        start_playback: bool,
    },
    /// Request UI presentation for already-loaded media
    ResumeViewingVideo,
    /// Full stop and teardown
    DiscardVideo,
    /// Hardware media button press
    MediaButton { key: MediaKey },
    PlayerPlay,
    PlayerPause,
    PlayerTogglePaused,
    PlayerNext,
    PlayerPrevious,
}

/// Host-process hooks the service calls outward: presenting the player UI,
/// screen keep-awake, and the moment the service may be reclaimed.
pub trait ServiceHost: Send + Sync {
    /// Bring up the foreground player UI for the given title
    fn present_foreground(&self, title: &str);

    /// Keep the screen awake while video is playing
    fn set_keep_screen_on(&self, keep_on: bool);

    /// The service finished tearing down and can be shut down
    fn on_service_idle(&self);
}

/// Factory for engine instances; injected so tests (and alternative decode
/// backends) can substitute the engine
pub type EngineFactory =
    Box<dyn Fn(Weak<dyn VideoPlayerEvents>) -> Arc<dyn VideoPlayer> + Send + Sync>;

/// The playback orchestrator.
///
/// Owns the engine instance, the current metadata and the requested-intent
/// flags; commands are applied against the engine respecting the state
/// machine, and engine events come back through the `VideoPlayerEvents`
/// impl.
pub struct VideoService {
    self_weak: Weak<VideoService>,
    engine_factory: EngineFactory,
    host: Arc<dyn ServiceHost>,
    player: Mutex<Option<Arc<dyn VideoPlayer>>>,
    listeners: ListenerSet,
    metadata: Mutex<Option<VideoMetadata>>,
    video: Mutex<Option<Video>>,
    // "do X once preconditions hold"; cleared the instant the action runs
    start_requested: AtomicBool,
    activity_requested: AtomicBool,
    surface: Mutex<Option<SurfaceHandle>>,
    display: Mutex<Option<DisplayInfo>>,
    poller: Mutex<Option<ProgressPoller>>,
    worker: Mutex<Option<BackgroundWorker>>,
}

impl VideoService {
    pub fn new(engine_factory: EngineFactory, host: Arc<dyn ServiceHost>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            self_weak: weak.clone(),
            engine_factory,
            host,
            player: Mutex::new(None),
            listeners: ListenerSet::new(),
            metadata: Mutex::new(None),
            video: Mutex::new(None),
            start_requested: AtomicBool::new(false),
            activity_requested: AtomicBool::new(false),
            surface: Mutex::new(None),
            display: Mutex::new(None),
            poller: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    // ---- observer registry -------------------------------------------------

    pub fn register_listener(
        &self,
        listener: Arc<dyn VideoServiceListener>,
        config: ProgressConfig,
    ) {
        self.listeners.register(listener, config);
    }

    pub fn unregister_listener(&self, listener: &Arc<dyn VideoServiceListener>) {
        self.listeners.unregister(listener);
    }

    // ---- queries -----------------------------------------------------------

    fn current_player(&self) -> Option<Arc<dyn VideoPlayer>> {
        self.player.lock().clone()
    }

    pub fn is_media_player_active(&self) -> bool {
        self.current_player().map(|p| p.is_active()).unwrap_or(false)
    }

    /// Prepared means the engine reached Ready or Buffering; only then are
    /// position semantics defined
    pub fn is_player_prepared(&self) -> bool {
        match self.current_player() {
            Some(p) if p.is_active() => matches!(
                p.playback_state(),
                PlaybackState::Ready | PlaybackState::Buffering
            ),
            _ => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        match self.current_player() {
            Some(p) if p.is_active() => p.is_playing() && self.is_player_prepared(),
            _ => false,
        }
    }

    pub fn current_state(&self) -> PlaybackState {
        match self.current_player() {
            Some(p) if p.is_active() => p.playback_state(),
            _ => PlaybackState::Idle,
        }
    }

    pub fn current_position_ms(&self) -> u64 {
        match self.current_player() {
            Some(p) if p.is_active() => p.current_position_ms(),
            _ => 0,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self.current_player() {
            Some(p) if p.is_active() => p.duration_ms(),
            _ => 0,
        }
    }

    pub fn buffer_percentage(&self) -> u8 {
        match self.current_player() {
            Some(p) if p.is_active() => p.buffered_percentage(),
            _ => 0,
        }
    }

    pub fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata.lock().clone()
    }

    pub fn is_next_enabled(&self) -> bool {
        self.is_media_player_active()
    }

    pub fn is_prev_enabled(&self) -> bool {
        self.metadata
            .lock()
            .as_ref()
            .map(|m| m.prev_enabled)
            .unwrap_or(false)
    }

    // ---- commands ----------------------------------------------------------

    /// Dispatch one externally delivered command
    pub fn handle_command(&self, command: ServiceCommand) {
        log::debug!("handle_command: {:?}", command);
        match command {
            ServiceCommand::LoadVideo { metadata, video } => self.load_video(metadata, video),
            ServiceCommand::StartVideo {
                metadata,
                video,
                with_foreground_ui,
                start_playback,
            } => {
                if let Some(metadata) = metadata {
                    self.load_video(metadata, video);
                }
                if start_playback {
                    self.start(with_foreground_ui);
                } else {
                    if with_foreground_ui {
                        self.activity_requested.store(true, Ordering::Relaxed);
                    }
                    self.begin_video();
                }
            }
            ServiceCommand::ResumeViewingVideo => {
                self.activity_requested.store(true, Ordering::Relaxed);
                self.begin_video();
            }
            ServiceCommand::DiscardVideo => {
                self.stop();
                self.tear_down();
            }
            ServiceCommand::MediaButton { key } => match key {
                MediaKey::PlayPause => self.toggle_play_pause(),
                MediaKey::Next => self.next(),
                MediaKey::Previous => self.prev(),
                MediaKey::HeadsetHook => self.pause(),
            },
            ServiceCommand::PlayerPlay => self.start(false),
            ServiceCommand::PlayerPause => self.pause(),
            ServiceCommand::PlayerTogglePaused => self.toggle_play_pause(),
            ServiceCommand::PlayerNext => self.next(),
            ServiceCommand::PlayerPrevious => self.prev(),
        }
    }

    /// Store metadata and begin preparing the engine; does not play.
    pub fn load_video(&self, metadata: VideoMetadata, video: Option<Video>) {
        log::debug!("load_video: {:?}", metadata.title);

        self.ensure_worker();
        *self.metadata.lock() = Some(metadata);
        *self.video.lock() = video;
        self.prepare_video_player();
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            *worker = Some(BackgroundWorker::new());
        }
    }

    fn resolve_source(&self) -> Result<MediaSource, VideoError> {
        if let Some(video) = self.video.lock().as_ref() {
            // Pick the flat file closest to the target bitrate; adaptive
            // playback is not supported by this pipeline
            return match video.most_suitable_flat_file(VALID_VIDEO_MIMETYPES, TARGET_BIT_RATE) {
                Some(flat_file) => Ok(MediaSource::from_uri(&flat_file.url)),
                None => Err(VideoError::Initialization(
                    "no playable flat file representation".to_string(),
                )),
            };
        }

        match self.metadata.lock().as_ref() {
            Some(metadata) => Ok(MediaSource::from_uri(&metadata.video_uri)),
            None => Err(VideoError::Initialization("no media loaded".to_string())),
        }
    }

    fn prepare_video_player(&self) {
        log::debug!("prepare_video_player");

        let player = {
            let mut slot = self.player.lock();
            if slot.is_none() {
                let events: Weak<dyn VideoPlayerEvents> = self.self_weak.clone();
                *slot = Some((self.engine_factory)(events));
            }
            slot.clone()
        };

        let Some(player) = player else { return };

        // Engine callbacks (including synchronous failures) must not run
        // under the player slot lock
        match self.resolve_source() {
            Ok(source) => player.initialize(source),
            Err(e) => self.on_error(e),
        }
    }

    /// Request playback, optionally together with the foreground UI. If the
    /// engine is not prepared yet the request is remembered and satisfied
    /// from the prepared callback.
    pub fn start(&self, with_foreground_ui: bool) {
        log::debug!("start: with_foreground_ui = {}", with_foreground_ui);

        self.start_requested.store(true, Ordering::Relaxed);
        if with_foreground_ui {
            self.activity_requested.store(true, Ordering::Relaxed);
        }

        // Deferred start: load first if nothing is prepared yet
        if !self.is_media_player_active() {
            if self.metadata.lock().is_some() {
                self.prepare_video_player();
            } else {
                log::warn!("start requested with no media loaded");
            }
        }

        self.begin_video();
    }

    /// Idempotent reconcile step: satisfy whichever requested intents are
    /// now satisfiable. Re-run after every command and on prepared.
    fn begin_video(&self) {
        log::debug!(
            "begin_video: start_requested = {}, activity_requested = {}",
            self.start_requested.load(Ordering::Relaxed),
            self.activity_requested.load(Ordering::Relaxed)
        );

        if self.start_requested.load(Ordering::Relaxed) && self.is_player_prepared() {
            if let Some(player) = self.current_player() {
                player.start();
            }
            self.start_requested.store(false, Ordering::Relaxed);
            if let Some(metadata) = self.metadata.lock().as_mut() {
                metadata.paused = false;
            }
            self.ensure_poller();
            self.host.set_keep_screen_on(true);
            self.listeners.broadcast(|l| l.on_playing(true));
        }

        if self.activity_requested.load(Ordering::Relaxed) && self.is_player_prepared() {
            let title = self
                .metadata
                .lock()
                .as_ref()
                .map(|m| m.title.clone())
                .unwrap_or_default();
            self.host.present_foreground(&title);
            self.activity_requested.store(false, Ordering::Relaxed);
        }
    }

    // The poller runs only between prepared and teardown; it samples the
    // engine position and drives interval/time events through the registry
    fn ensure_poller(&self) {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return;
        }

        let position_weak = self.self_weak.clone();
        let sample_weak = self.self_weak.clone();
        *poller = Some(ProgressPoller::start(
            Arc::new(move || {
                position_weak
                    .upgrade()
                    .map(|s| s.current_position_ms())
                    .unwrap_or(0)
            }),
            Arc::new(move |position_ms| {
                if let Some(service) = sample_weak.upgrade() {
                    service.listeners.process_progress(position_ms);
                }
            }),
        ));
    }

    fn stop_poller(&self) {
        let poller = self.poller.lock().take();
        if let Some(mut poller) = poller {
            poller.stop();
        }
    }

    pub fn pause(&self) {
        log::debug!("pause");

        if !self.is_media_player_active() {
            return;
        }
        if let Some(player) = self.current_player() {
            player.pause();
        }
        if let Some(metadata) = self.metadata.lock().as_mut() {
            metadata.paused = true;
        }
        self.host.set_keep_screen_on(false);
        self.listeners.broadcast(|l| l.on_playing(false));
    }

    /// Stop the engine and notify completion. Safe to call when idle.
    pub fn stop(&self) {
        log::debug!("stop");

        if !self.is_player_prepared() {
            return;
        }
        if let Some(player) = self.current_player() {
            player.stop();
        }
        self.notify_completion();
    }

    pub fn seek_to(&self, position_ms: u64) {
        if self.is_player_prepared() {
            if let Some(player) = self.current_player() {
                player.seek_to(position_ms);
            }
        }
    }

    /// Skip forward: this player has a single track, so next ends playback
    pub fn next(&self) {
        if self.is_player_prepared() {
            if let Some(player) = self.current_player() {
                player.stop();
            }
            self.notify_completion();
        }
    }

    /// Skip backward: restart the current track
    pub fn prev(&self) {
        if self.is_player_prepared() {
            if let Some(player) = self.current_player() {
                player.seek_to(0);
            }
        }
    }

    pub fn toggle_play_pause(&self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.start(false);
        }
    }

    // ---- foreground surface ------------------------------------------------

    /// Hand the engine the surface to render into, or detach with `None`.
    ///
    /// When a surface arrives while paused the engine shows a stale or blank
    /// frame, so a best-effort seek to the current position is posted to the
    /// background worker to repaint it.
    pub fn set_foreground_surface(
        &self,
        surface: Option<SurfaceHandle>,
        display: Option<DisplayInfo>,
    ) {
        log::debug!("set_foreground_surface: {:?}", surface);

        *self.surface.lock() = surface.clone();
        *self.display.lock() = display;

        if self.is_media_player_active() {
            if let Some(player) = self.current_player() {
                player.attach_surface(surface.clone(), display);
            }
        }

        if surface.is_some() && !self.is_playing() {
            if self.start_requested.load(Ordering::Relaxed) {
                // We got here via a start request; run it now
                self.begin_video();
            } else {
                let weak = self.self_weak.clone();
                if let Some(worker) = self.worker.lock().as_ref() {
                    worker.post(move || {
                        if let Some(service) = weak.upgrade() {
                            let position = service.current_position_ms();
                            service.seek_to(position);
                        }
                    });
                }
            }
        }
    }

    /// Foreground visibility changed: toggle the video render stage and
    /// rebind the surface accordingly
    pub fn set_backgrounded(
        &self,
        backgrounded: bool,
        surface: Option<SurfaceHandle>,
        display: Option<DisplayInfo>,
    ) {
        log::debug!("set_backgrounded: {}", backgrounded);

        if self.is_media_player_active() {
            if let Some(player) = self.current_player() {
                player.set_backgrounded(backgrounded);
            }
            self.set_foreground_surface(surface, display);
        }
    }

    /// The host UI went away without an explicit detach
    pub fn on_unbind(&self) {
        let had_surface = self.surface.lock().take().is_some();
        if had_surface && self.is_player_prepared() {
            self.set_foreground_surface(None, None);
        }
    }

    // ---- teardown ----------------------------------------------------------

    fn notify_completion(&self) {
        self.stop_poller();
        self.host.set_keep_screen_on(false);
        self.listeners.broadcast(|l| l.on_completion());
    }

    /// Release everything: poller, engine, observers, worker. The only
    /// cancellation point; afterwards only `load_video` re-arms the service.
    pub fn tear_down(&self) {
        log::debug!("tear_down");

        self.stop_poller();
        self.listeners.clear();

        let player = self.player.lock().take();
        if let Some(player) = player {
            player.tear_down();
        }

        self.start_requested.store(false, Ordering::Relaxed);
        self.activity_requested.store(false, Ordering::Relaxed);
        *self.surface.lock() = None;
        *self.display.lock() = None;

        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.shutdown();
        }

        // Allow the host to reclaim the service
        self.host.on_service_idle();
    }
}

impl VideoPlayerEvents for VideoService {
    fn on_playback_state(&self, state: PlaybackState) {
        log::debug!("on_playback_state: {:?}", state);
        self.listeners.broadcast(|l| l.on_playback_state(state));
    }

    fn on_prepared(&self, duration_ms: u64) {
        log::debug!("on_prepared: duration = {} ms", duration_ms);
        self.listeners.notify_prepared(duration_ms);

        // A start may have been requested before we were prepared
        self.begin_video();
    }

    fn on_completed(&self) {
        log::debug!("on_completed");
        self.notify_completion();
    }

    fn on_error(&self, error: VideoError) {
        log::error!("on_error: {}", error);
        // Error is the last event observers see from this engine instance
        self.listeners.broadcast(|l| l.on_error());
        self.tear_down();
    }

    fn on_drawn_to_surface(&self) {
        log::debug!("on_drawn_to_surface");
    }

    fn on_size_changed(&self, aspect_ratio: f32) {
        log::debug!("on_size_changed: {}", aspect_ratio);
        self.listeners
            .broadcast(|l| l.on_video_size_changed(aspect_ratio));
    }
}
