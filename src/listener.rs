// Service observer contract and the thread-safe listener registry

use crate::player::PlaybackState;
use crate::progress::{ProgressConfig, ProgressEvent, ProgressTracker};
use parking_lot::Mutex;
use std::sync::Arc;

/// Notifications delivered to registered service observers.
///
/// Pure notification interface; interval/time bookkeeping lives in
/// `ProgressTracker`, which the registry composes with each registration.
/// Callbacks should return quickly.
pub trait VideoServiceListener: Send + Sync {
    /// Duration is known and interval checkpoints are armed
    fn on_prepared(&self, duration_ms: u64);

    /// Mapped engine state change
    fn on_playback_state(&self, state: PlaybackState);

    /// Playback started (`true`) or paused (`false`)
    fn on_playing(&self, is_playing: bool);

    /// Playback finished or was stopped
    fn on_completion(&self);

    /// Engine error; teardown follows
    fn on_error(&self);

    /// The `interval`-th progress checkpoint was crossed
    fn on_interval_reached(&self, interval: u32);

    /// An absolute time mark was crossed
    fn on_time_event(&self, event_ms: u64);

    /// Video aspect ratio changed
    fn on_video_size_changed(&self, aspect_ratio: f32);
}

struct Registration {
    listener: Arc<dyn VideoServiceListener>,
    tracker: Mutex<ProgressTracker>,
}

/// Identity-keyed observer registry.
///
/// Register/unregister and broadcast are mutually exclusive only over the set
/// itself: broadcasting snapshots the entries under the lock and invokes
/// callbacks outside it, so a callback may re-enter register/unregister
/// without deadlocking. An observer registered before a broadcast begins
/// receives that event; after unregister returns it receives nothing further.
#[derive(Default)]
pub struct ListenerSet {
    entries: Mutex<Vec<Arc<Registration>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn VideoServiceListener>, config: ProgressConfig) {
        let mut entries = self.entries.lock();
        if entries
            .iter()
            .any(|r| Arc::ptr_eq(&r.listener, &listener))
        {
            return;
        }
        entries.push(Arc::new(Registration {
            listener,
            tracker: Mutex::new(ProgressTracker::new(config)),
        }));
    }

    pub fn unregister(&self, listener: &Arc<dyn VideoServiceListener>) {
        self.entries
            .lock()
            .retain(|r| !Arc::ptr_eq(&r.listener, listener));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<Registration>> {
        self.entries.lock().clone()
    }

    /// Invoke `notify` on every currently registered observer. The set lock
    /// is not held during the callbacks.
    pub fn broadcast<F>(&self, notify: F)
    where
        F: Fn(&dyn VideoServiceListener),
    {
        for registration in self.snapshot() {
            notify(registration.listener.as_ref());
        }
    }

    /// Arm every observer's interval schedule with the now-known duration,
    /// then deliver the prepared notification.
    pub fn notify_prepared(&self, duration_ms: u64) {
        for registration in self.snapshot() {
            registration.tracker.lock().arm(duration_ms);
            registration.listener.on_prepared(duration_ms);
        }
    }

    /// Raise every interval/time event crossed by the sampled position, per
    /// observer, in ascending threshold order.
    pub fn process_progress(&self, position_ms: u64) {
        for registration in self.snapshot() {
            let due = registration.tracker.lock().take_due(position_ms);
            for event in due {
                match event {
                    ProgressEvent::Interval { index, .. } => {
                        registration.listener.on_interval_reached(index);
                    }
                    ProgressEvent::Time { mark_ms } => {
                        registration.listener.on_time_event(mark_ms);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Capture listener recording every notification in arrival order
    #[derive(Default)]
    pub struct RecordingListener {
        pub log: Mutex<Vec<String>>,
    }

    impl RecordingListener {
        pub fn entries(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl VideoServiceListener for RecordingListener {
        fn on_prepared(&self, duration_ms: u64) {
            self.log.lock().push(format!("prepared:{}", duration_ms));
        }

        fn on_playback_state(&self, state: PlaybackState) {
            self.log.lock().push(format!("state:{:?}", state));
        }

        fn on_playing(&self, is_playing: bool) {
            self.log.lock().push(format!("playing:{}", is_playing));
        }

        fn on_completion(&self) {
            self.log.lock().push("completion".to_string());
        }

        fn on_error(&self) {
            self.log.lock().push("error".to_string());
        }

        fn on_interval_reached(&self, interval: u32) {
            self.log.lock().push(format!("interval:{}", interval));
        }

        fn on_time_event(&self, event_ms: u64) {
            self.log.lock().push(format!("time:{}", event_ms));
        }

        fn on_video_size_changed(&self, aspect_ratio: f32) {
            self.log.lock().push(format!("size:{}", aspect_ratio));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingListener;
    use super::*;

    fn as_listener(listener: &Arc<RecordingListener>) -> Arc<dyn VideoServiceListener> {
        listener.clone()
    }

    #[test]
    fn test_broadcast_reaches_every_registered_observer() {
        let set = ListenerSet::new();
        let a = Arc::new(RecordingListener::default());
        let b = Arc::new(RecordingListener::default());
        set.register(as_listener(&a), ProgressConfig::default());
        set.register(as_listener(&b), ProgressConfig::default());

        set.broadcast(|l| l.on_playing(true));

        assert_eq!(a.entries(), vec!["playing:true"]);
        assert_eq!(b.entries(), vec!["playing:true"]);
    }

    #[test]
    fn test_no_events_after_unregister_returns() {
        let set = ListenerSet::new();
        let a = Arc::new(RecordingListener::default());
        set.register(as_listener(&a), ProgressConfig::default());

        set.broadcast(|l| l.on_playing(true));
        set.unregister(&as_listener(&a));
        set.broadcast(|l| l.on_playing(false));

        assert_eq!(a.entries(), vec!["playing:true"]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let set = ListenerSet::new();
        let a = Arc::new(RecordingListener::default());
        set.register(as_listener(&a), ProgressConfig::default());
        set.register(as_listener(&a), ProgressConfig::default());

        assert_eq!(set.len(), 1);
        set.broadcast(|l| l.on_completion());
        assert_eq!(a.entries(), vec!["completion"]);
    }

    #[test]
    fn test_callback_may_reenter_registration() {
        struct Reentrant {
            set: Arc<ListenerSet>,
            other: Arc<RecordingListener>,
        }

        impl VideoServiceListener for Reentrant {
            fn on_prepared(&self, _: u64) {}
            fn on_playback_state(&self, _: PlaybackState) {}
            fn on_playing(&self, _: bool) {
                self.set
                    .register(self.other.clone(), ProgressConfig::default());
            }
            fn on_completion(&self) {}
            fn on_error(&self) {}
            fn on_interval_reached(&self, _: u32) {}
            fn on_time_event(&self, _: u64) {}
            fn on_video_size_changed(&self, _: f32) {}
        }

        let set = Arc::new(ListenerSet::new());
        let other = Arc::new(RecordingListener::default());
        let reentrant: Arc<dyn VideoServiceListener> = Arc::new(Reentrant {
            set: set.clone(),
            other: other.clone(),
        });
        set.register(reentrant, ProgressConfig::default());

        // Would deadlock if the set lock were held during callbacks
        set.broadcast(|l| l.on_playing(true));

        assert_eq!(set.len(), 2);
        set.broadcast(|l| l.on_playing(false));
        assert_eq!(other.entries(), vec!["playing:false"]);
    }

    #[test]
    fn test_progress_is_tracked_per_observer() {
        let set = ListenerSet::new();
        let early = Arc::new(RecordingListener::default());
        let late = Arc::new(RecordingListener::default());
        set.register(
            as_listener(&early),
            ProgressConfig {
                interval_count: 2,
                time_events_ms: vec![],
            },
        );
        set.notify_prepared(10_000);
        set.process_progress(0);

        // Registered after prepared: schedule never armed, nothing fires
        set.register(
            as_listener(&late),
            ProgressConfig {
                interval_count: 2,
                time_events_ms: vec![],
            },
        );
        set.process_progress(6_000);

        assert_eq!(
            early.entries(),
            vec!["prepared:10000", "interval:0", "interval:1"]
        );
        assert!(late.entries().is_empty());
    }

    #[test]
    fn test_time_events_fire_once_in_order_across_samples() {
        let set = ListenerSet::new();
        let a = Arc::new(RecordingListener::default());
        set.register(
            as_listener(&a),
            ProgressConfig {
                interval_count: 0,
                time_events_ms: vec![500, 2_000, 9_000],
            },
        );
        set.notify_prepared(60_000);

        set.process_progress(10_000);
        set.process_progress(10_000);

        assert_eq!(
            a.entries(),
            vec!["prepared:60000", "time:500", "time:2000", "time:9000"]
        );
    }
}
