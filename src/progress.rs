// Interval/time-event scheduling and the periodic progress poller
// Separated from the listener notification interface so any observer can
// compose with it

use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Polling cadence for progress sampling (milliseconds)
pub const POLL_INTERVAL_MS: u64 = 1000;

/// Per-observer progress configuration, fixed at registration time
#[derive(Debug, Clone, Default)]
pub struct ProgressConfig {
    /// Number of evenly spaced interval checkpoints across the media duration
    pub interval_count: u32,
    /// Absolute millisecond marks, each fired at most once
    pub time_events_ms: Vec<u64>,
}

/// A progress threshold crossed by the sampled position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The `index`-th interval checkpoint was reached
    Interval { index: u32, checkpoint_ms: u64 },
    /// An absolute time mark was reached
    Time { mark_ms: u64 },
}

impl ProgressEvent {
    fn threshold(&self) -> u64 {
        match self {
            ProgressEvent::Interval { checkpoint_ms, .. } => *checkpoint_ms,
            ProgressEvent::Time { mark_ms } => *mark_ms,
        }
    }
}

/// Single-fire interval/time bookkeeping for one observer.
///
/// Interval checkpoints can only be derived once the duration is known, so
/// the tracker is armed from the prepared callback.
pub struct ProgressTracker {
    interval_count: u32,
    next_interval: u32,
    checkpoints: VecDeque<u64>,
    time_events: BTreeSet<u64>,
}

impl ProgressTracker {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            interval_count: config.interval_count,
            next_interval: 0,
            checkpoints: VecDeque::new(),
            time_events: config.time_events_ms.into_iter().collect(),
        }
    }

    /// Derive the interval checkpoints from the now-known duration:
    /// `i * (duration / N)` for `i in [0, N)`.
    pub fn arm(&mut self, duration_ms: u64) {
        self.checkpoints.clear();
        self.next_interval = 0;
        if self.interval_count > 0 {
            let step_size = duration_ms / self.interval_count as u64;
            for i in 0..self.interval_count as u64 {
                self.checkpoints.push_back(i * step_size);
            }
        }
    }

    /// Drain every threshold crossed by `position_ms`, in ascending threshold
    /// order, each at most once. A single large gap (e.g. after a seek) fires
    /// all crossed thresholds within one call.
    pub fn take_due(&mut self, position_ms: u64) -> Vec<ProgressEvent> {
        let mut due = Vec::new();

        loop {
            let next_checkpoint = self.checkpoints.front().copied().filter(|c| *c <= position_ms);
            let next_mark = self.time_events.iter().next().copied().filter(|m| *m <= position_ms);

            let event = match (next_checkpoint, next_mark) {
                (Some(c), Some(m)) if m < c => ProgressEvent::Time { mark_ms: m },
                (Some(c), _) => ProgressEvent::Interval {
                    index: self.next_interval,
                    checkpoint_ms: c,
                },
                (None, Some(m)) => ProgressEvent::Time { mark_ms: m },
                (None, None) => break,
            };

            match event {
                ProgressEvent::Interval { .. } => {
                    self.checkpoints.pop_front();
                    self.next_interval += 1;
                }
                ProgressEvent::Time { mark_ms } => {
                    self.time_events.remove(&mark_ms);
                }
            }
            due.push(event);
        }

        due
    }
}

/// Periodically samples playback position while playback is active and hands
/// each sample to the service for interval/time-event processing.
///
/// Reschedules itself for `interval - (position % interval)` so samples stay
/// aligned to wall-clock interval boundaries instead of drifting.
pub struct ProgressPoller {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProgressPoller {
    pub fn start(
        position: Arc<dyn Fn() -> u64 + Send + Sync>,
        on_sample: Arc<dyn Fn(u64) + Send + Sync>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let run_flag = running.clone();

        let handle = thread::spawn(move || {
            log::debug!("Progress poller started");

            while run_flag.load(Ordering::Relaxed) {
                let position_ms = position();
                on_sample(position_ms);

                let delay = Self::realign_delay(position_ms);
                Self::interruptible_sleep(&run_flag, delay);
            }

            log::debug!("Progress poller exited");
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    // Delay until the next interval boundary, not a fixed interval, so the
    // sampled positions stay aligned instead of drifting by the time spent
    // in the poll body
    fn realign_delay(position_ms: u64) -> u64 {
        POLL_INTERVAL_MS - (position_ms % POLL_INTERVAL_MS)
    }

    // Sleep in short slices so stop() does not wait out a full poll gap
    fn interruptible_sleep(running: &AtomicBool, total_ms: u64) {
        let mut remaining = total_ms;
        while remaining > 0 && running.load(Ordering::Relaxed) {
            let slice = remaining.min(50);
            thread::sleep(Duration::from_millis(slice));
            remaining -= slice;
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
