// Background job thread for decode-adjacent side effects
// Media work must never run on the host's coordination thread

use crossbeam_channel::{unbounded, Sender};
use std::thread;

type Job = Box<dyn FnOnce() + Send>;

/// Single worker thread fed by a job queue. Jobs run in submission order;
/// shutdown closes the queue, drains already-queued jobs and joins the
/// thread.
pub struct BackgroundWorker {
    sender: Option<Sender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BackgroundWorker {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<Job>();

        let handle = thread::spawn(move || {
            log::debug!("Background worker started");
            while let Ok(job) = receiver.recv() {
                job();
            }
            log::debug!("Background worker exited");
        });

        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    /// Queue a job for execution on the worker thread. Dropped silently if
    /// the worker has already shut down.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = self.sender.as_ref() {
            if sender.send(Box::new(job)).is_err() {
                log::warn!("Background worker is gone; job dropped");
            }
        }
    }

    pub fn shutdown(&mut self) {
        // Closing the channel ends the worker loop
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for BackgroundWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_jobs_run_in_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut worker = BackgroundWorker::new();

        for i in 0..4 {
            let sink = seen.clone();
            worker.post(move || sink.lock().push(i));
        }
        worker.shutdown();

        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_post_after_shutdown_is_a_noop() {
        let mut worker = BackgroundWorker::new();
        worker.shutdown();
        worker.post(|| panic!("must not run"));
    }
}
