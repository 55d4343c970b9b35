//! Background thread driving a [`SliceQueue`].
//!
//! The thread owns the queue. Callers send [`QueueEvent`]s over a
//! channel and read published snapshots; they never touch the queue
//! directly. Jobs run on the worker thread one at a time, and events
//! that arrive while a job runs are applied as soon as it finishes.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::queue::{QueueEvent, SliceQueue};
use crate::types::{PipelineError, ProcessConfig, RgbaImage, Slice};

enum Command {
    Event(QueueEvent),
    Shutdown,
}

/// State the worker publishes after every step.
struct Published {
    slices: Arc<[Slice]>,
    /// Commands applied so far; compared against the sender's count.
    applied: u64,
    settled: bool,
    running: bool,
}

struct Shared {
    state: Mutex<Published>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Published> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for `target` commands to be applied with nothing left to run.
    fn wait_settled(&self, target: u64, timeout: Duration) -> Option<Arc<[Slice]>> {
        let guard = self.lock();
        let (guard, result) = self
            .changed
            .wait_timeout_while(guard, timeout, |p| {
                p.running && !(p.settled && p.applied >= target)
            })
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() || !guard.running {
            return None;
        }
        Some(Arc::clone(&guard.slices))
    }
}

/// Marks the worker stopped when the thread leaves [`run`], even by
/// unwinding out of a job.
struct Stopped<'a>(&'a Shared);

impl Drop for Stopped<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.running = false;
        drop(state);
        self.0.changed.notify_all();
    }
}

/// Handle to a queue running on its own thread.
///
/// Dropping the handle stops the thread after its current job.
pub struct QueueWorker {
    sender: Sender<Command>,
    shared: Arc<Shared>,
    sent: AtomicU64,
    handle: Option<JoinHandle<()>>,
}

impl QueueWorker {
    /// Start a worker with an empty slice list and `config` active.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(config: ProcessConfig) -> io::Result<Self> {
        let queue = SliceQueue::new(config);
        let shared = Arc::new(Shared {
            state: Mutex::new(Published {
                slices: queue.snapshot(),
                applied: 0,
                settled: true,
                running: true,
            }),
            changed: Condvar::new(),
        });
        let (sender, receiver) = mpsc::channel();

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("tilecut-queue".into())
            .spawn(move || run(queue, &receiver, &thread_shared))?;

        Ok(Self {
            sender,
            shared,
            sent: AtomicU64::new(0),
            handle: Some(handle),
        })
    }

    /// Queue an event for the worker.
    ///
    /// Events are applied in send order. Errors from applying an event
    /// (an invalid config, an unknown slice index) are logged by the
    /// worker and the event is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::QueueClosed`] if the worker has stopped.
    pub fn send(&self, event: QueueEvent) -> Result<(), PipelineError> {
        self.sender
            .send(Command::Event(event))
            .map_err(|_| PipelineError::QueueClosed)?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Replace the slice list.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn regenerate(&self, slices: Vec<Slice>) -> Result<(), PipelineError> {
        self.send(QueueEvent::Regenerated(slices))
    }

    /// Switch the active config.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] without sending if
    /// `config` is invalid; otherwise see [`send`](Self::send).
    pub fn set_config(&self, config: ProcessConfig) -> Result<(), PipelineError> {
        config.validate()?;
        self.send(QueueEvent::ConfigChanged(config))
    }

    /// Replace one slice's original pixels.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn replace_original(&self, index: usize, original: RgbaImage) -> Result<(), PipelineError> {
        self.send(QueueEvent::OriginalReplaced { index, original })
    }

    /// Latest published slice list.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[Slice]> {
        Arc::clone(&self.shared.lock().slices)
    }

    /// Block until every event sent so far has been applied and the
    /// queue has nothing left to run.
    ///
    /// Returns the settled slice list, or `None` if `timeout` elapsed
    /// first or the worker stopped.
    #[must_use]
    pub fn wait_until_settled(&self, timeout: Duration) -> Option<Arc<[Slice]>> {
        let target = self.sent.load(Ordering::SeqCst);
        self.shared.wait_settled(target, timeout)
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("slice queue worker panicked");
        }
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut queue: SliceQueue, receiver: &Receiver<Command>, shared: &Shared) {
    let _stopped = Stopped(shared);
    let mut applied = 0u64;
    debug!("slice queue worker started");

    'outer: loop {
        // Apply everything already queued before picking the next job,
        // so a burst of edits only costs one dispatch.
        loop {
            match receiver.try_recv() {
                Ok(Command::Event(event)) => {
                    apply(&mut queue, event);
                    applied += 1;
                }
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => break 'outer,
                Err(TryRecvError::Empty) => break,
            }
        }

        if let Some(job) = queue.next_job() {
            publish(shared, &queue, applied);
            let result = job.run();
            queue.complete(job.ticket, result);
            continue;
        }

        publish(shared, &queue, applied);
        match receiver.recv() {
            Ok(Command::Event(event)) => {
                apply(&mut queue, event);
                applied += 1;
            }
            Ok(Command::Shutdown) | Err(_) => break,
        }
    }

    debug!("slice queue worker stopped");
}

fn apply(queue: &mut SliceQueue, event: QueueEvent) {
    if let Err(e) = queue.apply(event) {
        warn!("ignoring queue event: {e}");
    }
}

fn publish(shared: &Shared, queue: &SliceQueue, applied: u64) {
    let mut state = shared.lock();
    state.slices = queue.snapshot();
    state.applied = applied;
    state.settled = queue.is_settled();
    drop(state);
    shared.changed.notify_all();
}
