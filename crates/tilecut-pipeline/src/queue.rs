//! Serialized scheduling of slice processing.
//!
//! [`SliceQueue`] is a plain state machine: it never runs a transform
//! itself. A driver asks it for the next [`Job`], runs the job wherever
//! it likes (same thread, a worker thread, a test), and reports back with
//! [`SliceQueue::complete`]. At most one job is handed out at a time, and
//! jobs go out in ascending slice index order.
//!
//! Every config change, regeneration, or original replacement that lands
//! while a job is out marks that job stale. Its result is still accepted
//! (freeing the slot) but thrown away, and the slice goes back to
//! `pending` so it is reprocessed under the current inputs.
//!
//! Observers read [`SliceQueue::snapshot`], a cheap `Arc` of the whole
//! list. The queue copies the list on write when a snapshot is still
//! alive, so a snapshot never changes underneath its holder.

use std::sync::Arc;

use log::{debug, warn};

use crate::diagnostics::{Clock, SliceDiagnostics, process_slice_with_diagnostics};
use crate::process::process_slice;
use crate::types::{PipelineError, ProcessConfig, RgbaImage, Slice, SliceId, SliceStatus};

/// Handle identifying one dispatched job.
///
/// Only the ticket of the job currently in flight is accepted by
/// [`SliceQueue::complete`]; anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    /// Slice the job was dispatched for.
    pub id: SliceId,
    serial: u64,
}

/// Work handed out by [`SliceQueue::next_job`].
#[derive(Debug, Clone)]
pub struct Job {
    /// Return this with the result.
    pub ticket: Ticket,
    /// Unprocessed pixels of the slice at dispatch time.
    pub original: Arc<RgbaImage>,
    /// Config active at dispatch time.
    pub config: ProcessConfig,
}

impl Job {
    /// Run the processing pipeline for this job.
    ///
    /// # Errors
    ///
    /// Propagates any [`process_slice`] failure.
    pub fn run(&self) -> Result<RgbaImage, PipelineError> {
        process_slice(&self.original, &self.config)
    }

    /// Like [`run`](Self::run), also timing each stage with `clock`.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn run_with_diagnostics<C: Clock>(
        &self,
        clock: &C,
    ) -> Result<(RgbaImage, SliceDiagnostics), PipelineError> {
        process_slice_with_diagnostics(&self.original, &self.config, clock)
    }
}

/// Inputs that drive the queue.
#[derive(Debug)]
pub enum QueueEvent {
    /// Crop or grid changed; the slice list was rebuilt from scratch.
    Regenerated(Vec<Slice>),
    /// Processing config changed.
    ConfigChanged(ProcessConfig),
    /// One slice's original was replaced by an external edit.
    OriginalReplaced {
        /// Position in the current slice list.
        index: usize,
        /// New unprocessed pixels.
        original: RgbaImage,
    },
    /// A dispatched job finished.
    Completed {
        /// Ticket from the [`Job`].
        ticket: Ticket,
        /// Outcome of [`Job::run`].
        result: Result<RgbaImage, PipelineError>,
    },
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: Ticket,
    stale: bool,
}

/// Scheduler owning the slice list and the single in-flight slot.
#[derive(Debug)]
pub struct SliceQueue {
    slices: Arc<[Slice]>,
    config: ProcessConfig,
    in_flight: Option<InFlight>,
    next_serial: u64,
}

impl Default for SliceQueue {
    fn default() -> Self {
        Self::new(ProcessConfig::default())
    }
}

impl SliceQueue {
    /// Empty queue with the given active config.
    #[must_use]
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            slices: Arc::from(Vec::new()),
            config,
            in_flight: None,
            next_serial: 0,
        }
    }

    /// Current slice list. Cheap; the returned list never changes.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[Slice]> {
        Arc::clone(&self.slices)
    }

    /// Active config.
    #[must_use]
    pub const fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Ticket of the job currently out, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<Ticket> {
        self.in_flight.map(|f| f.ticket)
    }

    /// Number of slices in `status`.
    #[must_use]
    pub fn count(&self, status: SliceStatus) -> usize {
        self.slices.iter().filter(|s| s.status == status).count()
    }

    /// No job is out and nothing is waiting for one.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.in_flight.is_none()
            && !self
                .slices
                .iter()
                .any(|s| matches!(s.status, SliceStatus::Pending | SliceStatus::Processing))
    }

    /// Feed one event into the queue.
    ///
    /// # Errors
    ///
    /// See [`set_config`](Self::set_config) and
    /// [`replace_original`](Self::replace_original). A failed event
    /// leaves the queue unchanged.
    pub fn apply(&mut self, event: QueueEvent) -> Result<(), PipelineError> {
        match event {
            QueueEvent::Regenerated(slices) => self.regenerate(slices),
            QueueEvent::ConfigChanged(config) => self.set_config(config)?,
            QueueEvent::OriginalReplaced { index, original } => {
                self.replace_original(index, original)?;
            }
            QueueEvent::Completed { ticket, result } => self.complete(ticket, result),
        }
        Ok(())
    }

    /// Replace the whole slice list.
    ///
    /// Incoming statuses and processed buffers are discarded: every
    /// slice starts `pending` if the active config needs processing and
    /// `idle` otherwise. A job still out keeps the slot until it
    /// completes; its result is dropped.
    pub fn regenerate(&mut self, slices: Vec<Slice>) {
        let needs = self.config.needs_processing();
        self.mark_stale();
        self.slices = slices
            .into_iter()
            .map(|mut slice| {
                slice.processed = None;
                slice.error = None;
                slice.status = if needs {
                    SliceStatus::Pending
                } else {
                    SliceStatus::Idle
                };
                slice
            })
            .collect();
        debug!(
            "regenerated {} slices ({})",
            self.slices.len(),
            if needs { "pending" } else { "idle" }
        );
    }

    /// Switch to a new config.
    ///
    /// Equal configs are a no-op. Otherwise every slice that is not
    /// currently `processing` loses its processed buffer and is
    /// rescheduled: `pending` when the new config needs processing, else
    /// `idle`. The slice in flight follows once its job completes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// [`ProcessConfig::validate`].
    pub fn set_config(&mut self, config: ProcessConfig) -> Result<(), PipelineError> {
        config.validate()?;
        if config == self.config {
            return Ok(());
        }
        self.config = config;
        self.mark_stale();

        let needs = self.config.needs_processing();
        for slice in Arc::make_mut(&mut self.slices) {
            if slice.status != SliceStatus::Processing {
                reschedule(slice, needs);
            }
        }
        debug!(
            "config changed: {} pending, {} processing",
            self.count(SliceStatus::Pending),
            self.count(SliceStatus::Processing)
        );
        Ok(())
    }

    /// Replace the original pixels of one slice.
    ///
    /// The slice is rescheduled the same way a config change would
    /// reschedule it; other slices are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownSlice`] if `index` is out of range.
    pub fn replace_original(
        &mut self,
        index: usize,
        original: RgbaImage,
    ) -> Result<(), PipelineError> {
        let len = self.slices.len();
        if index >= len {
            return Err(PipelineError::UnknownSlice { index, len });
        }

        let needs = self.config.needs_processing();
        let slices = Arc::make_mut(&mut self.slices);
        let slice = &mut slices[index];
        slice.original = Arc::new(original);
        if slice.status == SliceStatus::Processing {
            if let Some(in_flight) = self.in_flight.as_mut()
                && in_flight.ticket.id == slice.id
            {
                in_flight.stale = true;
            }
        } else {
            reschedule(slice, needs);
        }
        debug!("slice {} original replaced ({})", slice.id, slice.status);
        Ok(())
    }

    /// Claim the in-flight slot for the lowest-index `pending` slice.
    ///
    /// Returns `None` while a job is already out, when nothing is
    /// pending, or when the active config needs no processing.
    pub fn next_job(&mut self) -> Option<Job> {
        if self.in_flight.is_some() || !self.config.needs_processing() {
            return None;
        }
        let index = self
            .slices
            .iter()
            .position(|s| s.status == SliceStatus::Pending)?;

        let slices = Arc::make_mut(&mut self.slices);
        let slice = &mut slices[index];
        slice.status = SliceStatus::Processing;

        let ticket = Ticket {
            id: slice.id,
            serial: self.next_serial,
        };
        self.next_serial = self.next_serial.wrapping_add(1);
        self.in_flight = Some(InFlight {
            ticket,
            stale: false,
        });
        debug!("dispatching slice {}", ticket.id);

        Some(Job {
            ticket,
            original: Arc::clone(&slice.original),
            config: self.config.clone(),
        })
    }

    /// Report the outcome of a dispatched job and free the slot.
    ///
    /// Unknown tickets are ignored. A stale result is dropped and its
    /// slice rescheduled. On success the slice becomes `done`; on
    /// failure it becomes `idle` with [`Slice::error`] set and its
    /// processed buffer left as it was (always empty once dispatched,
    /// since dispatch only follows a reschedule).
    pub fn complete(&mut self, ticket: Ticket, result: Result<RgbaImage, PipelineError>) {
        let Some(in_flight) = self.in_flight.take_if(|f| f.ticket == ticket) else {
            debug!("ignoring completion for unknown ticket {}", ticket.id);
            return;
        };

        let needs = self.config.needs_processing();
        let Some(index) = self.position(ticket.id) else {
            debug!("dropping result for slice {} from a previous generation", ticket.id);
            return;
        };
        let slice = &mut Arc::make_mut(&mut self.slices)[index];

        if in_flight.stale {
            debug!("dropping stale result for slice {}", ticket.id);
            reschedule(slice, needs);
            return;
        }

        match result {
            Ok(buffer) => {
                debug!(
                    "slice {} done ({}x{})",
                    ticket.id,
                    buffer.width(),
                    buffer.height()
                );
                slice.processed = Some(Arc::new(buffer));
                slice.error = None;
                slice.status = SliceStatus::Done;
            }
            Err(e) => {
                warn!("processing slice {} failed: {e}", ticket.id);
                slice.error = Some(e.to_string());
                slice.status = SliceStatus::Idle;
            }
        }
    }

    fn position(&self, id: SliceId) -> Option<usize> {
        self.slices
            .get(id.index)
            .filter(|s| s.id == id)
            .map(|_| id.index)
    }

    fn mark_stale(&mut self) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.stale = true;
        }
    }
}

/// Drop any result made under previous inputs and requeue (or idle) the slice.
fn reschedule(slice: &mut Slice, needs_processing: bool) {
    slice.processed = None;
    slice.error = None;
    slice.status = if needs_processing {
        SliceStatus::Pending
    } else {
        SliceStatus::Idle
    };
}

/// Drain the queue on the calling thread.
///
/// Returns the number of jobs run. Jobs are run in dispatch order, one
/// at a time, so the result is the same as a background worker would
/// produce for the same inputs.
pub fn run_to_completion(queue: &mut SliceQueue) -> usize {
    let mut jobs = 0;
    while let Some(job) = queue.next_job() {
        let result = job.run();
        queue.complete(job.ticket, result);
        jobs += 1;
    }
    jobs
}
