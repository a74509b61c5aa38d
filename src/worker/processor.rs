//! Per-thread processing loops

use crate::bus::context::BusContext;
use crate::pipelines::{execute_pipeline, DeferredOutcome, PipelineKind};
use crate::worker::activity::{ActivitySignal, ThreadActivity};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One unit of work repeated by a processor thread until its pool stops
pub trait Processor: Send {
    fn execute(&mut self, signal: &ActivitySignal);
}

/// Runs a receive pipeline once per call, backing off while the queue is idle
pub struct PipelineProcessor {
    bus: Arc<BusContext>,
    kind: PipelineKind,
    activity: ThreadActivity,
    availability_interval: Option<Duration>,
    last_announced: Instant,
}

impl PipelineProcessor {
    pub fn new(bus: Arc<BusContext>, kind: PipelineKind, idle_durations: Vec<Duration>) -> Self {
        Self {
            bus,
            kind,
            activity: ThreadActivity::new(idle_durations),
            availability_interval: None,
            last_announced: Instant::now(),
        }
    }

    /// Re-announce this worker to its distributor every `interval`
    pub fn announcing_availability(mut self, interval: Duration) -> Self {
        self.availability_interval = Some(interval);
        self
    }

    fn announce_if_due(&mut self) {
        let Some(interval) = self.availability_interval else {
            return;
        };
        if self.last_announced.elapsed() < interval {
            return;
        }
        self.last_announced = Instant::now();
        if let Err(e) = self.bus.notify_worker_started() {
            log::warn!("Could not announce worker availability: {}", e);
        }
    }
}

impl Processor for PipelineProcessor {
    fn execute(&mut self, signal: &ActivitySignal) {
        match execute_pipeline(&self.bus, self.kind) {
            Ok(outcome) if outcome.working && !outcome.failed => self.activity.working(),
            Ok(_) => self.activity.waiting(signal),
            Err(e) => {
                log::error!("{} pipeline failed: {}", self.kind, e);
                self.activity.waiting(signal);
            }
        }
        self.announce_if_due();
    }
}

/// Sweeps the deferred queue, pausing after every full pass
///
/// The first message requeued in a pass marks the start of the sweep. Meeting
/// it again means every deferred message has been looked at once.
pub struct DeferredMessageProcessor {
    bus: Arc<BusContext>,
    activity: ThreadActivity,
    sweep_pause: Duration,
    sweep_marker: Option<Uuid>,
}

impl DeferredMessageProcessor {
    pub fn new(bus: Arc<BusContext>, idle_durations: Vec<Duration>, sweep_pause: Duration) -> Self {
        Self {
            bus,
            activity: ThreadActivity::new(idle_durations),
            sweep_pause,
            sweep_marker: None,
        }
    }
}

impl Processor for DeferredMessageProcessor {
    fn execute(&mut self, signal: &ActivitySignal) {
        let outcome = match execute_pipeline(&self.bus, PipelineKind::DeferredReceive) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Deferred pipeline failed: {}", e);
                self.activity.waiting(signal);
                return;
            }
        };

        match outcome.deferred {
            Some(DeferredOutcome::Requeued(message_id)) => {
                if self.sweep_marker == Some(message_id) {
                    log::trace!("Deferred sweep complete; pausing for {:?}", self.sweep_pause);
                    signal.wait(self.sweep_pause);
                } else if self.sweep_marker.is_none() {
                    self.sweep_marker = Some(message_id);
                }
            }
            Some(DeferredOutcome::Forwarded(message_id)) => {
                if self.sweep_marker == Some(message_id) {
                    self.sweep_marker = None;
                }
                self.activity.working();
            }
            None => {
                self.sweep_marker = None;
                self.activity.waiting(signal);
            }
        }
    }
}
