//! Test modules for the pipeline engine


use crate::bus::error::{BusResult, ServiceBusError};
use crate::pipeline::{PipelineContext, PipelineEvent, Observer};
use std::sync::{Arc, Mutex};

/// Shared journal of observer calls
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

/// Observer that records each call and optionally fails or aborts
pub(crate) struct Recorder {
    pub label: &'static str,
    pub events: Vec<PipelineEvent>,
    pub journal: Journal,
    pub fail_on: Option<PipelineEvent>,
    pub abort_on: Option<PipelineEvent>,
}

impl Recorder {
    pub fn new(label: &'static str, events: &[PipelineEvent], journal: &Journal) -> Self {
        Self {
            label,
            events: events.to_vec(),
            journal: Arc::clone(journal),
            fail_on: None,
            abort_on: None,
        }
    }

    pub fn failing_on(mut self, event: PipelineEvent) -> Self {
        self.fail_on = Some(event);
        self
    }

    pub fn aborting_on(mut self, event: PipelineEvent) -> Self {
        self.abort_on = Some(event);
        self
    }
}

impl Observer for Recorder {
    fn name(&self) -> &str {
        self.label
    }

    fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    fn on_event(&self, event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.label, event));
        if self.fail_on == Some(event) {
            return Err(ServiceBusError::HandlerNotFound {
                message_type: self.label.to_string(),
            });
        }
        if self.abort_on == Some(event) {
            context.abort();
        }
        Ok(())
    }
}

pub(crate) fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}
