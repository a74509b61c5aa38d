//! Pipeline execution

use crate::bus::error::{BusResult, ServiceBusError};
use crate::pipeline::definition::PipelineDefinition;
use crate::pipeline::event::PipelineEvent;
use crate::pipeline::observer::ExceptionDisposition;
use crate::pipeline::state::State;
use std::sync::Arc;

/// Outcome of a pipeline execution that did not propagate an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    Aborted,
}

/// Mutable view handed to observers
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub state: State,
    aborted: bool,
    current_event: Option<PipelineEvent>,
    exception: Option<String>,
    exception_handled: bool,
}

impl PipelineContext {
    /// Skip every remaining non-teardown event
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn current_event(&self) -> Option<PipelineEvent> {
        self.current_event
    }

    /// Description of the failure currently being raised, if any
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    pub fn exception_handled(&self) -> bool {
        self.exception_handled
    }

    fn reset(&mut self) {
        self.state.clear();
        self.aborted = false;
        self.current_event = None;
        self.exception = None;
        self.exception_handled = false;
    }
}

/// An executable instance of a [`PipelineDefinition`]
pub struct Pipeline {
    definition: Arc<PipelineDefinition>,
    context: PipelineContext,
    executed: bool,
}

impl Pipeline {
    pub fn new(definition: Arc<PipelineDefinition>) -> Self {
        Self {
            definition,
            context: PipelineContext::default(),
            executed: false,
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn state(&self) -> &State {
        &self.context.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.context.state
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn is_aborted(&self) -> bool {
        self.context.aborted
    }

    /// Clear all per-execution state so the instance can run again
    pub fn reset(&mut self) {
        self.context.reset();
        self.executed = false;
    }

    /// Run every stage in order
    ///
    /// Observer failures are offered to the exception observers. The first
    /// failure none of them handles is returned once teardown events have run.
    pub fn execute(&mut self) -> BusResult<ExecutionStatus> {
        if self.executed {
            return Err(ServiceBusError::Pipeline {
                pipeline: self.name().to_string(),
                message: "pipeline must be reset before it is executed again".to_string(),
            });
        }
        self.executed = true;

        let definition = Arc::clone(&self.definition);
        let mut failure: Option<ServiceBusError> = None;

        for stage in definition.stages() {
            for step in stage.events() {
                if self.context.aborted && !step.teardown {
                    continue;
                }
                self.context.current_event = Some(step.event);

                for observer in definition.observers_for(step.event) {
                    if let Err(error) = observer.on_event(step.event, &mut self.context) {
                        log::debug!(
                            "Observer '{}' failed on {} in pipeline '{}': {}",
                            observer.name(),
                            step.event,
                            definition.name(),
                            error
                        );
                        self.context.aborted = true;
                        if let Some(unhandled) = self.raise(&definition, error) {
                            if failure.is_none() {
                                failure = Some(unhandled);
                            } else {
                                log::error!(
                                    "Additional failure in pipeline '{}' during {}: {}",
                                    definition.name(),
                                    step.event,
                                    unhandled
                                );
                            }
                        }
                    }
                    if self.context.aborted && !step.teardown {
                        break;
                    }
                }
            }
        }

        self.context.current_event = None;

        match failure {
            Some(error) => Err(error),
            None if self.context.aborted => Ok(ExecutionStatus::Aborted),
            None => Ok(ExecutionStatus::Completed),
        }
    }

    /// Offer an error to the exception observers; returns it when nobody handled it
    fn raise(&mut self, definition: &PipelineDefinition, error: ServiceBusError) -> Option<ServiceBusError> {
        self.context.exception = Some(error.to_string());
        self.context.exception_handled = false;

        for observer in definition.exception_observers() {
            if observer.on_exception(&error, &mut self.context) == ExceptionDisposition::Handled {
                log::debug!(
                    "Exception in pipeline '{}' handled by '{}'",
                    definition.name(),
                    observer.name()
                );
                self.context.exception_handled = true;
                break;
            }
        }

        self.context.aborted = true;
        if self.context.exception_handled {
            None
        } else {
            Some(error)
        }
    }
}
