//! Static pipeline composition
//!
//! A [`PipelineBuilder`] collects stages and observers; `build` freezes them into
//! a [`PipelineDefinition`] that is shared read-only by every execution of the
//! same pipeline type.

use crate::pipeline::event::PipelineEvent;
use crate::pipeline::observer::{ExceptionObserver, Observer};
use std::collections::HashMap;
use std::sync::Arc;

/// One event slot in a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEvent {
    pub event: PipelineEvent,
    /// Teardown events still run after the pipeline has been aborted
    pub teardown: bool,
}

#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    events: Vec<StageEvent>,
}

impl Stage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &[StageEvent] {
        &self.events
    }
}

pub struct StageBuilder<'a> {
    stage: &'a mut Stage,
}

impl<'a> StageBuilder<'a> {
    pub fn with_event(self, event: PipelineEvent) -> Self {
        self.stage.events.push(StageEvent {
            event,
            teardown: false,
        });
        self
    }

    pub fn with_teardown_event(self, event: PipelineEvent) -> Self {
        self.stage.events.push(StageEvent {
            event,
            teardown: true,
        });
        self
    }
}

pub struct PipelineBuilder {
    name: String,
    stages: Vec<Stage>,
    observers: Vec<Arc<dyn Observer>>,
    exception_observers: Vec<Arc<dyn ExceptionObserver>>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            observers: Vec::new(),
            exception_observers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a stage; its events run after every previously registered stage
    pub fn register_stage(&mut self, name: impl Into<String>) -> StageBuilder<'_> {
        self.stages.push(Stage {
            name: name.into(),
            events: Vec::new(),
        });
        let last = self.stages.len() - 1;
        StageBuilder {
            stage: &mut self.stages[last],
        }
    }

    pub fn register_observer(&mut self, observer: impl Observer + 'static) -> &mut Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn register_shared_observer(&mut self, observer: Arc<dyn Observer>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    pub fn register_exception_observer(
        &mut self,
        observer: impl ExceptionObserver + 'static,
    ) -> &mut Self {
        self.exception_observers.push(Arc::new(observer));
        self
    }

    pub fn build(self) -> PipelineDefinition {
        let scripted: Vec<PipelineEvent> = self
            .stages
            .iter()
            .flat_map(|stage| stage.events.iter().map(|e| e.event))
            .collect();

        let mut table: HashMap<PipelineEvent, Vec<Arc<dyn Observer>>> = HashMap::new();
        for observer in &self.observers {
            for event in observer.events() {
                if !scripted.contains(event) {
                    log::debug!(
                        "Observer '{}' subscribes to {} which pipeline '{}' never raises",
                        observer.name(),
                        event,
                        self.name
                    );
                }
                table.entry(*event).or_default().push(Arc::clone(observer));
            }
        }

        PipelineDefinition {
            name: self.name,
            stages: self.stages,
            observers: table,
            exception_observers: self.exception_observers,
        }
    }
}

/// Frozen pipeline script with its observer table
pub struct PipelineDefinition {
    name: String,
    stages: Vec<Stage>,
    observers: HashMap<PipelineEvent, Vec<Arc<dyn Observer>>>,
    exception_observers: Vec<Arc<dyn ExceptionObserver>>,
}

impl PipelineDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn observers_for(&self, event: PipelineEvent) -> &[Arc<dyn Observer>] {
        self.observers
            .get(&event)
            .map(|observers| observers.as_slice())
            .unwrap_or(&[])
    }

    pub fn exception_observers(&self) -> &[Arc<dyn ExceptionObserver>] {
        &self.exception_observers
    }
}
