//! Observer contracts

use crate::bus::error::{BusResult, ServiceBusError};
use crate::pipeline::event::PipelineEvent;
use crate::pipeline::pipeline::PipelineContext;

pub trait Observer: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Event kinds this observer subscribes to
    fn events(&self) -> &[PipelineEvent];

    fn on_event(&self, event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()>;
}

/// Outcome reported by an exception observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionDisposition {
    /// The failure has been dealt with and must not reach the caller
    Handled,
    /// Leave the failure for the next exception observer or the caller
    Propagate,
}

pub trait ExceptionObserver: Send + Sync {
    fn name(&self) -> &str;

    fn on_exception(
        &self,
        error: &ServiceBusError,
        context: &mut PipelineContext,
    ) -> ExceptionDisposition;
}
