//! Startup pipeline: create queues and start a thread pool per configured role

use crate::bus::context::BusContext;
use crate::bus::error::BusResult;
use crate::pipeline::{Observer, PipelineBuilder, PipelineContext, PipelineEvent};
use crate::pipelines::keys;
use crate::pipelines::PipelineKind;
use crate::worker::{DeferredMessageProcessor, PipelineProcessor, Processor, ProcessorThreadPool};
use std::sync::Arc;

pub fn startup_pipeline() -> PipelineBuilder {
    let mut builder = PipelineBuilder::new("Startup");
    builder
        .register_stage("Initializing")
        .with_event(PipelineEvent::OnInitializing)
        .with_event(PipelineEvent::OnCreatePhysicalQueues);
    builder
        .register_stage("Start")
        .with_event(PipelineEvent::OnStartInboxProcessing)
        .with_event(PipelineEvent::OnStartControlInboxProcessing)
        .with_event(PipelineEvent::OnStartOutboxProcessing)
        .with_event(PipelineEvent::OnStartDeferredQueueProcessing);
    builder
        .register_stage("Final")
        .with_event(PipelineEvent::OnStarted);
    builder.register_observer(StartupProcessingObserver);
    builder
}

fn add_pool(context: &mut PipelineContext, pool: ProcessorThreadPool) {
    match context.state.get_mut::<Vec<ProcessorThreadPool>>(keys::PROCESSOR_POOLS) {
        Some(pools) => pools.push(pool),
        None => context.state.set(keys::PROCESSOR_POOLS, vec![pool]),
    }
}

pub struct StartupProcessingObserver;

impl StartupProcessingObserver {
    fn start_inbox(bus: &Arc<BusContext>) -> BusResult<Option<ProcessorThreadPool>> {
        let configuration = bus.configuration();
        let Some(inbox) = configuration.inbox() else {
            return Ok(None);
        };
        let kind = if inbox.distribute {
            PipelineKind::Distribute
        } else {
            PipelineKind::InboxReceive
        };
        let announce = configuration
            .worker()
            .map(|worker| worker.thread_available_notification_interval);
        let idle = inbox.queues.duration_to_sleep_when_idle.clone();

        ProcessorThreadPool::start(
            "inbox",
            inbox.queues.thread_count,
            inbox.queues.work_queue.iter().cloned().collect(),
            || {
                let processor = PipelineProcessor::new(Arc::clone(bus), kind, idle.clone());
                let processor = match announce {
                    Some(interval) => processor.announcing_availability(interval),
                    None => processor,
                };
                Box::new(processor) as Box<dyn Processor>
            },
        )
        .map(Some)
    }

    fn start_role(bus: &Arc<BusContext>, kind: PipelineKind) -> BusResult<Option<ProcessorThreadPool>> {
        let configuration = bus.configuration();
        let (name, role) = match kind {
            PipelineKind::ControlInboxReceive => ("control-inbox", configuration.control_inbox()),
            PipelineKind::OutboxReceive => ("outbox", configuration.outbox()),
            _ => return Ok(None),
        };
        let Some(role) = role else {
            return Ok(None);
        };
        let idle = role.duration_to_sleep_when_idle.clone();

        ProcessorThreadPool::start(
            name,
            role.thread_count,
            role.work_queue.iter().cloned().collect(),
            || Box::new(PipelineProcessor::new(Arc::clone(bus), kind, idle.clone())) as Box<dyn Processor>,
        )
        .map(Some)
    }

    fn start_deferred(bus: &Arc<BusContext>) -> BusResult<Option<ProcessorThreadPool>> {
        let configuration = bus.configuration();
        let (Some(inbox), Some(deferred_queue)) = (configuration.inbox(), configuration.deferred_queue()) else {
            return Ok(None);
        };
        let idle = inbox.queues.duration_to_sleep_when_idle.clone();
        let sweep_pause = inbox.deferred_sweep_pause;

        ProcessorThreadPool::start("deferred", 1, vec![deferred_queue.clone()], || {
            Box::new(DeferredMessageProcessor::new(Arc::clone(bus), idle.clone(), sweep_pause))
                as Box<dyn Processor>
        })
        .map(Some)
    }
}

impl Observer for StartupProcessingObserver {
    fn name(&self) -> &str {
        "StartupProcessingObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[
            PipelineEvent::OnInitializing,
            PipelineEvent::OnCreatePhysicalQueues,
            PipelineEvent::OnStartInboxProcessing,
            PipelineEvent::OnStartControlInboxProcessing,
            PipelineEvent::OnStartOutboxProcessing,
            PipelineEvent::OnStartDeferredQueueProcessing,
            PipelineEvent::OnStarted,
        ]
    }

    fn on_event(&self, event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let configuration = bus.configuration();

        let pool = match event {
            PipelineEvent::OnInitializing => {
                log::debug!("Initializing service bus: {:?}", configuration);
                None
            }
            PipelineEvent::OnCreatePhysicalQueues => {
                if configuration.create_queues() {
                    configuration
                        .queue_manager()
                        .create_physical_queues(configuration.configured_queues())?;
                }
                None
            }
            PipelineEvent::OnStartInboxProcessing => Self::start_inbox(&bus)?,
            PipelineEvent::OnStartControlInboxProcessing => {
                Self::start_role(&bus, PipelineKind::ControlInboxReceive)?
            }
            PipelineEvent::OnStartOutboxProcessing => Self::start_role(&bus, PipelineKind::OutboxReceive)?,
            PipelineEvent::OnStartDeferredQueueProcessing => Self::start_deferred(&bus)?,
            PipelineEvent::OnStarted => {
                log::info!(
                    "Service bus started (inbox: {}, control inbox: {}, outbox: {}, deferred: {})",
                    configuration.has_inbox(),
                    configuration.has_control_inbox(),
                    configuration.has_outbox(),
                    configuration.has_deferred_queue()
                );
                None
            }
            _ => None,
        };

        if let Some(pool) = pool {
            add_pool(context, pool);
        }
        Ok(())
    }
}
