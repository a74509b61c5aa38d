//! Service bus orchestrator
//!
//! Owns the lifecycle of one bus instance: validation and startup of the
//! processor thread pools, and an orderly stop.

use crate::bus::collaborators::Module;
use crate::bus::config::{ServiceBusConfiguration, ServiceBusConfigurationBuilder};
use crate::bus::context::BusContext;
use crate::bus::error::{BusResult, ServiceBusError};
use crate::bus::message_context::MessageContext;
use crate::message::{BusMessage, TransportMessage};
use crate::pipelines::{execute_pipeline, keys, PipelineKind, PipelineOutcome};
use crate::worker::ProcessorThreadPool;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

enum Lifecycle {
    Created,
    Starting,
    Started(Vec<ProcessorThreadPool>),
    Stopped,
}

pub struct ServiceBus {
    context: Arc<BusContext>,
    lifecycle: Mutex<Lifecycle>,
}

impl ServiceBus {
    pub fn builder() -> ServiceBusConfigurationBuilder {
        ServiceBusConfigurationBuilder::new()
    }

    pub fn new(configuration: ServiceBusConfiguration) -> BusResult<Self> {
        Ok(Self {
            context: BusContext::new(configuration)?,
            lifecycle: Mutex::new(Lifecycle::Created),
        })
    }

    pub fn context(&self) -> &Arc<BusContext> {
        &self.context
    }

    pub fn configuration(&self) -> &ServiceBusConfiguration {
        self.context.configuration()
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Started(_))
    }

    /// Validate the configuration and start a thread pool per configured role
    ///
    /// Nothing is left running when this fails.
    pub fn start(&self) -> BusResult<()> {
        {
            let mut lifecycle = self.lifecycle();
            match *lifecycle {
                Lifecycle::Created => *lifecycle = Lifecycle::Starting,
                Lifecycle::Starting | Lifecycle::Started(_) => return Err(ServiceBusError::AlreadyStarted),
                Lifecycle::Stopped => return Err(ServiceBusError::Stopped),
            }
        }

        match self.start_processing() {
            Ok(pools) => {
                *self.lifecycle() = Lifecycle::Started(pools);
            }
            Err(e) => {
                *self.lifecycle() = Lifecycle::Created;
                return Err(e);
            }
        }

        if self.configuration().is_worker() {
            if let Err(e) = self.context.notify_worker_started() {
                log::warn!("Could not notify the distributor that this worker started: {}", e);
            }
        }
        Ok(())
    }

    /// Modules initialized before a failure are disposed again
    fn start_processing(&self) -> BusResult<Vec<ProcessorThreadPool>> {
        self.validate_configuration()?;

        let modules = self.configuration().modules();
        for (index, module) in modules.iter().enumerate() {
            log::debug!("Initializing module '{}'", module.name());
            if let Err(e) = module.initialize(self) {
                dispose_modules(&modules[..index]);
                return Err(e);
            }
        }

        self.run_startup_pipeline().inspect_err(|_| dispose_modules(modules))
    }

    /// Pools started by a failed execution are disposed with the pipeline state
    fn run_startup_pipeline(&self) -> BusResult<Vec<ProcessorThreadPool>> {
        let mut pipeline = self.context.pipelines().acquire(PipelineKind::Startup)?;
        pipeline.execute()?;
        Ok(pipeline
            .state_mut()
            .take::<Vec<ProcessorThreadPool>>(keys::PROCESSOR_POOLS)
            .unwrap_or_default())
    }

    /// Check collaborators, queue roles and algorithm names without starting anything
    pub fn validate_configuration(&self) -> BusResult<()> {
        let configuration = self.configuration();
        configuration.serializer()?;
        configuration.message_handler_factory()?;

        if configuration.is_worker() && !configuration.has_inbox() {
            return Err(ServiceBusError::WorkerConfigurationInvalid {
                message: "a worker requires an inbox".to_string(),
            });
        }

        configuration.validate_required_queues()?;

        if !configuration.compression_algorithm().is_empty() {
            configuration.find_compression_algorithm(configuration.compression_algorithm())?;
        }
        if !configuration.encryption_algorithm().is_empty() {
            configuration.find_encryption_algorithm(configuration.encryption_algorithm())?;
        }
        Ok(())
    }

    /// Stop every processor thread and release the queues
    ///
    /// Returns once all threads have exited. A stopped bus cannot be started
    /// again; calling this on a bus that is not running does nothing.
    pub fn stop(&self) {
        let pools = {
            let mut lifecycle = self.lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Started(pools) => pools,
                previous => {
                    *lifecycle = previous;
                    return;
                }
            }
        };

        log::info!("Stopping service bus");
        if self.configuration().is_worker() {
            if let Err(e) = self.context.notify_worker_stopped() {
                log::warn!("Could not notify the distributor that this worker stopped: {}", e);
            }
        }

        dispose_modules(self.configuration().modules());

        for mut pool in pools {
            pool.dispose();
        }

        if let Err(e) = self.configuration().queue_manager().dispose() {
            log::warn!("Queue manager did not dispose cleanly: {}", e);
        }
        self.context.pipelines().clear();
        log::info!("Service bus stopped");
    }

    /// Run one execution of a pipeline on the calling thread
    pub fn process_once(&self, kind: PipelineKind) -> BusResult<PipelineOutcome> {
        execute_pipeline(&self.context, kind)
    }

    pub fn send<M: BusMessage>(&self, message: &M) -> BusResult<TransportMessage> {
        self.context.send(&MessageContext::new(), message)
    }

    pub fn send_to<M: BusMessage>(&self, uri: &str, message: &M) -> BusResult<TransportMessage> {
        self.context.send_to(&MessageContext::new(), uri, message)
    }

    pub fn send_local<M: BusMessage>(&self, message: &M) -> BusResult<TransportMessage> {
        self.context.send_local(&MessageContext::new(), message)
    }

    pub fn send_deferred<M: BusMessage>(
        &self,
        at: DateTime<Utc>,
        message: &M,
        uri: Option<&str>,
    ) -> BusResult<TransportMessage> {
        self.context.send_deferred(&MessageContext::new(), at, message, uri)
    }

    pub fn send_deferred_local<M: BusMessage>(&self, at: DateTime<Utc>, message: &M) -> BusResult<TransportMessage> {
        self.context.send_deferred_local(&MessageContext::new(), at, message)
    }

    /// Replies need a message being handled; use the handler's context instead
    pub fn send_reply<M: BusMessage>(&self, message: &M) -> BusResult<TransportMessage> {
        self.context.send_reply(&MessageContext::new(), message)
    }

    pub fn publish<M: BusMessage>(&self, message: &M) -> BusResult<Vec<String>> {
        self.context.publish(&MessageContext::new(), message)
    }

    pub fn send_transport_message(&self, transport_message: &TransportMessage) -> BusResult<()> {
        self.context.send_transport_message(transport_message)
    }
}

fn dispose_modules(modules: &[Arc<dyn Module>]) {
    for module in modules {
        log::debug!("Disposing module '{}'", module.name());
        module.dispose();
    }
}

impl Drop for ServiceBus {
    fn drop(&mut self) {
        self.stop();
    }
}
