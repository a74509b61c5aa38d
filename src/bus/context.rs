//! Shared state of one service bus instance
//!
//! [`BusContext`] owns the configuration, the pipeline pool and the worker
//! registry. Pipelines receive it through their state when they are obtained
//! from the pool, and handlers reach it through their [`HandlerContext`].
//!
//! [`HandlerContext`]: crate::bus::handlers::HandlerContext

use crate::bus::config::ServiceBusConfiguration;
use crate::bus::error::{BusResult, ServiceBusError};
use crate::bus::message_context::MessageContext;
use crate::message::{message_type_name, BusMessage, TransportMessage, SEND_IMMEDIATELY};
use crate::pipeline::{Pipeline, PipelinePool};
use crate::pipelines::{self, keys, PipelineKind};
use crate::queue::api::QueueHandle;
use crate::worker::{WorkerAvailability, WorkerStarted, WorkerStopped};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Weak};

pub struct BusContext {
    configuration: ServiceBusConfiguration,
    pipelines: PipelinePool<PipelineKind>,
    worker_availability: WorkerAvailability,
}

impl BusContext {
    pub fn new(configuration: ServiceBusConfiguration) -> BusResult<Arc<Self>> {
        let worker_availability = WorkerAvailability::new();
        if let Some(inbox) = configuration.inbox() {
            for uri in &inbox.distributor_workers {
                worker_availability.register(uri)?;
            }
        }
        let modules = configuration.modules().to_vec();

        Ok(Arc::new_cyclic(|weak: &Weak<BusContext>| {
            let weak = weak.clone();
            let pipelines = PipelinePool::new(move |kind: &PipelineKind| Ok(pipelines::define(*kind, &modules)))
                .with_obtained(move |kind, pipeline| {
                    let bus = weak.upgrade().ok_or_else(|| ServiceBusError::Pipeline {
                        pipeline: kind.to_string(),
                        message: "the service bus has been dropped".to_string(),
                    })?;
                    bus.prepare(*kind, pipeline);
                    Ok(())
                });
            BusContext {
                configuration,
                pipelines,
                worker_availability,
            }
        }))
    }

    /// Seed a freshly obtained pipeline with the bus and the queues it works on
    fn prepare(self: &Arc<Self>, kind: PipelineKind, pipeline: &mut Pipeline) {
        let configuration = &self.configuration;
        let (work_queue, error_queue) = match kind {
            PipelineKind::InboxReceive | PipelineKind::Distribute => match configuration.inbox() {
                Some(inbox) => (inbox.queues.work_queue.as_ref(), inbox.queues.error_queue.as_ref()),
                None => (None, None),
            },
            PipelineKind::ControlInboxReceive => match configuration.control_inbox() {
                Some(control) => (control.work_queue.as_ref(), control.error_queue.as_ref()),
                None => (None, None),
            },
            PipelineKind::OutboxReceive => match configuration.outbox() {
                Some(outbox) => (outbox.work_queue.as_ref(), outbox.error_queue.as_ref()),
                None => (None, None),
            },
            PipelineKind::DeferredReceive => (
                configuration.deferred_queue(),
                configuration.inbox().and_then(|inbox| inbox.queues.error_queue.as_ref()),
            ),
            PipelineKind::Startup | PipelineKind::Send | PipelineKind::SendTransport => (None, None),
        };

        let state = pipeline.state_mut();
        state.set(keys::BUS, Arc::clone(self));
        if let Some(queue) = work_queue {
            state.set(keys::WORK_QUEUE, queue.clone());
        }
        if let Some(queue) = error_queue {
            state.set(keys::ERROR_QUEUE, queue.clone());
        }
    }

    pub fn configuration(&self) -> &ServiceBusConfiguration {
        &self.configuration
    }

    pub fn pipelines(&self) -> &PipelinePool<PipelineKind> {
        &self.pipelines
    }

    pub fn worker_availability(&self) -> &WorkerAvailability {
        &self.worker_availability
    }

    fn queue(&self, uri: &str) -> BusResult<QueueHandle> {
        Ok(self.configuration.queue_manager().get_queue(uri)?)
    }

    /// Send to the single route resolved for the message type
    pub fn send<M: BusMessage>(&self, context: &MessageContext, message: &M) -> BusResult<TransportMessage> {
        self.send_message(context, SEND_IMMEDIATELY, message, None)
    }

    pub fn send_to<M: BusMessage>(
        &self,
        context: &MessageContext,
        uri: &str,
        message: &M,
    ) -> BusResult<TransportMessage> {
        let destination = self.queue(uri)?;
        self.send_message(context, SEND_IMMEDIATELY, message, Some(destination))
    }

    /// Send to this endpoint's own inbox
    pub fn send_local<M: BusMessage>(&self, context: &MessageContext, message: &M) -> BusResult<TransportMessage> {
        let inbox = self
            .configuration
            .inbox_work_queue()
            .cloned()
            .ok_or_else(|| ServiceBusError::queue_missing("Inbox.WorkQueue"))?;
        self.send_message(context, SEND_IMMEDIATELY, message, Some(inbox))
    }

    /// Deliver no earlier than `at`, to `uri` or else to the resolved route
    ///
    /// An `at` that is not in the future makes this an ordinary send.
    pub fn send_deferred<M: BusMessage>(
        &self,
        context: &MessageContext,
        at: DateTime<Utc>,
        message: &M,
        uri: Option<&str>,
    ) -> BusResult<TransportMessage> {
        let destination = uri.map(|uri| self.queue(uri)).transpose()?;
        self.send_message(context, at, message, destination)
    }

    pub fn send_deferred_local<M: BusMessage>(
        &self,
        context: &MessageContext,
        at: DateTime<Utc>,
        message: &M,
    ) -> BusResult<TransportMessage> {
        let inbox = self
            .configuration
            .inbox_work_queue()
            .cloned()
            .ok_or(ServiceBusError::DeferredLocalWithoutInbox)?;
        self.send_message(context, at, message, Some(inbox))
    }

    /// Send to the inbox of whoever sent the message being handled
    pub fn send_reply<M: BusMessage>(&self, context: &MessageContext, message: &M) -> BusResult<TransportMessage> {
        self.send_deferred_reply(context, SEND_IMMEDIATELY, message)
    }

    pub fn send_deferred_reply<M: BusMessage>(
        &self,
        context: &MessageContext,
        at: DateTime<Utc>,
        message: &M,
    ) -> BusResult<TransportMessage> {
        let received = context
            .transport_message()
            .ok_or(ServiceBusError::ReplyWithoutCurrentMessage)?;
        let uri = received
            .sender_inbox_work_queue_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| ServiceBusError::ReplyMissingSenderUri {
                message_id: received.message_id().to_string(),
            })?;
        let destination = self.queue(uri)?;
        self.send_message(context, at, message, Some(destination))
    }

    /// Send a copy to every subscriber; returns the uris sent to
    pub fn publish<M: BusMessage>(&self, context: &MessageContext, message: &M) -> BusResult<Vec<String>> {
        let message_type = message_type_name::<M>();
        let Some(subscription_manager) = self.configuration.subscription_manager() else {
            log::warn!(
                "Cannot publish '{}': no subscription manager has been configured",
                message_type
            );
            return Ok(Vec::new());
        };

        let subscribers = subscription_manager.get_subscribed_uris(message_type);
        if subscribers.is_empty() {
            log::warn!("Published '{}' but there are no subscribers", message_type);
            return Ok(Vec::new());
        }

        let mut sent = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            self.send_to(context, &subscriber, message)?;
            sent.push(subscriber);
        }
        Ok(sent)
    }

    /// Send an already assembled envelope through the transport pipeline
    pub fn send_transport_message(&self, transport_message: &TransportMessage) -> BusResult<()> {
        self.dispatch_transport_message(transport_message, false)
    }

    /// `direct` bypasses the outbox and enqueues on the recipient itself
    pub fn dispatch_transport_message(&self, transport_message: &TransportMessage, direct: bool) -> BusResult<()> {
        log::trace!(
            "Dispatching '{}' ({}) to '{}'",
            transport_message.message_type,
            transport_message.message_id(),
            transport_message
                .recipient_inbox_work_queue_uri
                .as_deref()
                .unwrap_or("[none]")
        );
        let mut pipeline = self.pipelines.acquire(PipelineKind::SendTransport)?;
        let state = pipeline.state_mut();
        state.set(keys::TRANSPORT_MESSAGE, transport_message.clone());
        if direct {
            state.set(keys::DISPATCH_DIRECT, true);
        }
        pipeline.execute()?;
        Ok(())
    }

    fn send_message<M: BusMessage>(
        &self,
        context: &MessageContext,
        at: DateTime<Utc>,
        message: &M,
        destination: Option<QueueHandle>,
    ) -> BusResult<TransportMessage> {
        let message_type = message_type_name::<M>();
        log::trace!(
            "Sending '{}' to '{}'",
            message_type,
            destination
                .as_ref()
                .map(|queue| queue.uri().as_str())
                .unwrap_or("[route]")
        );
        let value = serde_json::to_value(message).map_err(|e| ServiceBusError::Serialization {
            type_name: message_type.to_string(),
            message: e.to_string(),
        })?;

        let mut pipeline = self.pipelines.acquire(PipelineKind::Send)?;
        {
            let state = pipeline.state_mut();
            state.set(keys::MESSAGE, value);
            state.set(keys::MESSAGE_TYPE, message_type.to_string());
            state.set(keys::IGNORE_TILL, at);
            state.set(keys::MESSAGE_CONTEXT, context.clone());
            if let Some(destination) = destination {
                state.set(keys::DESTINATION, destination);
            }
        }
        pipeline.execute()?;
        pipeline
            .state_mut()
            .take::<TransportMessage>(keys::TRANSPORT_MESSAGE)
            .ok_or_else(|| ServiceBusError::Pipeline {
                pipeline: PipelineKind::Send.to_string(),
                message: format!("'{}' was not sent", message_type),
            })
    }

    /// Tell the distributor this worker's inbox can take work
    pub fn notify_worker_started(&self) -> BusResult<()> {
        let Some((control_uri, inbox_uri)) = self.worker_addresses()? else {
            return Ok(());
        };
        self.send_to(
            &MessageContext::new(),
            &control_uri,
            &WorkerStarted {
                inbox_work_queue_uri: inbox_uri,
            },
        )?;
        Ok(())
    }

    pub fn notify_worker_stopped(&self) -> BusResult<()> {
        let Some((control_uri, inbox_uri)) = self.worker_addresses()? else {
            return Ok(());
        };
        self.send_to(
            &MessageContext::new(),
            &control_uri,
            &WorkerStopped {
                inbox_work_queue_uri: inbox_uri,
            },
        )?;
        Ok(())
    }

    fn worker_addresses(&self) -> BusResult<Option<(String, String)>> {
        let Some(worker) = self.configuration.worker() else {
            return Ok(None);
        };
        let inbox = self
            .configuration
            .inbox_work_queue()
            .ok_or_else(|| ServiceBusError::WorkerConfigurationInvalid {
                message: "a worker requires an inbox".to_string(),
            })?;
        Ok(Some((
            worker.distributor_control_work_queue_uri.clone(),
            inbox.uri().to_string(),
        )))
    }
}
