//! Test modules for the bus pipelines
//!
//! Each test drives one pipeline execution at a time through
//! `ServiceBus::process_once` and inspects the memory queues afterwards.

mod deferred;
mod receive;
