//! Console output for the `check` command

use colored::Colorize;
use relaybus::bus::config::QueueConfiguration;
use relaybus::bus::ServiceBusConfiguration;

/// Width of the role column
const ROLE_COLUMN_WIDTH: usize = 14;

/// One configured role and a one-line description of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRow {
    pub role: String,
    pub detail: String,
}

impl RoleRow {
    fn new(role: &str, detail: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            detail: detail.into(),
        }
    }
}

fn describe_queues(queues: &QueueConfiguration) -> String {
    let uri = |queue: &Option<relaybus::queue::QueueHandle>| {
        queue
            .as_ref()
            .map(|q| q.uri().to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    format!(
        "{} (error: {}, threads: {})",
        uri(&queues.work_queue),
        uri(&queues.error_queue),
        queues.thread_count
    )
}

/// Rows for every role the configuration enables
pub fn role_rows(configuration: &ServiceBusConfiguration) -> Vec<RoleRow> {
    let mut rows = Vec::new();

    if let Some(inbox) = configuration.inbox() {
        let role = if inbox.distribute { "distributor" } else { "inbox" };
        rows.push(RoleRow::new(role, describe_queues(&inbox.queues)));
        if let Some(deferred) = &inbox.deferred_queue {
            rows.push(RoleRow::new("deferred", deferred.uri().to_string()));
        }
        if !inbox.distributor_workers.is_empty() {
            rows.push(RoleRow::new("workers", inbox.distributor_workers.join(", ")));
        }
    }
    if let Some(control) = configuration.control_inbox() {
        rows.push(RoleRow::new("control inbox", describe_queues(control)));
    }
    if let Some(outbox) = configuration.outbox() {
        rows.push(RoleRow::new("outbox", describe_queues(outbox)));
    }
    if let Some(worker) = configuration.worker() {
        rows.push(RoleRow::new(
            "worker",
            format!("reports to {}", worker.distributor_control_work_queue_uri),
        ));
    }
    if !configuration.compression_algorithm().is_empty() {
        rows.push(RoleRow::new("compression", configuration.compression_algorithm()));
    }
    if !configuration.encryption_algorithm().is_empty() {
        rows.push(RoleRow::new("encryption", configuration.encryption_algorithm()));
    }
    rows
}

pub fn print_roles(rows: &[RoleRow], use_color: bool) {
    if rows.is_empty() {
        eprintln!("No queue roles are configured.");
        return;
    }
    for row in rows {
        let role = format!("{:<width$}", row.role, width = ROLE_COLUMN_WIDTH);
        if use_color {
            println!("{} {}", role.cyan(), row.detail);
        } else {
            println!("{} {}", role, row.detail);
        }
    }
}
