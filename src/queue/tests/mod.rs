//! Test modules for the queue abstraction
//!
//! Memory stores are process-wide, so every test uses its own queue names.

mod memory;

use uuid::Uuid;

/// A memory queue uri that no other test uses
pub(crate) fn unique_memory_uri(label: &str) -> String {
    format!("memory://test/{}-{}", label, Uuid::new_v4().simple())
}
