//! Lock poisoning helpers
//!
//! Shared registries (queue factories, queue cache, pipeline pool, worker
//! availability) are guarded by std locks. A panic while holding one poisons
//! it; these helpers turn that into the caller's error type instead of a panic.

use std::sync::{LockResult, MutexGuard, RwLockReadGuard, RwLockWriteGuard};

fn poison_message(what: &str, detail: impl std::fmt::Debug) -> String {
    format!(
        "Internal synchronisation error ({} poisoned). A panic occurred while the lock was held: {:?}",
        what, detail
    )
}

/// Convert a poisoned mutex lock into an application error
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use relaybus::core::sync::handle_mutex_poison;
/// use relaybus::queue::api::QueueError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_mutex_poison(mutex.lock(), |message| QueueError::OperationFailed { message })
///     .unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_mutex_poison<'a, T, E>(
    result: LockResult<MutexGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<MutexGuard<'a, T>, E> {
    result.map_err(|poison_err| error_constructor(poison_message("mutex", poison_err)))
}

/// Convert a poisoned RwLock read into an application error
pub fn handle_rwlock_read<'a, T, E>(
    result: LockResult<RwLockReadGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<'a, T>, E> {
    result.map_err(|poison_err| error_constructor(poison_message("RwLock read", poison_err)))
}

/// Convert a poisoned RwLock write into an application error
pub fn handle_rwlock_write<'a, T, E>(
    result: LockResult<RwLockWriteGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<'a, T>, E> {
    result.map_err(|poison_err| error_constructor(poison_message("RwLock write", poison_err)))
}
