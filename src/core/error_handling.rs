//! Generic error handling utilities
//!
//! Errors that reach the binary are reported through [`log_error_with_context`],
//! which separates configuration mistakes an operator can fix from system
//! failures that only need debug detail.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if the error carries a message the operator can act on
    /// (missing queue configuration, unknown queue scheme, bad settings file)
    fn is_user_actionable(&self) -> bool;

    /// The operator-facing message for user-actionable errors
    fn user_message(&self) -> Option<&str>;
}

/// Log errors with a detail level chosen by error specificity
///
/// User-actionable errors print their own message; system errors print the
/// operation context and leave the detail to debug level.
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match (error.is_user_actionable(), error.user_message()) {
        (true, Some(user_msg)) => log::error!("FATAL: {}: {}", operation_context, user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
