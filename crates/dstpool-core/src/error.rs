//! Error types for the dispatch engine

use core::fmt;

/// Result type for dispatch engine operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur in dispatch engine operations.
///
/// A plain enum with manual `Display`/`Error` impls, no derive crate,
/// matching how errors are done across this workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Allocation failed while enqueuing a job or a result. On the worker
    /// path this is fatal for the whole pool (every queue is marked
    /// error-shutdown); on the producer path it's a plain failure with no
    /// state change.
    Allocation,

    /// A non-blocking dispatch found the queue saturated.
    Saturated,

    /// The operation targets a queue or pool that has shut down.
    Shutdown,

    /// `wake_dispatch` released a blocked producer before its job ran; the
    /// job was discarded (with `input_cleanup` run) and the caller should
    /// treat this as cancellation.
    Woken,

    /// The queue belongs to a different pool than the one the operation
    /// was issued through.
    DifferentPool,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Allocation => write!(f, "allocation failed"),
            DispatchError::Saturated => write!(f, "queue saturated"),
            DispatchError::Shutdown => write!(f, "queue or pool shut down"),
            DispatchError::Woken => write!(f, "dispatch cancelled by wake_dispatch"),
            DispatchError::DifferentPool => write!(f, "queue belongs to a different pool"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(format!("{}", DispatchError::Saturated), "queue saturated");
        assert_eq!(
            format!("{}", DispatchError::DifferentPool),
            "queue belongs to a different pool"
        );
    }
}
