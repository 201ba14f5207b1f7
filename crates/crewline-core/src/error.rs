use thiserror::Error;

/// Result alias used across the Crewline workspace.
pub type CoordResult<T> = Result<T, CoordError>;

/// Error taxonomy for coordination operations.
///
/// `PreconditionFailed` is the normal outcome of losing a concurrent
/// conditional update and is reported as a business conflict, not a fault.
/// `NotFound` is always surfaced. Store faults abort the operation; cache
/// faults degrade to a store read at the call site.
#[derive(Error, Debug)]
pub enum CoordError {
    /// A conditional update's expected prior state did not match the store.
    #[error("precondition failed for {entity} '{identifier}': expected status {expected}")]
    PreconditionFailed {
        /// Record kind the update targeted ("session", "task", "agent").
        entity: &'static str,
        /// External identifier of the record.
        identifier: String,
        /// The status the caller expected to find.
        expected: String,
    },

    /// An identifier did not resolve to a record.
    #[error("{entity} not found: {identifier}")]
    NotFound {
        /// Record kind looked up.
        entity: &'static str,
        /// The identifier that failed to resolve.
        identifier: String,
    },

    /// Lock acquisition failed within its wait budget.
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),

    /// The external task executor raised.
    #[error("executor failure: {0}")]
    Executor(String),

    /// Durable store infrastructure fault.
    #[error("store error: {0}")]
    Store(String),

    /// Cache infrastructure fault.
    #[error("cache error: {0}")]
    Cache(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordError {
    /// Shorthand for a precondition failure on a record.
    pub fn precondition(
        entity: &'static str,
        identifier: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::PreconditionFailed {
            entity,
            identifier: identifier.into(),
            expected: expected.into(),
        }
    }

    /// Shorthand for a missing record.
    pub fn not_found(entity: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.into(),
        }
    }

    /// True for conflicts the public API reports as `Ok(false)` rather
    /// than an error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_is_conflict() {
        let err = CoordError::precondition("task", "task-1", "pending");
        assert!(err.is_conflict());
        assert!(err.to_string().contains("task-1"));
    }

    #[test]
    fn test_not_found_is_not_conflict() {
        let err = CoordError::not_found("session", "missing");
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "session not found: missing");
    }
}
