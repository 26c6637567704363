use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Caller supplied an out-of-range or malformed parameter. The only
    /// error that crosses the subsystem boundary.
    #[error("Validation Error: {0}")]
    Validation(String),

    /// A tier could not be reached at all (connect, auth, ping, timeout).
    #[error("Backend Unavailable: {0}")]
    BackendUnavailable(String),

    /// A single operation failed on an otherwise reachable backend.
    #[error("Backend Operation Failed: {0}")]
    OperationFailed(String),

    /// A cached payload could not be serialized or deserialized.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// Persistent-tier (option table) failure.
    #[error("Storage Error: {0}")]
    Storage(String),

    /// Configuration errors surfaced at startup.
    #[error("Config Error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Storage(format!("SQL error: {}", err))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            CacheError::BackendUnavailable(format!("Redis error: {}", err))
        } else {
            CacheError::OperationFailed(format!("Redis error: {}", err))
        }
    }
}

impl From<memcache::MemcacheError> for CacheError {
    fn from(err: memcache::MemcacheError) -> Self {
        CacheError::OperationFailed(format!("Memcached error: {}", err))
    }
}

impl CacheError {
    /// Whether the failed call may succeed on a later attempt without code
    /// or configuration changes.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CacheError::Validation(_) => false,
            CacheError::BackendUnavailable(_) => true,
            CacheError::OperationFailed(_) => true,
            CacheError::Serialization(_) => false,
            CacheError::Storage(_) => true,
            CacheError::Config(_) => false,
        }
    }

    /// Categorizes the error for stats and log labeling.
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            CacheError::Validation(_) => ErrorCategory::CallerInput,
            CacheError::BackendUnavailable(_) | CacheError::OperationFailed(_) => {
                ErrorCategory::Backend
            }
            CacheError::Serialization(_) => ErrorCategory::Data,
            CacheError::Storage(_) => ErrorCategory::Storage,
            CacheError::Config(_) => ErrorCategory::Configuration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    CallerInput,
    Backend,
    Storage,
    Data,
    Configuration,
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_not_recoverable() {
        let err = CacheError::Validation("window too small".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.categorize(), ErrorCategory::CallerInput);
    }

    #[test]
    fn backend_failures_are_recoverable() {
        assert!(CacheError::BackendUnavailable("ping failed".to_string()).is_recoverable());
        assert!(CacheError::OperationFailed("SETEX failed".to_string()).is_recoverable());
    }

    #[test]
    fn json_errors_map_to_serialization() {
        let err: CacheError = serde_json::from_str::<u64>("not-a-number").unwrap_err().into();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert_eq!(err.categorize(), ErrorCategory::Data);
    }
}
