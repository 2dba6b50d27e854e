use crate::value::{ErrorValue, Value};

/// Failure reported by a host collaborator (network, workers, clipboard).
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("{0} is unavailable")]
    Unavailable(&'static str),
    #[error("network request failed: {0}")]
    Network(String),
    /// The host raised a value of its own; it is reported as-is.
    #[error("host raised {}", .0.type_name())]
    Raised(Value),
}

impl HostError {
    pub fn into_value(self) -> Value {
        match self {
            HostError::Raised(value) => value,
            HostError::Network(message) => Value::Error(ErrorValue::new("TypeError", message)),
            other => Value::error(other.to_string()),
        }
    }
}

/// Failure of one evaluation attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("script failed to parse: {0:?}")]
    Syntax(Value),
    #[error("script threw: {0:?}")]
    Thrown(Value),
    #[error("evaluation is unavailable: {0}")]
    Unavailable(String),
}

impl EvalError {
    pub fn into_value(self) -> Value {
        match self {
            EvalError::Syntax(value) | EvalError::Thrown(value) => value,
            EvalError::Unavailable(message) => Value::error(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage is unavailable")]
    Unavailable,
    #[error("storage read failed: {0}")]
    Read(String),
    #[error("storage write failed: {0}")]
    Write(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("sandbox config is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("console sink failed: {0}")]
pub struct SinkError(pub String);
