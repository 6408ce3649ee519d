use crate::domain::model::{AggregateKind, FilterField};
use thiserror::Error;

/// Whether a failed execution is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    Transient,
    NonTransient,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{aggregate} failed ({kind:?}) after {attempts} attempt(s): {message}")]
pub struct ExecutionError {
    pub aggregate: AggregateKind,
    pub kind: ExecutionErrorKind,
    pub attempts: u32,
    pub message: String,
}

impl ExecutionError {
    pub fn is_transient(&self) -> bool {
        self.kind == ExecutionErrorKind::Transient
    }
}

/// Failures reported by a query store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store timed out: {0}")]
    Timeout(String),

    #[error("no execution handle available: {0}")]
    PoolExhausted(String),

    #[error("malformed query: {0}")]
    Malformed(String),

    #[error("parameter mismatch: expected {expected}, got {actual}")]
    ParameterMismatch { expected: usize, actual: usize },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::PoolExhausted(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Configuration,
    Execution,
    Io,
}

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("{aggregate} requires the '{missing}' filter")]
    MissingFilter {
        aggregate: AggregateKind,
        missing: FilterField,
    },

    #[error("invalid value '{value}' for filter '{field}': {reason}")]
    InvalidFilterValue {
        field: FilterField,
        value: String,
        reason: String,
    },

    #[error("unknown aggregate '{name}': expected by-section, by-district, by-area, by-gender, by-rating or by-state")]
    UnknownAggregate { name: String },

    #[error("{aggregate} cannot honor the '{field}' filter: its join shape has no {table} table")]
    UnsupportedFilter {
        aggregate: AggregateKind,
        field: FilterField,
        table: &'static str,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}' ({value}): {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Dataset error: {message}")]
    DatasetError { message: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl StatsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StatsError::MissingFilter { .. }
            | StatsError::InvalidFilterValue { .. }
            | StatsError::UnknownAggregate { .. } => ErrorCategory::Validation,
            StatsError::UnsupportedFilter { .. }
            | StatsError::ConfigError { .. }
            | StatsError::InvalidConfigValue { .. } => ErrorCategory::Configuration,
            StatsError::Execution(_) => ErrorCategory::Execution,
            StatsError::DatasetError { .. }
            | StatsError::CsvError(_)
            | StatsError::IoError(_)
            | StatsError::SerializationError(_) => ErrorCategory::Io,
        }
    }

    /// HTTP-equivalent status for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            StatsError::MissingFilter { .. }
            | StatsError::InvalidFilterValue { .. }
            | StatsError::UnknownAggregate { .. } => 400,
            StatsError::Execution(e) if e.is_transient() => 503,
            _ => 500,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Validation => format!("Invalid request: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Execution => format!("Statistics are temporarily unavailable: {}", self),
            ErrorCategory::Io => format!("Could not read input data: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(StoreError::Timeout("slow".into()).is_transient());
        assert!(StoreError::PoolExhausted("busy".into()).is_transient());
        assert!(!StoreError::Malformed("bad".into()).is_transient());
        assert!(!StoreError::ParameterMismatch { expected: 2, actual: 1 }.is_transient());
        assert!(!StoreError::Constraint("fk".into()).is_transient());
    }

    #[test]
    fn test_status_codes() {
        let missing = StatsError::MissingFilter {
            aggregate: AggregateKind::ByArea,
            missing: FilterField::District,
        };
        assert_eq!(missing.status_code(), 400);
        assert_eq!(missing.category(), ErrorCategory::Validation);

        let transient = StatsError::Execution(ExecutionError {
            aggregate: AggregateKind::ByGender,
            kind: ExecutionErrorKind::Transient,
            attempts: 3,
            message: "down".into(),
        });
        assert_eq!(transient.status_code(), 503);

        let defect = StatsError::UnsupportedFilter {
            aggregate: AggregateKind::ByState,
            field: FilterField::Area,
            table: "membership",
        };
        assert_eq!(defect.status_code(), 500);
        assert_eq!(defect.category(), ErrorCategory::Configuration);
    }
}
