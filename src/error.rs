//! Error types for qail-rdb.

use thiserror::Error;

/// The main error type for translation and execution.
#[derive(Debug, Error)]
pub enum RdbError {
    /// A combine kind reached the native set-operator path but has no native form.
    #[error("Unsupported combine kind for MySQL: {0}")]
    UnsupportedCombine(String),

    /// A field conversion name the converter cannot resolve.
    #[error("Unknown field conversion '{name}' for MySQL")]
    UnknownConversion { name: String },

    /// Update command without any target field.
    #[error("Update command on '{entity}' has no fields to set")]
    MissingUpdateFields { entity: String },

    /// A query used as a comparison value must select at least one field.
    #[error("The '{entity}' query used as a subquery must select at least one field")]
    SubqueryWithoutFields { entity: String },

    /// MAX/MIN/SUM/AVG need an explicit field.
    #[error("You must specify the field to perform the {function} operation")]
    MissingAggregateField { function: &'static str },

    /// A query object without an entity where one is required (joins, combines).
    #[error("Query object must set an entity when used in a {0} operation")]
    MissingEntity(&'static str),

    /// Statement text references a placeholder that has no bound value.
    #[error("Statement references unknown parameter '{0}'")]
    UnknownParameter(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The caller cancelled the batch before all units ran.
    #[error("Execution cancelled after {completed} of {total} units")]
    Cancelled { completed: usize, total: usize },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RdbError {
    /// Create an unknown conversion error.
    pub fn conversion(name: impl Into<String>) -> Self {
        Self::UnknownConversion { name: name.into() }
    }

    /// Whether this error is a translation-time configuration error
    /// (non-retryable, raised before anything touches the backend).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCombine(_)
                | Self::UnknownConversion { .. }
                | Self::MissingUpdateFields { .. }
                | Self::SubqueryWithoutFields { .. }
                | Self::MissingAggregateField { .. }
                | Self::MissingEntity(_)
                | Self::Config(_)
        )
    }
}

impl From<sqlx::Error> for RdbError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => Self::Connection(e.to_string()),
            other => Self::Execution(other.to_string()),
        }
    }
}

/// Result type alias for qail-rdb operations.
pub type RdbResult<T> = Result<T, RdbError>;
