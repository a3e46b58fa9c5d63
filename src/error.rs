//! Unified error hierarchy for LoadRisk
//!
//! Separates request validation failures, insufficient or malformed history
//! data, and model fitting failures so the pipeline can decide which ones
//! degrade a single sub-model and which ones abort a whole request.

use thiserror::Error;

/// Top-level error type for all LoadRisk operations
#[derive(Debug, Error)]
pub enum RiskError {
    /// Malformed or out-of-range request fields
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Insufficient or malformed historical data
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Model fitting failures
    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    /// Persistence errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Request validation errors, always rejected before any computation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// RPE outside the 1-10 scale
    #[error("RPE must be between 1 and 10, got {rpe}")]
    RpeOutOfRange { rpe: i64 },

    /// Session duration must be a positive number of minutes
    #[error("Duration must be a positive number of minutes, got {duration}")]
    NonPositiveDuration { duration: i64 },

    /// duration x rpe does not fit the load range
    #[error("Duration of {duration} minutes is out of range")]
    DurationOutOfRange { duration: i64 },

    /// Required request field absent
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Payload cannot be interpreted as history rows at all
    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String },

    /// Row date missing or unparseable
    #[error("Invalid date in row {row}: {value}")]
    InvalidDate { row: usize, value: String },

    /// Athlete identifier is blank
    #[error("Athlete id must not be empty")]
    EmptyAthleteId,
}

/// Historical data problems, degrade the affected sub-model only
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// No rows supplied
    #[error("History is empty")]
    EmptyHistory,

    /// A column required by a model is absent from every row
    #[error("Missing column: {column}")]
    MissingColumn { column: String },

    /// Column is present but carries no numeric value
    #[error("Column {column} contains no numeric values")]
    NoNumericValues { column: String },

    /// The most recent observation lacks features needed for prediction
    #[error("Latest observation is missing {missing}")]
    IncompleteLatestRow { missing: String },

    /// No row carries every value a model needs for training
    #[error("No complete labelled rows for {model}")]
    NoLabelledRows { model: String },
}

/// Model fitting errors, isolated per sub-model by the pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    /// The underlying learner rejected the data
    #[error("Fitting {model} failed: {reason}")]
    FitFailed { model: String, reason: String },

    /// The fitted model produced NaN or infinite values
    #[error("{model} produced non-finite output")]
    NonFinite { model: String },
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored value could not be decoded: {0}")]
    Corrupt(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Result type alias for LoadRisk operations
pub type Result<T> = std::result::Result<T, RiskError>;

impl RiskError {
    /// Whether this error only degrades one sub-model instead of the request
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RiskError::Data(_) | RiskError::Compute(_))
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RiskError::Validation(_) => ErrorSeverity::Warning,
            RiskError::Data(_) => ErrorSeverity::Warning,
            RiskError::Compute(_) => ErrorSeverity::Error,
            RiskError::Database(DatabaseError::LockPoisoned) => ErrorSeverity::Critical,
            RiskError::Database(_) => ErrorSeverity::Error,
            RiskError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// HTTP-equivalent status for the response layer
    pub fn status_code(&self) -> u16 {
        match self {
            RiskError::Validation(_) | RiskError::Serialization(_) => 400,
            RiskError::Data(_) => 422,
            _ => 500,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            RiskError::Validation(ValidationError::RpeOutOfRange { rpe }) => {
                format!("Perceived exertion must be rated from 1 to 10 (received {})", rpe)
            }
            RiskError::Data(DataError::EmptyHistory) => {
                "No training history was supplied for this athlete.".to_string()
            }
            RiskError::Data(DataError::MissingColumn { column }) => {
                format!("Training history is missing the '{}' column.", column)
            }
            RiskError::Database(_) => {
                "Unable to store the result. Please check the database configuration.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
