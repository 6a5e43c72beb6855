//! Error types for lotsim.
//!
//! All errors are strongly typed using thiserror. Validation errors belong to the
//! input layer and never reach the simulation core; configuration errors stop a run
//! before any car is launched; cancellation is a signal, not a failure.

use thiserror::Error;

/// Errors produced while validating a raw input line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Expected at least 4 comma-separated fields, found {found}")]
    FieldCount {
        found: usize,
    },

    #[error("Gate name cannot be empty")]
    EmptyGate,

    #[error("Invalid car id format: '{token}'")]
    InvalidCarId {
        token: String,
    },

    #[error("Car id must be positive, got {value}")]
    NonPositiveCarId {
        value: u32,
    },

    #[error("Invalid arrival time format: '{token}'")]
    InvalidArrival {
        token: String,
    },

    #[error("Invalid parking duration format: '{token}'")]
    InvalidDuration {
        token: String,
    },
}

/// Errors in the run configuration. Fatal: the simulation does not start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Lot capacity must be positive, got {capacity}")]
    NonPositiveCapacity {
        capacity: i64,
    },
}

/// Cooperative cancellation of a car task.
///
/// Returned by every cancellable suspension (arrival wait, blocking acquire,
/// hold wait). A task that observes it unwinds and releases anything it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task cancelled")]
pub struct Cancelled;

/// Top-level error type for lotsim.
#[derive(Debug, Error)]
pub enum LotError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl LotError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is an I/O error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for lotsim operations.
pub type LotResult<T> = Result<T, LotError>;
