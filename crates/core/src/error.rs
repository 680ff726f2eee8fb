//! Execution errors as values.
//!
//! Failures inside the execution pipeline are data, not exceptions: they are
//! captured into per-opportunity results, attached to events, and mapped to
//! HTTP statuses at the boundary. Only programmer bugs panic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How loudly a failure should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Stable failure classification for the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionErrorCode {
    /// Pre-leg depth check failed.
    InsufficientLiquidity,
    /// Venue rejected the order.
    OrderRejected,
    /// Venue returned `pending` past the resolution threshold.
    OrderTimeout,
    /// One leg filled, the other failed.
    SingleLegExposure,
    /// Operator action attempted on a position in the wrong state.
    InvalidPositionState,
    /// Retry submission for an exposed leg failed.
    RetryFailed,
    /// Close submission for an exposed leg failed.
    CloseFailed,
    /// An exit's secondary leg failed after the primary filled.
    PartialExitFailure,
    /// Budget reservation denied by the risk manager.
    LimitExceeded,
    /// Catch-all for unclassified execution failures.
    GenericExecutionFailure,
}

impl ExecutionErrorCode {
    /// Numeric wire code, stable across releases.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::InsufficientLiquidity => 3001,
            Self::OrderRejected => 3002,
            Self::OrderTimeout => 3003,
            Self::SingleLegExposure => 3004,
            Self::InvalidPositionState => 3005,
            Self::RetryFailed => 3006,
            Self::CloseFailed => 3007,
            Self::PartialExitFailure => 3008,
            Self::LimitExceeded => 3009,
            Self::GenericExecutionFailure => 3999,
        }
    }

    /// Default severity for this code.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::InsufficientLiquidity
            | Self::OrderTimeout
            | Self::InvalidPositionState
            | Self::LimitExceeded => Severity::Warning,
            Self::OrderRejected
            | Self::RetryFailed
            | Self::CloseFailed
            | Self::GenericExecutionFailure => Severity::Error,
            Self::SingleLegExposure | Self::PartialExitFailure => Severity::Critical,
        }
    }
}

/// A structured execution failure.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct ExecutionError {
    pub code: ExecutionErrorCode,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ExecutionError {
    /// Creates an error with the code's default severity.
    #[must_use]
    pub fn new(code: ExecutionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: code.default_severity(),
            metadata: None,
        }
    }

    /// Overrides the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attaches structured metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_unique() {
        let codes = [
            ExecutionErrorCode::InsufficientLiquidity,
            ExecutionErrorCode::OrderRejected,
            ExecutionErrorCode::OrderTimeout,
            ExecutionErrorCode::SingleLegExposure,
            ExecutionErrorCode::InvalidPositionState,
            ExecutionErrorCode::RetryFailed,
            ExecutionErrorCode::CloseFailed,
            ExecutionErrorCode::PartialExitFailure,
            ExecutionErrorCode::LimitExceeded,
            ExecutionErrorCode::GenericExecutionFailure,
        ];
        let mut seen = std::collections::HashSet::new();
        for code in codes {
            assert!(seen.insert(code.as_u16()), "duplicate wire code {}", code.as_u16());
        }
    }

    #[test]
    fn test_default_severities() {
        assert_eq!(
            ExecutionErrorCode::SingleLegExposure.default_severity(),
            Severity::Critical
        );
        assert_eq!(
            ExecutionErrorCode::InsufficientLiquidity.default_severity(),
            Severity::Warning
        );
        assert_eq!(
            ExecutionErrorCode::OrderRejected.default_severity(),
            Severity::Error
        );
    }

    #[test]
    fn test_error_construction() {
        let err = ExecutionError::new(ExecutionErrorCode::CloseFailed, "no bids")
            .with_severity(Severity::Warning);
        assert_eq!(err.code, ExecutionErrorCode::CloseFailed);
        assert_eq!(err.severity, Severity::Warning);
        assert!(err.metadata.is_none());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
