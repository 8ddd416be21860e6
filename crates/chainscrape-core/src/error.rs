//! Shared error type across chainscrape crates.

use std::fmt;

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Malformed address or query parameter.
    InvalidInput,
    /// A lookup needed to build the request's queries failed.
    PrerequisiteFailed,
    /// Upstream transport failure.
    SourceUnavailable,
    /// Upstream payload could not be decoded.
    DecodeFailed,
    /// Numeric conversion failed.
    NormalizationFailed,
    /// Configuration rejected at startup.
    InvalidConfig,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::InvalidInput => "INVALID_INPUT",
            ClientCode::PrerequisiteFailed => "PREREQUISITE_FAILED",
            ClientCode::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ClientCode::DecodeFailed => "DECODE_FAILED",
            ClientCode::NormalizationFailed => "NORMALIZATION_FAILED",
            ClientCode::InvalidConfig => "INVALID_CONFIG",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Unified error type used by core and exporter.
///
/// Only `InvalidInput` and `PrerequisiteFailure` ever abort a scrape; every
/// other variant is absorbed at the query boundary and turned into an absent
/// gauge.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("prerequisite lookup failed: {0}")]
    PrerequisiteFailure(String),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("decode failure: {0}")]
    DecodeFailure(String),
    #[error("normalization failure: {0}")]
    NormalizationFailure(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ExporterError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            ExporterError::InvalidInput(_) => ClientCode::InvalidInput,
            ExporterError::PrerequisiteFailure(_) => ClientCode::PrerequisiteFailed,
            ExporterError::SourceUnavailable(_) => ClientCode::SourceUnavailable,
            ExporterError::DecodeFailure(_) => ClientCode::DecodeFailed,
            ExporterError::NormalizationFailure(_) => ClientCode::NormalizationFailed,
            ExporterError::Config(_) => ClientCode::InvalidConfig,
            ExporterError::Internal(_) => ClientCode::Internal,
        }
    }
}

/// Why a single query slot holds no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SourceUnavailable,
    DecodeFailure,
    NormalizationFailure,
    TimedOut,
    Panicked,
    Other,
}

impl FailureKind {
    /// Label value used in logs and self-metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::SourceUnavailable => "source_unavailable",
            FailureKind::DecodeFailure => "decode_failure",
            FailureKind::NormalizationFailure => "normalization_failure",
            FailureKind::TimedOut => "timed_out",
            FailureKind::Panicked => "panicked",
            FailureKind::Other => "other",
        }
    }
}

/// Failure marker stored in a query's result slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub kind: FailureKind,
    pub cause: String,
}

impl SourceFailure {
    pub fn new(kind: FailureKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.cause)
    }
}

impl From<ExporterError> for SourceFailure {
    fn from(e: ExporterError) -> Self {
        let kind = match &e {
            ExporterError::SourceUnavailable(_) => FailureKind::SourceUnavailable,
            ExporterError::DecodeFailure(_) => FailureKind::DecodeFailure,
            ExporterError::NormalizationFailure(_) => FailureKind::NormalizationFailure,
            _ => FailureKind::Other,
        };
        SourceFailure::new(kind, e.to_string())
    }
}
