//! Error taxonomy for Plotline.
//!
//! Every error names the [`Stage`] it came from. The service facade wraps
//! errors in a [`StageError`] that additionally reports whether a cached
//! (possibly stale) artifact is available as a fallback.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::AnalysisKind;

/// The analysis stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Source,
    Analyze,
    Graph,
    Detect,
    Suggest,
    Generate,
    Cache,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Analyze => "analyze",
            Stage::Graph => "graph",
            Stage::Detect => "detect",
            Stage::Suggest => "suggest",
            Stage::Generate => "generate",
            Stage::Cache => "cache",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a text-generation provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// No provider is configured.
    #[error("text generation provider is disabled")]
    Disabled,

    /// The call did not complete within its time budget.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// The provider refused the request for rate reasons.
    #[error("provider rate limited the request")]
    RateLimited,

    /// Non-success HTTP status.
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network or connection failure.
    #[error("provider transport error: {0}")]
    Transport(String),

    /// The provider answered but the payload was not usable JSON.
    #[error("provider returned malformed output: {0}")]
    Malformed(String),
}

/// Main error type for Plotline core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied data violates a precondition. Never retried.
    #[error("invalid input ({stage}): {reason}")]
    InvalidInput { stage: Stage, reason: String },

    /// Derived artifacts do not match the current content hash.
    #[error("stale {artifact} ({stage}): expected content hash {expected}, found {found}")]
    StaleInput {
        stage: Stage,
        artifact: AnalysisKind,
        expected: String,
        found: String,
    },

    /// The text-generation provider failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The plot generator could not produce a valid structure.
    #[error("generation failed: {reason}")]
    Generation { reason: String },

    /// Cooperative cancellation was requested.
    #[error("{stage} cancelled")]
    Cancelled { stage: Stage },

    /// The chapter/character source failed.
    #[error("source error: {reason}")]
    Source { reason: String },

    /// The cache backend failed.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(stage: Stage, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            stage,
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl fmt::Display) -> Self {
        Error::Storage {
            reason: reason.to_string(),
        }
    }

    pub fn source_failure(reason: impl fmt::Display) -> Self {
        Error::Source {
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable code used by the CLI and HTTP layers.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput { .. } => "invalid_input",
            Error::StaleInput { .. } => "stale_input",
            Error::Provider(_) => "provider_error",
            Error::Generation { .. } => "generation_error",
            Error::Cancelled { .. } => "cancelled",
            Error::Source { .. } => "source_error",
            Error::Storage { .. } => "storage_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}

/// An error surfaced to callers of the service facade.
#[derive(Debug)]
pub struct StageError {
    pub stage: Stage,
    /// Whether a cached artifact (possibly stale) exists for this request.
    pub cached_fallback: bool,
    pub source: Error,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.source)?;
        if self.cached_fallback {
            f.write_str(" (cached result available)")?;
        }
        Ok(())
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl StageError {
    pub fn new(stage: Stage, source: Error) -> Self {
        Self {
            stage,
            cached_fallback: false,
            source,
        }
    }

    pub fn with_fallback(mut self, cached_fallback: bool) -> Self {
        self.cached_fallback = cached_fallback;
        self
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_stage() {
        let err = Error::invalid(Stage::Analyze, "no chapters");
        assert_eq!(err.to_string(), "invalid input (analyze): no chapters");
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn test_provider_error_conversion() {
        let err: Error = ProviderError::RateLimited.into();
        assert!(matches!(err, Error::Provider(ProviderError::RateLimited)));
    }

    #[test]
    fn test_stage_error_reports_fallback() {
        let err = StageError::new(Stage::Detect, Error::invalid(Stage::Detect, "bad"))
            .with_fallback(true);
        let text = err.to_string();
        assert!(text.starts_with("detect failed"));
        assert!(text.ends_with("(cached result available)"));
    }
}
