//! Text-generation provider trait and bounded call helper.
//!
//! Defines the [`TextGenerator`] trait every generation backend implements.
//! The core only sees a narrow contract: an instruction, a description of the
//! expected JSON shape, and a bounded context window in; a JSON value or a
//! [`ProviderError`] out.
//!
//! Concrete HTTP implementations (OpenAI, Ollama) live in the `plotline`
//! app crate.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ProviderError, Stage};

/// Default per-call time budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A structured prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// What the provider should do.
    pub instruction: String,
    /// Human-readable description of the JSON the provider must return.
    pub schema: String,
    /// Bounded excerpt of source material. Never the whole manuscript.
    pub context: String,
}

/// Trait for text-generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short identifier used in logs (e.g. `"openai:gpt-4o-mini"`).
    fn name(&self) -> &str;

    /// Whether calls can succeed at all. Disabled providers fail fast.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Run one completion and return the parsed JSON payload.
    async fn complete(&self, request: &ProviderRequest) -> Result<serde_json::Value, ProviderError>;
}

/// A provider that always reports [`ProviderError::Disabled`].
#[derive(Debug, Default, Clone)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn complete(&self, _request: &ProviderRequest) -> Result<serde_json::Value, ProviderError> {
        Err(ProviderError::Disabled)
    }
}

/// Run one provider call bounded by `timeout` and raced against `cancel`.
///
/// Cancellation wins over a concurrently finishing call and is reported as
/// [`Error::Cancelled`] for `stage`; provider failures come back as
/// [`Error::Provider`].
pub async fn call_bounded(
    provider: &dyn TextGenerator,
    request: &ProviderRequest,
    timeout: Duration,
    cancel: &CancellationToken,
    stage: Stage,
) -> Result<serde_json::Value, Error> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled { stage });
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled { stage }),
        outcome = tokio::time::timeout(timeout, provider.complete(request)) => match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::Provider(e)),
            Err(_) => Err(Error::Provider(ProviderError::Timeout(timeout))),
        },
    }
}

/// Serialize a [`Duration`] as whole seconds.
pub mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use serde_json::json;

    fn request() -> ProviderRequest {
        ProviderRequest {
            instruction: "say hi".into(),
            schema: "{}".into(),
            context: String::new(),
        }
    }

    #[tokio::test]
    async fn test_call_bounded_returns_value() {
        let provider = ScriptedGenerator::new(vec![Ok(json!({"ok": true}))]);
        let value = call_bounded(
            &provider,
            &request(),
            DEFAULT_TIMEOUT,
            &CancellationToken::new(),
            Stage::Generate,
        )
        .await
        .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_bounded_times_out() {
        let provider = ScriptedGenerator::new(vec![Ok(json!({}))]).with_delay(Duration::from_secs(60));
        let err = call_bounded(
            &provider,
            &request(),
            Duration::from_secs(1),
            &CancellationToken::new(),
            Stage::Detect,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_call_bounded_respects_cancellation() {
        let provider = ScriptedGenerator::new(vec![Ok(json!({}))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = call_bounded(&provider, &request(), DEFAULT_TIMEOUT, &cancel, Stage::Generate)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { stage: Stage::Generate }));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_generator() {
        let err = DisabledGenerator.complete(&request()).await.unwrap_err();
        assert_eq!(err, ProviderError::Disabled);
        assert!(!DisabledGenerator.is_enabled());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
