use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::OcrConfig;
use crate::error::Result;
use super::{OcrClient, OcrOutput};

/// Uniform retry policy applied to every OCR invocation path: one attempt
/// plus at most `max_retries` retries with linear backoff
/// (`backoff`, `2 * backoff`, ...).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Outcome of an OCR invocation. Failures are values, not errors: the
/// pipeline turns them into FAILED document state.
#[derive(Debug, Clone)]
pub enum OcrCallOutcome {
    Success(OcrOutput),
    Failure { reason: String },
}

/// An OCR invocation report. `duration` is wall-clock time across all
/// attempts and is reported regardless of outcome.
#[derive(Debug, Clone)]
pub struct OcrCallReport {
    pub outcome: OcrCallOutcome,
    pub duration: Duration,
}

/// Wraps the OCR backend with hard timeout budgets and the retry policy.
///
/// Small payloads get the inline budget; file-sized payloads get the larger
/// configurable bound. Nothing thrown past this boundary comes from the OCR
/// layer itself.
pub struct OcrInvoker {
    client: Arc<dyn OcrClient>,
    inline_timeout: Duration,
    file_timeout: Duration,
    inline_threshold_bytes: usize,
    retry: RetryPolicy,
}

impl OcrInvoker {
    pub fn new(client: Arc<dyn OcrClient>, config: &OcrConfig) -> Self {
        Self {
            client,
            inline_timeout: Duration::from_secs(config.inline_timeout_secs),
            file_timeout: Duration::from_secs(config.file_timeout_secs),
            inline_threshold_bytes: config.inline_threshold_bytes,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                ..RetryPolicy::default()
            },
        }
    }

    /// Construct with explicit budgets (used by tests)
    pub fn with_budgets(
        client: Arc<dyn OcrClient>,
        inline_timeout: Duration,
        file_timeout: Duration,
        inline_threshold_bytes: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            inline_timeout,
            file_timeout,
            inline_threshold_bytes,
            retry,
        }
    }

    fn budget_for(&self, payload: &[u8]) -> Duration {
        if payload.len() <= self.inline_threshold_bytes {
            self.inline_timeout
        } else {
            self.file_timeout
        }
    }

    /// Invoke the OCR backend under the timeout budget.
    ///
    /// Timeouts and backend errors are both retryable and both end up as an
    /// [`OcrCallOutcome::Failure`] once attempts are exhausted; this method
    /// never returns an error.
    pub async fn recognize(&self, payload: &[u8]) -> OcrCallReport {
        let budget = self.budget_for(payload);
        let start = Instant::now();
        let mut attempt = 0;

        let outcome = loop {
            let reason = match tokio::time::timeout(budget, self.client.recognize(payload)).await {
                Ok(Ok(output)) => break OcrCallOutcome::Success(output),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("OCR call timed out after {}s", budget.as_secs()),
            };

            if attempt >= self.retry.max_retries {
                break OcrCallOutcome::Failure { reason };
            }

            attempt += 1;
            log::warn!(
                "OCR attempt {}/{} failed, retrying: {}",
                attempt,
                self.retry.max_retries + 1,
                reason
            );
            tokio::time::sleep(self.retry.backoff * attempt as u32).await;
        };

        OcrCallReport {
            outcome,
            duration: start.elapsed(),
        }
    }

    /// Probe the backend for liveness (no timeout budget beyond transport)
    pub async fn health(&self) -> Result<()> {
        self.client.health().await
    }
}
