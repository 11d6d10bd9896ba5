//! Prediction oracle integration.
//!
//! Defines the `PredictionOracle` trait and provides an OpenAI-compatible
//! implementation plus a fixed-answer oracle for dry runs.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::PredictionResponse;

/// Abstraction over prediction oracles.
///
/// Implementors answer a market question with a Yes/No prediction and a
/// confidence. Transport failures are errors; a model that cannot decide
/// answers with `PredictionLabel::Error`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionOracle: Send + Sync {
    async fn predict(&self, question: &str) -> Result<PredictionResponse>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

/// Oracle that always returns the same answer.
#[derive(Debug, Clone)]
pub struct FixedOracle {
    response: PredictionResponse,
}

impl FixedOracle {
    pub fn new(response: PredictionResponse) -> Self {
        Self { response }
    }
}

#[async_trait]
impl PredictionOracle for FixedOracle {
    async fn predict(&self, _question: &str) -> Result<PredictionResponse> {
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

/// Extract the `application_id '...'` reference embedded in a question.
pub fn application_id(question: &str) -> Option<&str> {
    const MARKER: &str = "application_id '";
    let start = question.find(MARKER)? + MARKER.len();
    let len = question[start..].find('\'')?;
    Some(&question[start..start + len])
}
