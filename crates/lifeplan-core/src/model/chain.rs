//! Primary model with one sequential fallback hop under a shared deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use super::{GenerationRequest, LanguageModel, ModelError};
use crate::error::PipelineError;

/// Which model served a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Primary,
    Fallback,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tier: Tier,
    pub model: String,
}

/// Latency budget for one chain invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainBudget {
    /// Covers both hops.
    pub deadline: Duration,
    /// Upper bound for a single hop.
    pub hop_timeout: Duration,
}

impl Default for ChainBudget {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            hop_timeout: Duration::from_secs(45),
        }
    }
}

pub struct ModelChain {
    primary: Arc<dyn LanguageModel>,
    fallback: Option<Arc<dyn LanguageModel>>,
    budget: ChainBudget,
}

impl ModelChain {
    pub fn new(
        primary: Arc<dyn LanguageModel>,
        fallback: Option<Arc<dyn LanguageModel>>,
        budget: ChainBudget,
    ) -> Self {
        Self {
            primary,
            fallback,
            budget,
        }
    }

    pub fn budget(&self) -> ChainBudget {
        self.budget
    }

    /// Invoke the primary model; on any failure invoke the fallback once.
    ///
    /// Each hop is bounded by the smaller of the per-hop timeout and what is
    /// left of the deadline. The fallback is not started once the deadline
    /// has passed.
    pub async fn invoke(&self, request: &GenerationRequest) -> Result<ModelReply, PipelineError> {
        let deadline = Instant::now() + self.budget.deadline;

        let primary_err = match self.hop(self.primary.as_ref(), request, deadline).await {
            Ok(text) => return Ok(self.served(Tier::Primary, self.primary.as_ref(), text)),
            Err(e) => e,
        };
        warn!(
            tier = %Tier::Primary,
            model = self.primary.name(),
            error = %primary_err,
            "model invocation failed"
        );

        let Some(fallback) = &self.fallback else {
            return Err(PipelineError::ModelUnavailable(format!(
                "{} failed: {primary_err}",
                self.primary.name()
            )));
        };

        if deadline.saturating_duration_since(Instant::now()).is_zero() {
            return Err(PipelineError::ModelUnavailable(format!(
                "{} failed ({primary_err}) and the {:?} deadline elapsed before fallback",
                self.primary.name(),
                self.budget.deadline
            )));
        }

        match self.hop(fallback.as_ref(), request, deadline).await {
            Ok(text) => Ok(self.served(Tier::Fallback, fallback.as_ref(), text)),
            Err(fallback_err) => {
                warn!(
                    tier = %Tier::Fallback,
                    model = fallback.name(),
                    error = %fallback_err,
                    "model invocation failed"
                );
                Err(PipelineError::ModelUnavailable(format!(
                    "{} failed ({primary_err}); {} failed ({fallback_err})",
                    self.primary.name(),
                    fallback.name()
                )))
            }
        }
    }

    async fn hop(
        &self,
        model: &dyn LanguageModel,
        request: &GenerationRequest,
        deadline: Instant,
    ) -> Result<String, ModelError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let limit = self.budget.hop_timeout.min(remaining);
        let text = tokio::time::timeout(limit, model.generate(request))
            .await
            .map_err(|_| ModelError::Timeout(limit))??;
        if text.trim().is_empty() {
            return Err(ModelError::EmptyContent);
        }
        Ok(text)
    }

    fn served(&self, tier: Tier, model: &dyn LanguageModel, text: String) -> ModelReply {
        info!(%tier, model = model.name(), chars = text.len(), "model response received");
        ModelReply {
            text,
            tier,
            model: model.name().to_owned(),
        }
    }
}
