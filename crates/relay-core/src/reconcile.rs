//! Turns a completion into exactly one billed [`ExpenseRecord`].
//!
//! Authoritative numbers come from the provider's generation stats when they
//! become available in time; otherwise the price table estimates the cost from
//! the normalized usage.

use std::{sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
    llm::{
        client::GenerationStatsSource,
        types::{CompletionResponse, GenerationStats, StatsResponse},
    },
    pricing::PriceTable,
    storage::ExpenseRecord,
};

/// Linear backoff for pending stats: the wait before retry `n` is `n * backoff_step`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_secs(1),
        }
    }
}

pub struct CostReconciler {
    stats: Arc<dyn GenerationStatsSource>,
    policy: RetryPolicy,
    prices: PriceTable,
}

impl CostReconciler {
    pub fn new(stats: Arc<dyn GenerationStatsSource>, policy: RetryPolicy) -> Self {
        Self {
            stats,
            policy,
            prices: PriceTable::default(),
        }
    }

    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }

    /// Never fails: every lookup problem degrades to the price-table estimate.
    pub async fn reconcile(
        &self,
        completion: &CompletionResponse,
        requested_model: &str,
    ) -> ExpenseRecord {
        let stats = match completion.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => self.lookup(id).await,
            None => None,
        };

        let mut record = match stats {
            Some(stats) => {
                let record = from_stats(&stats, completion, requested_model);
                tracing::debug!(
                    id = %stats.id,
                    cost = record.cost,
                    native_tokens = record.input_tokens + record.output_tokens,
                    "generation stats"
                );
                record
            }
            None => {
                let usage = completion.usage;
                tracing::warn!(model = requested_model, "using estimated cost");
                ExpenseRecord {
                    timestamp: Utc::now(),
                    model: requested_model.to_string(),
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                    cost: self.prices.estimate(
                        requested_model,
                        usage.prompt_tokens,
                        usage.completion_tokens,
                    ),
                }
            }
        };

        if !record.cost.is_finite() || record.cost < 0.0 {
            record.cost = 0.0;
        }
        record
    }

    async fn lookup(&self, id: &str) -> Option<GenerationStats> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last = StatsResponse::Pending;

        for attempt in 1..=attempts {
            match self.stats.fetch(id).await {
                Err(e) => {
                    tracing::warn!(id, error = %e, "generation stats lookup failed");
                    return None;
                }
                Ok(StatsResponse::Pending) => {
                    last = StatsResponse::Pending;
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.backoff_step * attempt).await;
                    }
                }
                Ok(other) => {
                    last = other;
                    break;
                }
            }
        }

        match last {
            StatsResponse::Ready(stats) => Some(stats),
            StatsResponse::Pending => {
                tracing::warn!(id, attempts, "generation stats still pending");
                None
            }
            StatsResponse::Failed { status, body } => {
                tracing::warn!(id, status, body = %body, "generation stats unavailable");
                None
            }
        }
    }
}

fn from_stats(
    stats: &GenerationStats,
    completion: &CompletionResponse,
    requested_model: &str,
) -> ExpenseRecord {
    let model = if stats.model.is_empty() {
        requested_model.to_string()
    } else {
        stats.model.clone()
    };

    ExpenseRecord {
        timestamp: Utc::now(),
        model,
        input_tokens: stats
            .native_tokens_prompt
            .or(stats.tokens_prompt)
            .unwrap_or(completion.usage.prompt_tokens),
        output_tokens: stats
            .native_tokens_completion
            .or(stats.tokens_completion)
            .unwrap_or(completion.usage.completion_tokens),
        cost: stats.total_cost,
    }
}
