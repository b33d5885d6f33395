use async_trait::async_trait;

use crate::Result;

use super::types::*;

/// Chat completion provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse>;
}

/// Post-hoc generation statistics (authoritative token counts and cost).
///
/// Transport failures are `Err`; anything the endpoint answered is a [`StatsResponse`].
#[async_trait]
pub trait GenerationStatsSource: Send + Sync {
    async fn fetch(&self, generation_id: &str) -> Result<StatsResponse>;
}
