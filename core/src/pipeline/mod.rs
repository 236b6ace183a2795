pub mod claim_extractor;
pub mod crux_engine;
pub mod deduper;
pub mod taxonomizer;

use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::comment_filter::CommentFilterConfig;
use crate::completer::Completer;
use crate::error::PipelineResult;
use crate::telemetry::{StageName, Telemetry};
use crate::types::{
    ClaimTree, Comment, CruxReport, LlmConfig, StageResult, SortedTree, Taxonomy, Topic,
};
use crate::worker_pool::WorkerPool;

/// Thin composition root holding the shared `Completer`/`Telemetry`
/// wiring. Each method here is independently callable; nothing requires
/// a caller to run the four stages in sequence through this type.
pub struct Pipeline {
    pub completer: Arc<dyn Completer>,
    pub telemetry: Arc<dyn Telemetry>,
    pub comment_filter: CommentFilterConfig,
    pub worker_pool: WorkerPool,
    pub supports_json_mode: bool,
}

impl Pipeline {
    pub fn new(
        completer: Arc<dyn Completer>,
        telemetry: Arc<dyn Telemetry>,
        comment_filter: CommentFilterConfig,
        max_concurrency: usize,
        supports_json_mode: bool,
    ) -> Self {
        Pipeline {
            completer,
            telemetry,
            comment_filter,
            worker_pool: WorkerPool::new(max_concurrency),
            supports_json_mode,
        }
    }

    pub async fn taxonomy(
        &self,
        comments: &[Comment],
        llm: &LlmConfig,
        token: &CancellationToken,
    ) -> PipelineResult<StageResult<Vec<Topic>>> {
        let result = taxonomizer::run(
            &self.completer,
            comments,
            llm,
            &self.comment_filter,
            self.supports_json_mode,
            token,
        )
        .await?;
        self.telemetry.record_stage(
            StageName::Taxonomy,
            result.usage,
            result.cost,
            &result.data.iter().take(3).map(|t| serde_json::json!(t)).collect::<Vec<_>>(),
        );
        Ok(result)
    }

    pub async fn claims(
        &self,
        comments: &[Comment],
        llm: &LlmConfig,
        taxonomy: &Taxonomy,
        token: &CancellationToken,
    ) -> PipelineResult<StageResult<ClaimTree>> {
        let result = claim_extractor::run(
            &self.completer,
            comments,
            llm,
            taxonomy,
            &self.comment_filter,
            &self.worker_pool,
            self.supports_json_mode,
            token,
        )
        .await?;
        self.telemetry
            .record_stage(StageName::Claims, result.usage, result.cost, &[]);
        Ok(result)
    }

    pub async fn sort_claims_tree(
        &self,
        tree: &ClaimTree,
        llm: &LlmConfig,
        sort: &str,
        token: &CancellationToken,
    ) -> PipelineResult<StageResult<SortedTree>> {
        let result = deduper::run(
            &self.completer,
            tree,
            llm,
            sort,
            &self.worker_pool,
            self.supports_json_mode,
            token,
        )
        .await?;
        self.telemetry
            .record_stage(StageName::Sort, result.usage, result.cost, &[]);
        Ok(result)
    }

    pub async fn cruxes(
        &self,
        crux_tree: &ClaimTree,
        llm: &LlmConfig,
        topics: &[Topic],
        top_k: usize,
        token: &CancellationToken,
    ) -> PipelineResult<CruxReport> {
        let result = crux_engine::run(
            &self.completer,
            crux_tree,
            llm,
            topics,
            top_k,
            &self.worker_pool,
            self.supports_json_mode,
            token,
        )
        .await?;
        self.telemetry
            .record_stage(StageName::Crux, result.usage, result.cost, &[]);
        Ok(result)
    }
}

