//! Request-scoped cancellation. Every LLM call a pipeline stage dispatches
//! — whether a single call (Stage 1) or a worker-pool batch (Stages 2-4)
//! — is raced against the caller's token and fails fast with
//! `PipelineError::Cancelled` the instant it fires, rather than waiting
//! for in-flight work to finish.

use std::future::Future;

pub use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, PipelineResult};

pub async fn run_cancellable<F>(token: &CancellationToken, fut: F) -> PipelineResult<F::Output>
where
    F: Future,
{
    if token.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    tokio::select! {
        _ = token.cancelled() => Err(PipelineError::Cancelled),
        output = fut => Ok(output),
    }
}
