//! Bounded-concurrency fan-out used by Stages 2-4 to dispatch one LLM
//! call per comment/subtopic without unbounded parallelism. Results are
//! collected back in the caller-supplied order (the dispatch index),
//! never in completion order, so downstream canonical-claim and
//! crux-generation ordering stays deterministic.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cancellation::{run_cancellable, CancellationToken};
use crate::error::PipelineResult;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize) -> Self {
        WorkerPool {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Runs `work` once per item, in parallel bounded by this pool's
    /// concurrency limit, and returns the results in the same order as
    /// `items` regardless of completion order. The whole batch is raced
    /// against `token`: if it fires before every dispatched unit has
    /// finished, this returns `PipelineError::Cancelled` immediately and
    /// drops the still-outstanding work rather than waiting it out.
    pub async fn map<T, F, Fut, R>(
        &self,
        items: Vec<T>,
        token: &CancellationToken,
        work: F,
    ) -> PipelineResult<Vec<R>>
    where
        T: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync,
        Fut: Future<Output = R> + Send,
        R: Send + 'static,
    {
        let futures = items.into_iter().enumerate().map(|(idx, item)| {
            let semaphore = self.semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                work(idx, item).await
            }
        });
        run_cancellable(token, futures::future::join_all(futures)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preserves_dispatch_order() {
        let pool = WorkerPool::new(4);
        let token = CancellationToken::new();
        let items: Vec<u32> = vec![5, 4, 3, 2, 1];
        let results = pool
            .map(items, &token, |idx, item| async move {
                // Simulate unequal completion latency via a tiny inverted sleep
                // proportional to the item so out-of-order completion is likely
                // if ordering weren't preserved by index.
                tokio::time::sleep(tokio::time::Duration::from_millis(item as u64)).await;
                (idx, item)
            })
            .await
            .unwrap();
        let indices: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let pool = WorkerPool::new(2);
        let token = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..8).collect();
        let in_flight2 = in_flight.clone();
        let max_seen2 = max_seen.clone();
        pool.map(items, &token, move |_idx, _item| {
            let in_flight = in_flight2.clone();
            let max_seen = max_seen2.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_the_batch() {
        let pool = WorkerPool::new(4);
        let token = CancellationToken::new();
        token.cancel();
        let items: Vec<u32> = vec![1, 2, 3];
        let result = pool.map(items, &token, |_idx, item| async move { item }).await;
        assert!(matches!(result, Err(crate::error::PipelineError::Cancelled)));
    }
}
