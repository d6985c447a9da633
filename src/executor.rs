//! Bounded worker pool shared by every batch command.
//!
//! Items are dispatched onto tokio tasks held in a [`JoinSet`]; a
//! [`Semaphore`] caps how many run at once. Results are returned in input
//! order, one per item, and every task is joined before the call returns.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, trace};

use crate::types::OperationResult;
use crate::types::error::S3ToolError;
use crate::types::token::PipelineCancellationToken;

/// Run `worker` once per item with at most `concurrency` workers in flight.
///
/// A failing or panicking worker only affects its own result. Once
/// `cancellation_token` is cancelled no further items are started; they are
/// reported as `Failure(Cancelled)` while items already running are joined.
///
/// A `concurrency` of 0 is treated as 1.
pub async fn run_batch<T, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    cancellation_token: PipelineCancellationToken,
    worker: F,
) -> Vec<OperationResult>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult> + Send + 'static,
{
    dispatch(
        items,
        concurrency,
        cancellation_token,
        Arc::new(worker),
        OperationResult::Failure,
    )
    .await
}

/// Two-level fan-out used when each input expands into many work items.
///
/// An outer pool of `outer` workers runs `gather` for each group. The items a
/// group yields are then processed by their own inner pool of `inner`
/// workers. A group whose `gather` fails contributes a single failure; inner
/// failures never abort other items or other groups.
///
/// Results are flattened in group order, then item order.
pub async fn run_two_level<G, T, Gather, GatherFut, F, Fut>(
    groups: Vec<G>,
    outer: usize,
    inner: usize,
    cancellation_token: PipelineCancellationToken,
    gather: Gather,
    worker: F,
) -> Vec<OperationResult>
where
    G: Send + 'static,
    T: Send + 'static,
    Gather: Fn(G) -> GatherFut + Send + Sync + 'static,
    GatherFut: Future<Output = Result<Vec<T>, S3ToolError>> + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult> + Send + 'static,
{
    let gather = Arc::new(gather);
    let worker = Arc::new(worker);
    let inner_token = cancellation_token.clone();

    let group_worker = move |group: G| {
        let gather = gather.clone();
        let worker = worker.clone();
        let cancellation_token = inner_token.clone();
        async move {
            let items = match gather(group).await {
                Ok(items) => items,
                Err(e) => return vec![OperationResult::Failure(e)],
            };
            debug!(items = items.len(), "group gathered.");

            dispatch(
                items,
                inner,
                cancellation_token,
                worker,
                OperationResult::Failure,
            )
            .await
        }
    };

    dispatch(
        groups,
        outer,
        cancellation_token,
        Arc::new(group_worker),
        |e| vec![OperationResult::Failure(e)],
    )
    .await
    .into_iter()
    .flatten()
    .collect()
}

async fn dispatch<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    cancellation_token: PipelineCancellationToken,
    worker: Arc<F>,
    lost: fn(S3ToolError) -> R,
) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut results: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    let mut join_set = JoinSet::new();
    let mut task_indexes = HashMap::new();

    for (index, item) in items.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            trace!(index = index, "item not started due to cancellation.");
            results[index] = Some(lost(S3ToolError::Cancelled));
            continue;
        };

        let worker = worker.clone();
        let handle = join_set.spawn(async move {
            let _permit = permit;
            (index, worker(item).await)
        });
        task_indexes.insert(handle.id(), index);
    }

    while let Some(joined) = join_set.join_next_with_id().await {
        match joined {
            Ok((_, (index, result))) => results[index] = Some(result),
            Err(e) => {
                let Some(&index) = task_indexes.get(&e.id()) else {
                    error!("joined a task that was never dispatched: {e}");
                    continue;
                };
                error!(index = index, "worker task failed: {e}");
                let message = if e.is_panic() {
                    "worker panicked".to_string()
                } else {
                    e.to_string()
                };
                results[index] = Some(lost(S3ToolError::Worker(message)));
            }
        }
    }

    results
        .into_iter()
        .map(|result| result.unwrap_or_else(|| lost(S3ToolError::Cancelled)))
        .collect()
}
