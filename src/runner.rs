//! Bounded concurrent fan-out used by the fetch and sync stages.
//!
//! Each item gets its own task; a counting semaphore bounds how many run at
//! once. Results come back over a channel sized to the item count so no task
//! ever blocks on an unread result, and the drain loop doubles as the
//! completion barrier (the channel closes once every task has finished).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// Runs `worker` over `items` with at most `concurrency` tasks in flight.
///
/// Cancellation is cooperative: it is checked before a task acquires a
/// permit, again after acquiring (queued tasks must not start stale work),
/// after the worker completes (late results are dropped), and after each
/// drained result. On cancellation the partial result set collected so far
/// is returned; completion order is unspecified.
///
/// A `concurrency` of 1 degenerates to strictly sequential processing.
pub async fn run<T, R, F, Fut>(
    token: &CancellationToken,
    concurrency: usize,
    items: Vec<T>,
    worker: F,
) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<R>(total.max(1));
    let worker = Arc::new(worker);

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let worker = Arc::clone(&worker);
        let tx = tx.clone();
        let token = token.clone();

        tokio::spawn(async move {
            let _permit = tokio::select! {
                () = token.cancelled() => return,
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return, // semaphore closed, nothing to do
                },
            };

            if token.is_cancelled() {
                return;
            }

            let result = worker(item).await;

            // a result produced after cancellation is stale; drop it
            if token.is_cancelled() {
                return;
            }
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    let mut results = Vec::with_capacity(total);
    while let Some(result) = rx.recv().await {
        results.push(result);
        if token.is_cancelled() {
            break;
        }
    }
    results
}
