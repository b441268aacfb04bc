//! Bounded fork-join over per-device work
//!
//! Every task is joined before `fork_join` returns, so no work outlives the
//! stage that started it.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Run `task` for every item with at most `max_concurrency` in flight.
///
/// Results come back in input order. A slot is `None` if its task panicked.
pub async fn fork_join<T, R, F, Fut>(items: Vec<T>, max_concurrency: usize, task: F) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();
    let mut tasks = JoinSet::new();

    for (idx, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let fut = task(item);
        tasks.spawn(async move {
            // The semaphore is never closed, so acquire only fails if that changes
            let _permit = semaphore.acquire_owned().await.ok();
            (idx, fut.await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => error!(error = %e, "fork_join_task_failed"),
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_in_input_order() {
        // Later items finish first
        let results = fork_join(vec![30u64, 20, 10, 0], 4, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay
        })
        .await;

        assert_eq!(results, vec![Some(30), Some(20), Some(10), Some(0)]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = fork_join((0..10).collect::<Vec<_>>(), 3, |i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(results.len(), 10);
        assert!(results.iter().all(Option::is_some));
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_panicking_task_leaves_empty_slot() {
        let results = fork_join(vec![1, 2, 3], 2, |i| async move {
            if i == 2 {
                panic!("boom");
            }
            i
        })
        .await;

        assert_eq!(results, vec![Some(1), None, Some(3)]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<Option<u32>> = fork_join(Vec::<u32>::new(), 4, |i| async move { i }).await;
        assert!(results.is_empty());
    }
}
