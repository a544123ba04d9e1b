//! Bounded-concurrency fan-out.

use futures::StreamExt;
use std::future::Future;

/// Default number of in-flight jobs when hydrating notes.
pub const DEFAULT_CONCURRENCY: usize = 15;

/// Apply `f` to every item with at most `limit` futures in flight.
///
/// A new job starts as soon as any running one finishes. Results come back
/// in input order regardless of completion order. A `limit` of 0 is
/// treated as 1.
pub async fn run_bounded<T, R, F, Fut>(limit: usize, items: impl IntoIterator<Item = T>, mut f: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let jobs = items.into_iter().enumerate().map(|(index, item)| {
        let job = f(item);
        async move { (index, job.await) }
    });

    let mut finished: Vec<(usize, R)> = futures::stream::iter(jobs)
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    finished.sort_by_key(|(index, _)| *index);
    finished.into_iter().map(|(_, result)| result).collect()
}
