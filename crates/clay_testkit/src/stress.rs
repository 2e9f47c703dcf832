//! Concurrent persist helpers.

use clay_core::{CoreResult, Model};
use serde_json::json;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of a concurrent persist run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Every id handed out, in no particular order.
    pub ids: Vec<u64>,
    /// Persists that failed.
    pub failed: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl StressResult {
    /// Ids sorted ascending.
    pub fn sorted_ids(&self) -> Vec<u64> {
        let mut ids = self.ids.clone();
        ids.sort_unstable();
        ids
    }
}

/// Persists `per_thread` entities of `model` from each of `threads` threads.
///
/// Each entity is built from `{"name": "<thread>-<n>"}`.
pub fn concurrent_persist(model: &Model, threads: usize, per_thread: usize) -> StressResult {
    let start = Instant::now();
    let outcomes: Vec<Vec<CoreResult<u64>>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let model = model.clone();
                scope.spawn(move || {
                    (0..per_thread)
                        .map(|n| {
                            let entity = model.new(json!({"name": format!("{t}-{n}")}))?;
                            entity.save().map(|(id, _)| id)
                        })
                        .collect::<Vec<CoreResult<u64>>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("persist thread panicked"))
            .collect()
    });

    let mut ids = Vec::new();
    let mut failed = 0;
    for outcome in outcomes.into_iter().flatten() {
        match outcome {
            Ok(id) => ids.push(id),
            Err(_) => failed += 1,
        }
    }
    StressResult {
        ids,
        failed,
        duration: start.elapsed(),
    }
}
