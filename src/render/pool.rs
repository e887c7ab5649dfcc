//! Bounded fail-fast worker pool for CPU-bound per-item work.
//!
//! [`FailFastPool::run`] hands each item to a blocking task, with at most
//! `limit` tasks in flight. The first task to fail cancels every task that
//! has not started yet; tasks already running finish normally. Items are
//! moved into their task and put back at their original index, so output
//! order never depends on completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::debug;

use crate::{KittenError, Result};

/// Default number of frames composited concurrently.
pub const DEFAULT_FRAME_CONCURRENCY: usize = 8;

/// Shared between the scheduler and its tasks.
struct FailFast {
    cancelled: AtomicBool,
    first_error: Mutex<Option<KittenError>>,
}

impl FailFast {
    fn fail(&self, err: KittenError) {
        let mut first = self.first_error.lock().unwrap_or_else(|e| e.into_inner());
        if first.is_none() {
            *first = Some(err);
        }
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn take_error(&self) -> Option<KittenError> {
        self.first_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

/// Worker pool with a fixed concurrency limit and first-error-wins semantics.
#[derive(Debug, Clone, Copy)]
pub struct FailFastPool {
    limit: usize,
}

impl Default for FailFastPool {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CONCURRENCY)
    }
}

impl FailFastPool {
    /// Pool running at most `limit` tasks at once (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Apply `task` to every item, mutating it in place.
    ///
    /// Returns the items in their original order, or the first error raised
    /// by any task. On error the items are dropped: partial work is never
    /// returned.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub async fn run<T, F>(&self, items: Vec<T>, task: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(usize, &mut T) -> Result<()> + Send + Sync + 'static,
    {
        let total = items.len();
        let task = Arc::new(task);
        let state = Arc::new(FailFast {
            cancelled: AtomicBool::new(false),
            first_error: Mutex::new(None),
        });
        let semaphore = Arc::new(Semaphore::new(self.limit));

        let mut slots: Vec<Option<T>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);
        let mut indices: Vec<(Id, usize)> = Vec::with_capacity(total);
        let mut set = JoinSet::new();
        let mut scheduled = 0;

        for (index, mut item) in items.into_iter().enumerate() {
            while let Some(joined) = set.try_join_next_with_id() {
                collect(joined, &mut slots, &indices, &state);
            }
            if state.is_cancelled() {
                break;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| KittenError::FrameTask {
                    index,
                    message: format!("worker pool closed: {e}"),
                })?;
            if state.is_cancelled() {
                break;
            }

            let task = Arc::clone(&task);
            let state = Arc::clone(&state);
            let handle = set.spawn_blocking(move || {
                let _permit = permit;
                // Cancelled between scheduling and start: leave the item as is.
                if !state.is_cancelled() {
                    if let Err(err) = task(index, &mut item) {
                        state.fail(err);
                    }
                }
                (index, item)
            });
            indices.push((handle.id(), index));
            scheduled += 1;
        }

        while let Some(joined) = set.join_next_with_id().await {
            collect(joined, &mut slots, &indices, &state);
        }

        if let Some(err) = state.take_error() {
            debug!(total, scheduled, error = %err, "fail-fast pool aborted");
            return Err(err);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| KittenError::FrameTask {
                    index,
                    message: "task did not complete".to_string(),
                })
            })
            .collect()
    }
}

fn collect<T>(
    joined: std::result::Result<(Id, (usize, T)), JoinError>,
    slots: &mut [Option<T>],
    indices: &[(Id, usize)],
    state: &FailFast,
) {
    match joined {
        Ok((_, (index, item))) => slots[index] = Some(item),
        Err(err) => {
            let index = indices
                .iter()
                .find(|(id, _)| *id == err.id())
                .map_or(usize::MAX, |(_, index)| *index);
            state.fail(KittenError::FrameTask {
                index,
                message: format!("task panicked: {err}"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn mutates_in_place_and_keeps_order() {
        let pool = FailFastPool::new(3);
        let out = pool
            .run((0..20u32).collect(), |index, item| {
                // Reverse-order completion: early items sleep longer.
                std::thread::sleep(Duration::from_millis((20 - index as u64) / 4));
                *item *= 10;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(out, (0..20u32).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn empty_input_is_ok() {
        let out = FailFastPool::default()
            .run(Vec::<u8>::new(), |_, _| Ok(()))
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn first_error_stops_unstarted_tasks() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let result = FailFastPool::new(2)
            .run((0..50usize).collect(), move |index, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                if index == 3 {
                    return Err(KittenError::FrameTask {
                        index,
                        message: "boom".into(),
                    });
                }
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, KittenError::FrameTask { index: 3, .. }));
        assert!(started.load(Ordering::SeqCst) < 50);
    }

    #[tokio::test]
    async fn panicking_task_is_reported() {
        let result = FailFastPool::new(4)
            .run(vec![1, 2, 3], |index, _| {
                if index == 1 {
                    panic!("frame exploded");
                }
                Ok(())
            })
            .await;
        assert!(matches!(
            result.unwrap_err(),
            KittenError::FrameTask { index: 1, .. }
        ));
    }

    #[test]
    fn limit_is_at_least_one() {
        assert_eq!(FailFastPool::new(0).limit(), 1);
        assert_eq!(FailFastPool::default().limit(), DEFAULT_FRAME_CONCURRENCY);
    }
}
