use std::panic::{self, AssertUnwindSafe};

use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{PatchIndex, PipelineError, Result, Stage};

/// Fixed-size worker pool for per-patch batches. Each batch blocks until every
/// task has finished; the first failing task fails the whole batch.
pub struct PatchPool {
    pool: ThreadPool,
}

impl PatchPool {
    /// `threads == 0` uses the available CPU count.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("patch-worker-{}", i))
            .build()?;
        debug!("patch pool started with {} threads", pool.current_num_threads());
        Ok(PatchPool { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `worker(ctx, patch)` for every task. Results come back in task
    /// order, keyed by their patch coordinate.
    pub fn run<C, T, F>(
        &self,
        stage: Stage,
        ctx: &C,
        tasks: &[PatchIndex],
        worker: F,
    ) -> Result<Vec<(PatchIndex, T)>>
    where
        C: Sync,
        T: Send,
        F: Fn(&C, PatchIndex) -> Result<T> + Sync,
    {
        self.pool.install(|| {
            tasks
                .par_iter()
                .map(|&patch| {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker(ctx, patch)));
                    match outcome {
                        Ok(Ok(value)) => Ok((patch, value)),
                        Ok(Err(err)) => Err(match err {
                            e @ PipelineError::WorkerFailed { .. } => e,
                            other => PipelineError::WorkerFailed {
                                stage,
                                patch,
                                reason: other.to_string(),
                            },
                        }),
                        Err(payload) => Err(PipelineError::WorkerFailed {
                            stage,
                            patch,
                            reason: panic_message(payload.as_ref()),
                        }),
                    }
                })
                .collect()
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_task_order() {
        let pool = PatchPool::new(3).unwrap();
        assert_eq!(pool.threads(), 3);
        let tasks: Vec<PatchIndex> = (0..4).flat_map(|i| (0..5).map(move |j| (i, j))).collect();
        let offset = 100usize;
        let out = pool
            .run(Stage::SignalMap, &offset, &tasks, |off, (i, j)| Ok(off + i * 10 + j))
            .unwrap();
        assert_eq!(out.len(), 20);
        for ((patch, value), task) in out.iter().zip(&tasks) {
            assert_eq!(patch, task);
            assert_eq!(*value, 100 + task.0 * 10 + task.1);
        }
    }

    #[test]
    fn one_failing_task_fails_the_batch() {
        let pool = PatchPool::new(2).unwrap();
        let tasks = vec![(0, 0), (0, 1), (1, 0)];
        let err = pool
            .run(Stage::TimeDelay, &(), &tasks, |_, patch| {
                if patch == (0, 1) {
                    Err(PipelineError::ShapeMismatch("bad".to_string()))
                } else {
                    Ok(1.0)
                }
            })
            .unwrap_err();
        match err {
            PipelineError::WorkerFailed { stage, patch, reason } => {
                assert_eq!(stage, Stage::TimeDelay);
                assert_eq!(patch, (0, 1));
                assert!(reason.contains("bad"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn panics_become_worker_failures() {
        let pool = PatchPool::new(2).unwrap();
        let err = pool
            .run(Stage::SignalMap, &(), &[(2, 3)], |_, _| -> Result<f64> {
                panic!("index out of bounds")
            })
            .unwrap_err();
        assert!(err.to_string().contains("worker panicked: index out of bounds"));
        assert_eq!(err.stage(), Some(Stage::SignalMap));
    }

    #[test]
    fn empty_batch_is_fine() {
        let pool = PatchPool::new(1).unwrap();
        let out = pool.run(Stage::SignalMap, &(), &[], |_, _| Ok(0u8)).unwrap();
        assert!(out.is_empty());
    }
}
