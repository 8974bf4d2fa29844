//! Parallel per-resource-unit runner (§5, §9 "parallel stages must use
//! per-thread streams derived deterministically from the RU index and the
//! year").
//!
//! Grounded on the `AsyncComputeTaskPool` dispatch pattern, but every stage
//! here is CPU-bound and runs to completion within the year, so a scoped
//! `ComputeTaskPool::scope` replaces the async-task/poll split: a resource
//! unit never outlives the stage that owns it.

use crate::error::WorkerError;
use bevy_tasks::ComputeTaskPool;
use std::sync::Mutex;

/// Runs `work` once per item in `units`, either in parallel across
/// `ComputeTaskPool` or sequentially on the calling thread, collecting every
/// `WorkerError` rather than aborting at the first one (§5, §7).
///
/// The stage only fails as a whole if at least one unit failed; the caller
/// re-throws the first recorded error after the full pass completes, the way
/// §7 describes "the rest of the stage still runs to completion."
pub struct ParallelRunner {
    pub multithreaded: bool,
}

impl ParallelRunner {
    pub fn new(multithreaded: bool) -> Self {
        Self { multithreaded }
    }

    pub fn run_stage<T, F>(&self, phase: &str, units: &mut [T], work: F) -> Vec<WorkerError>
    where
        T: Send,
        F: Fn(usize, &mut T) -> Result<(), String> + Sync,
    {
        if !self.multithreaded || units.len() < 2 {
            return run_sequential(phase, units, &work);
        }

        let errors: Mutex<Vec<WorkerError>> = Mutex::new(Vec::new());
        ComputeTaskPool::get().scope(|scope| {
            for (index, unit) in units.iter_mut().enumerate() {
                let work = &work;
                let errors = &errors;
                scope.spawn(async move {
                    if let Err(message) = work(index, unit) {
                        errors.lock().unwrap().push(WorkerError {
                            phase: phase.to_string(),
                            unit_index: index,
                            message,
                        });
                    }
                });
            }
        });
        errors.into_inner().unwrap()
    }
}

fn run_sequential<T, F>(phase: &str, units: &mut [T], work: &F) -> Vec<WorkerError>
where
    F: Fn(usize, &mut T) -> Result<(), String>,
{
    let mut errors = Vec::new();
    for (index, unit) in units.iter_mut().enumerate() {
        if let Err(message) = work(index, unit) {
            errors.push(WorkerError {
                phase: phase.to_string(),
                unit_index: index,
                message,
            });
        }
    }
    errors
}

/// Picks the first error to re-throw at the stage barrier, preserving the
/// lowest unit index so failures are reproducible across runs (§7).
pub fn first_error(mut errors: Vec<WorkerError>) -> Option<WorkerError> {
    errors.sort_by_key(|e| e.unit_index);
    errors.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_stage_collects_all_failures() {
        let runner = ParallelRunner::new(false);
        let mut units = vec![1, 2, 3, 4];
        let errors = runner.run_stage("test stage", &mut units, |_, u| {
            if *u % 2 == 0 {
                Err(format!("bad unit {u}"))
            } else {
                Ok(())
            }
        });
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn first_error_picks_lowest_unit_index() {
        let errors = vec![
            WorkerError {
                phase: "p".to_string(),
                unit_index: 5,
                message: "b".to_string(),
            },
            WorkerError {
                phase: "p".to_string(),
                unit_index: 2,
                message: "a".to_string(),
            },
        ];
        assert_eq!(first_error(errors).unwrap().unit_index, 2);
    }

    #[test]
    fn single_unit_stage_runs_sequentially_without_pool() {
        let runner = ParallelRunner::new(true);
        let mut units = vec![1];
        let errors = runner.run_stage("solo", &mut units, |_, _| Ok(()));
        assert!(errors.is_empty());
    }
}
