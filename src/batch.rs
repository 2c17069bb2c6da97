//! Failure-isolating batch driver.
//!
//! Items run on a bounded pool of scoped worker threads pulling from a shared
//! queue. A failing item is logged and recorded; the remaining items still
//! run. Results are reported in input order.

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::{Arc, Mutex, mpsc::channel};

use tracing::{error, info};

/// One item that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub item: String,
    pub message: String,
}

/// Outcome of a batch, in input order.
#[derive(Debug)]
pub struct BatchReport<R> {
    pub completed: Vec<(String, R)>,
    pub failed: Vec<BatchFailure>,
}

impl<R> BatchReport<R> {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// `Err("<failed> of <total> <what> failed")` when any item failed.
    ///
    /// The command line tools return this after printing their summary, so
    /// every tool exits with status 1 on a partial failure.
    pub fn ensure_success(&self, what: &str) -> Result<(), String> {
        if self.is_success() {
            return Ok(());
        }
        Err(format!("{} of {} {what} failed", self.failed.len(), self.total()))
    }
}

/// Run `work` over `items` on up to `workers` threads.
///
/// `label` names an item in logs and failure reports.
pub fn run_batch<T, R, E, L, W>(items: Vec<T>, workers: usize, label: L, work: W) -> BatchReport<R>
where
    T: Send,
    R: Send,
    E: Display,
    L: Fn(&T) -> String + Sync,
    W: Fn(&T) -> Result<R, E> + Sync,
{
    let total = items.len();
    if total == 0 {
        return BatchReport {
            completed: Vec::new(),
            failed: Vec::new(),
        };
    }
    let worker_count = workers.min(total).max(1);
    let queue = Arc::new(Mutex::new(items.into_iter().enumerate().collect::<VecDeque<_>>()));
    let (tx, rx) = channel();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let label = &label;
            let work = &work;
            scope.spawn(move || {
                loop {
                    let next = {
                        let mut guard = match queue.lock() {
                            Ok(guard) => guard,
                            Err(_) => return,
                        };
                        guard.pop_front()
                    };
                    let Some((index, item)) = next else {
                        break;
                    };
                    let name = label(&item);
                    let outcome = work(&item).map_err(|err| err.to_string());
                    if tx.send((index, name, outcome)).is_err() {
                        return;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut results = rx.into_iter().collect::<Vec<_>>();
    results.sort_by_key(|(index, _, _)| *index);
    let mut report = BatchReport {
        completed: Vec::with_capacity(total),
        failed: Vec::new(),
    };
    for (_, item, outcome) in results {
        match outcome {
            Ok(value) => report.completed.push((item, value)),
            Err(message) => {
                error!("{item} failed: {message}");
                report.failed.push(BatchFailure { item, message });
            }
        }
    }
    info!(
        "Batch finished: {} completed, {} failed",
        report.completed.len(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_do_not_stop_other_items() {
        let items: Vec<u32> = (0..20).collect();
        let report = run_batch(items, 4, |item| format!("item_{item}"), |item| {
            if item % 5 == 0 {
                Err(format!("bad {item}"))
            } else {
                Ok(item * 2)
            }
        });
        assert_eq!(report.total(), 20);
        assert_eq!(report.failed.len(), 4);
        assert_eq!(report.failed[0].item, "item_0");
        assert_eq!(report.failed[1].message, "bad 5");
        let doubled: Vec<u32> = report.completed.iter().map(|(_, value)| *value).collect();
        assert_eq!(doubled[..3], [2, 4, 6]);
        assert!(!report.is_success());
        assert_eq!(report.ensure_success("items"), Err("4 of 20 items failed".to_string()));
    }

    #[test]
    fn single_worker_and_empty_batches() {
        let report = run_batch(vec!["a", "b"], 0, |item| item.to_string(), |item| {
            Ok::<_, String>(item.len())
        });
        assert!(report.is_success());
        assert_eq!(report.completed, vec![("a".to_string(), 1), ("b".to_string(), 1)]);
        assert_eq!(report.ensure_success("items"), Ok(()));

        let empty = run_batch(Vec::<u8>::new(), 3, |_| String::new(), |_| Ok::<_, String>(()));
        assert_eq!(empty.total(), 0);
    }
}
