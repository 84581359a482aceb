// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    any::Any,
    fmt::Debug,
    future::Future,
    panic::{self, AssertUnwindSafe},
};

use anyhow::anyhow;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Bounded worker pool running one task per independent unit of work.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    concurrency: usize,
}

/// Outcome of every unit handed to [Dispatcher::dispatch], in completion order.
#[derive(Debug)]
pub struct DispatchReport<K, T> {
    pub outcomes: Vec<(K, anyhow::Result<T>)>,
    /// Tasks that never reported back, because the runtime was shutting down.
    pub cancelled: usize,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("{failed} of {total} units failed, {cancelled} cancelled")]
pub struct DispatchError {
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl Dispatcher {
    /// A limit of `0` is interpreted as no limit.
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency }
    }

    /// Run `f` on every unit as its own tokio task, with no more than the configured number of
    /// tasks in flight, and wait for all of them. A unit that fails or panics is logged and
    /// reported, but never stops the others from running. This covers panics in `f` itself as
    /// well as in the future it returns.
    pub async fn dispatch<K, T, F, Fut>(
        &self,
        name: &'static str,
        units: impl IntoIterator<Item = K>,
        mut f: F,
    ) -> DispatchReport<K, T>
    where
        K: Clone + Debug + Send + 'static,
        T: Send + 'static,
        F: FnMut(K) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let limit = match self.concurrency {
            0 => usize::MAX,
            n => n,
        };

        // Number of permits to spawn tasks left.
        let mut permits = limit;
        // Handles for already spawned tasks.
        let mut join_set = JoinSet::new();
        let mut units = units.into_iter().fuse();

        let mut report = DispatchReport {
            outcomes: vec![],
            cancelled: 0,
        };

        loop {
            while permits > 0 {
                let Some(unit) = units.next() else {
                    break;
                };

                permits -= 1;
                match panic::catch_unwind(AssertUnwindSafe(|| f(unit.clone()))) {
                    Ok(task) => {
                        let task = AssertUnwindSafe(task).catch_unwind();
                        join_set.spawn(async move { (unit, task.await) });
                    }

                    // `f` panicked before handing over a future.
                    Err(panic) => {
                        join_set.spawn(async move { (unit, Err(panic)) });
                    }
                }
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };

            permits += 1;
            match joined {
                Ok((unit, Ok(Ok(value)))) => {
                    debug!(dispatch = name, ?unit, "Unit succeeded");
                    report.outcomes.push((unit, Ok(value)));
                }

                Ok((unit, Ok(Err(e)))) => {
                    error!(dispatch = name, ?unit, "Unit failed: {e:#}");
                    report.outcomes.push((unit, Err(e)));
                }

                Ok((unit, Err(panic))) => {
                    let e = anyhow!("Unit panicked: {}", panic_message(&*panic));
                    error!(dispatch = name, ?unit, "{e}");
                    report.outcomes.push((unit, Err(e)));
                }

                // Panics are caught inside the task, so the only way to get here is for the
                // runtime to be winding down.
                Err(e) => {
                    warn!(dispatch = name, "Unit cancelled: {e}");
                    report.cancelled += 1;
                }
            }
        }

        report
    }
}

impl<K, T> DispatchReport<K, T> {
    pub fn succeeded(&self) -> impl Iterator<Item = (&K, &T)> {
        self.outcomes
            .iter()
            .filter_map(|(k, r)| r.as_ref().ok().map(|t| (k, t)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&K, &anyhow::Error)> {
        self.outcomes
            .iter()
            .filter_map(|(k, r)| r.as_ref().err().map(|e| (k, e)))
    }

    /// Whether every unit ran to completion successfully.
    pub fn is_complete(&self) -> bool {
        self.cancelled == 0 && self.outcomes.iter().all(|(_, r)| r.is_ok())
    }

    /// Collapse the report into the successful values, or a summary of what went wrong.
    pub fn into_result(self) -> Result<Vec<(K, T)>, DispatchError> {
        let total = self.outcomes.len() + self.cancelled;
        let failed = self.outcomes.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 || self.cancelled > 0 {
            return Err(DispatchError {
                failed,
                cancelled: self.cancelled,
                total,
            });
        }

        Ok(self
            .outcomes
            .into_iter()
            .filter_map(|(k, r)| r.ok().map(|t| (k, t)))
            .collect())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(10)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
