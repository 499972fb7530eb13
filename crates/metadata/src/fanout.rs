//! Concurrent fan-out/fan-in over independent store queries.

use crate::error::{MetadataError, MetadataResult};
use std::future::Future;
use tokio::task::JoinSet;

/// A set of independent tasks joined at a single barrier.
///
/// [`TaskGroup::join`] waits for every task, then returns either all
/// results in spawn order or the first error that occurred. A partial set
/// of results is never returned.
pub struct TaskGroup<T> {
    tasks: JoinSet<(usize, MetadataResult<T>)>,
    spawned: usize,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            spawned: 0,
        }
    }

    /// Start a task. Its result lands at the position of this call.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = MetadataResult<T>> + Send + 'static,
    {
        let index = self.spawned;
        self.spawned += 1;
        self.tasks.spawn(async move { (index, task.await) });
    }

    pub fn len(&self) -> usize {
        self.spawned
    }

    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Wait for all tasks to finish.
    pub async fn join(mut self) -> MetadataResult<Vec<T>> {
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None)
            .take(self.spawned)
            .collect();
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok((index, Ok(value))) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(value);
                    }
                    continue;
                }
                Ok((_, Err(err))) => err,
                Err(join_err) => MetadataError::TaskFailed(join_err.to_string()),
            };
            if first_error.is_none() {
                first_error = Some(outcome);
            } else {
                tracing::debug!(error = %outcome, "additional fan-out task failed");
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| MetadataError::TaskFailed("task finished without a result".into()))
            })
            .collect()
    }
}

impl<T: Send + 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One partition of a by-patchset tryjob listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchsetPartition {
    /// No patchset filter: every tryjob of the issue.
    All,
    Patchset(i64),
}

impl PatchsetPartition {
    /// Partitions for a patchset filter, in ascending patchset order.
    ///
    /// An empty filter yields the single [`PatchsetPartition::All`]
    /// partition, so a listing always runs at least one query.
    pub fn from_filter(patchset_ids: &[i64]) -> Vec<Self> {
        if patchset_ids.is_empty() {
            return vec![Self::All];
        }
        let mut ids = patchset_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(Self::Patchset).collect()
    }
}
