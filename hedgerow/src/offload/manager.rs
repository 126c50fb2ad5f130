use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

#[cfg(feature = "metrics")]
use crate::metrics::{
    OFFLOAD_TASK_DURATION, OFFLOAD_TASKS_ACTIVE, OFFLOAD_TASKS_COMPLETED, OFFLOAD_TASKS_SPAWNED,
};

/// Identity of a background task: its kind plus an id unique within the manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OffloadKey {
    kind: SmolStr,
    id: u64,
}

impl OffloadKey {
    /// Kind the task was spawned with (e.g. "hedging_cleanup").
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Identifier of the task within its manager.
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default)]
struct OffloadManagerInner {
    tasks: DashMap<OffloadKey, JoinHandle<()>>,
    key_counter: AtomicU64,
}

/// Stops tracking a task once it is done, however it ends.
struct Tracked {
    inner: Arc<OffloadManagerInner>,
    key: OffloadKey,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.inner.tasks.remove(&self.key);
    }
}

/// Runs work that must outlive the call that produced it.
///
/// Hedged executions hand their slot cleanup to the manager, which keeps
/// track of every task until it finishes so tests and shutdown code can
/// wait for it.
#[derive(Clone, Debug, Default)]
pub struct OffloadManager {
    inner: Arc<OffloadManagerInner>,
}

impl OffloadManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_key(&self, kind: impl Into<SmolStr>) -> OffloadKey {
        OffloadKey {
            kind: kind.into(),
            id: self.inner.key_counter.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Spawn a task under a freshly generated key of the given kind.
    ///
    /// ```ignore
    /// manager.spawn("hedging_cleanup", async move { context.cleanup().await });
    /// ```
    pub fn spawn<F>(&self, kind: impl Into<SmolStr>, task: F) -> OffloadKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = self.next_key(kind);
        let span = info_span!("hedging.offload", kind = %key.kind, id = key.id);
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let tracked = Tracked {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
        };

        #[cfg(feature = "metrics")]
        {
            let kind = key.kind.to_string();
            metrics::counter!(*OFFLOAD_TASKS_SPAWNED, "kind" => kind.clone()).increment(1);
            metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind).increment(1.0);
        }

        let handle = tokio::spawn(
            async move {
                // the handle must be in the map before `tracked` can remove it
                let _ = registered_rx.await;
                #[cfg(feature = "metrics")]
                let start = tokio::time::Instant::now();

                task.await;

                #[cfg(feature = "metrics")]
                Self::record_finish(start.elapsed(), &tracked.key.kind);
                drop(tracked);
            }
            .instrument(span),
        );

        self.inner.tasks.insert(key.clone(), handle);
        let _ = registered_tx.send(());
        key
    }

    /// Number of tracked tasks that are still running.
    pub fn active_task_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|entry| !entry.is_finished())
            .count()
    }

    /// Number of tracked tasks.
    pub fn total_task_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Wait until every tracked task has finished.
    pub async fn wait_all(&self) {
        while !self.inner.tasks.is_empty() {
            tokio::task::yield_now().await;
        }
    }

    /// Like [`wait_all`](Self::wait_all), giving up after `timeout`.
    ///
    /// Returns `false` if tasks were still running when the timeout elapsed.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }

    #[cfg(feature = "metrics")]
    fn record_finish(elapsed: Duration, kind: &SmolStr) {
        metrics::counter!(*OFFLOAD_TASKS_COMPLETED, "kind" => kind.to_string()).increment(1);
        metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind.to_string()).decrement(1.0);
        metrics::histogram!(*OFFLOAD_TASK_DURATION, "kind" => kind.to_string())
            .record(elapsed.as_secs_f64());
    }
}
