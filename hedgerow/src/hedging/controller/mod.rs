//! Pooled bookkeeping behind a hedged execution.

mod execution;
mod execution_context;
mod pool;
mod snapshot;

use std::sync::{Arc, Weak};

use hedgerow_core::ResilienceContext;

pub use execution::{HedgedTaskType, ON_HEDGING_EVENT, TaskExecution};
pub use execution_context::{CLEANUP_TASK_KIND, ExecutionInfo, HedgingExecutionContext};
pub use pool::{ObjectPool, Resettable};
pub use snapshot::ContextSnapshot;

use super::handler::HedgingHandler;
use crate::offload::OffloadManager;
use crate::options::MaxAttempts;

/// Factory of hedging execution contexts with pooled reuse.
pub struct HedgingController<T> {
    context_pool: Arc<ObjectPool<HedgingExecutionContext<T>>>,
    execution_pool: Arc<ObjectPool<TaskExecution<T>>>,
}

impl<T> HedgingController<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a controller whose contexts run at most `max_attempts` attempts.
    pub fn new(
        handler: Arc<HedgingHandler<T>>,
        max_attempts: MaxAttempts,
        offload: OffloadManager,
    ) -> Self {
        let capacity = pool::default_capacity();
        let execution_pool = Arc::new(ObjectPool::new(capacity, move || {
            TaskExecution::new(Arc::clone(&handler))
        }));

        let context_pool = Arc::new_cyclic(|pool: &Weak<ObjectPool<HedgingExecutionContext<T>>>| {
            // contexts find their way back only while the controller is alive
            let home = pool.clone();
            let execution_pool = Arc::clone(&execution_pool);
            ObjectPool::new(capacity, move || {
                HedgingExecutionContext::new(
                    Arc::clone(&execution_pool),
                    offload.clone(),
                    max_attempts.as_usize(),
                    home.clone(),
                )
            })
        });

        Self {
            context_pool,
            execution_pool,
        }
    }

    /// Rents a context and initializes it against the caller context.
    ///
    /// The context returns to the pool on its own once the cleanup scheduled
    /// by [`HedgingExecutionContext::complete`] or
    /// [`HedgingExecutionContext::abandon`] has finished.
    pub fn get_context(&self, context: &mut ResilienceContext) -> HedgingExecutionContext<T> {
        let mut hedging = self.context_pool.get();
        hedging.initialize(context);
        hedging
    }
}

impl<T> HedgingController<T> {
    /// Contexts handed out and not yet returned.
    pub fn rented_contexts(&self) -> usize {
        self.context_pool.rented()
    }

    /// Attempt slots handed out and not yet returned.
    pub fn rented_executions(&self) -> usize {
        self.execution_pool.rented()
    }
}

impl<T> std::fmt::Debug for HedgingController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HedgingController")
            .field("contexts", &self.context_pool)
            .field("executions", &self.execution_pool)
            .finish()
    }
}
