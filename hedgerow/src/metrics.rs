//! Metric names, described on first use.
//!
//! Only compiled with the `metrics` feature. Recording goes through the
//! [`metrics`] facade, so any installed recorder receives the values.

use lazy_static::lazy_static;

lazy_static! {
    // Hedging metrics

    /// Attempts launched, labelled by `kind` (primary or secondary).
    pub static ref HEDGING_ATTEMPTS: &'static str = {
        metrics::describe_counter!(
            "hedgerow_hedging_attempts_total",
            "Total number of hedged attempts launched."
        );
        "hedgerow_hedging_attempts_total"
    };
    /// Accepted outcomes, labelled by the `kind` of the winning attempt.
    pub static ref HEDGING_ACCEPTED: &'static str = {
        metrics::describe_counter!(
            "hedgerow_hedging_accepted_total",
            "Total number of hedged executions completed with an accepted outcome."
        );
        "hedgerow_hedging_accepted_total"
    };
    /// Histogram of background slot cleanup duration.
    pub static ref HEDGING_CLEANUP_DURATION: &'static str = {
        metrics::describe_histogram!(
            "hedgerow_hedging_cleanup_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of background cleanup of hedged attempts in seconds."
        );
        "hedgerow_hedging_cleanup_duration_seconds"
    };

    // Offload manager metrics

    /// Offload tasks spawned.
    pub static ref OFFLOAD_TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "hedgerow_offload_tasks_spawned_total",
            "Total number of offload tasks spawned."
        );
        "hedgerow_offload_tasks_spawned_total"
    };
    /// Offload tasks that ran to completion.
    pub static ref OFFLOAD_TASKS_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "hedgerow_offload_tasks_completed_total",
            "Total number of offload tasks completed."
        );
        "hedgerow_offload_tasks_completed_total"
    };
    /// Offload tasks currently running.
    pub static ref OFFLOAD_TASKS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "hedgerow_offload_tasks_active",
            "Number of currently active offload tasks."
        );
        "hedgerow_offload_tasks_active"
    };
    /// Histogram of offload task duration.
    pub static ref OFFLOAD_TASK_DURATION: &'static str = {
        metrics::describe_histogram!(
            "hedgerow_offload_task_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of offload tasks in seconds."
        );
        "hedgerow_offload_task_duration_seconds"
    };
}
