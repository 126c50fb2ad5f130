//! Hedging: race attempts of one operation and keep the first acceptable outcome.

pub mod controller;
pub mod handler;
mod strategy;

pub use controller::{
    ExecutionInfo, HedgedTaskType, HedgingController, HedgingExecutionContext, ON_HEDGING_EVENT,
    TaskExecution,
};
pub use handler::{
    ActionFn, AlwaysHedge, DelayArguments, DelayFn, DelayGenerator, HedgeArguments, HedgeFn,
    HedgePredicate, HedgedAction, HedgedActionArguments, HedgedActionGenerator, HedgingHandler,
    RepeatCallback, action_fn, delay_fn, hedge_fn,
};
pub use strategy::{HedgingStrategy, HedgingStrategyBuilder};
