mod common;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::{SERVED_BY, Script, Step, is_panicked};
use hedgerow::hedging::{
    ExecutionInfo, HedgedTaskType, HedgingController, HedgingExecutionContext, HedgingHandler,
};
use hedgerow::offload::OffloadManager;
use hedgerow::{
    HedgingDelay, MaxAttempts, Outcome, ResilienceContext, ResilienceProperties, hedge_fn,
    predicate_fn,
};
use tokio::time::Instant;

fn controller_with(handler: HedgingHandler<usize>, max_attempts: u8) -> HedgingController<usize> {
    HedgingController::new(
        Arc::new(handler),
        MaxAttempts::try_from_u8(max_attempts).unwrap(),
        OffloadManager::new(),
    )
}

fn controller(max_attempts: u8) -> HedgingController<usize> {
    controller_with(HedgingHandler::new(HedgingDelay::immediate()), max_attempts)
}

fn accepted(hedging: &HedgingExecutionContext<usize>) -> usize {
    hedging.tasks().iter().filter(|t| t.is_accepted()).count()
}

/// Drives a context the way the strategy does, without cancellation handling.
async fn drive<F, Fut>(
    hedging: &mut HedgingExecutionContext<usize>,
    callback: &F,
    delay: HedgingDelay,
) -> Outcome<usize>
where
    F: Fn(ResilienceContext, ()) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<usize>> + Send + 'static,
{
    loop {
        if let ExecutionInfo::Finished(outcome) = hedging.load_execution(callback, &()).await {
            return outcome;
        }
        if let Some(execution) = hedging.try_wait_for_completed_execution(delay).await
            && !execution.is_handled()
        {
            execution.accept_outcome();
            return execution.take_outcome().unwrap();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_initialize_swaps_in_replacement_properties() {
    let controller = controller(2);
    let mut context = ResilienceContext::new();
    let original = context.properties().clone();

    let hedging = controller.get_context(&mut context);

    assert!(hedging.is_initialized());
    assert!(!context.properties().ptr_eq(&original));
    let snapshot = hedging.snapshot().unwrap();
    assert!(snapshot.original_properties().ptr_eq(&original));

    hedging.complete(&mut context);
    assert!(context.properties().ptr_eq(&original));
}

#[tokio::test(start_paused = true)]
async fn test_immediate_delay_does_not_block() {
    let controller = controller(2);
    let script = Script::new(vec![Step::ok(100)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    assert!(matches!(
        hedging.load_execution(&callback, &()).await,
        ExecutionInfo::Loaded(execution) if execution.kind() == HedgedTaskType::Primary
    ));
    let start = Instant::now();
    assert!(
        hedging
            .try_wait_for_completed_execution(HedgingDelay::immediate())
            .await
            .is_none()
    );
    assert_eq!(start.elapsed(), Duration::ZERO);

    let outcome = drive(&mut hedging, &callback, HedgingDelay::Infinite).await;
    assert!(outcome.has_result());
    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_completed_attempt_is_returned_without_delay() {
    let controller = controller(3);
    let script = Script::new(vec![Step::ok(0)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    hedging.load_execution(&callback, &()).await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(hedging.tasks()[0].is_completed());

    let start = Instant::now();
    let execution = hedging
        .try_wait_for_completed_execution(HedgingDelay::Fixed(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(execution.outcome().and_then(|o| o.result()), Some(&0));
    assert!(!execution.is_handled());

    execution.accept_outcome();
    assert_eq!(hedging.executing_tasks(), 0);
    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_without_loaded_attempts_returns_none() {
    let controller = controller(2);
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    assert!(
        hedging
            .try_wait_for_completed_execution(HedgingDelay::Infinite)
            .await
            .is_none()
    );
    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_budget_limits_loaded_attempts() {
    let controller = controller(2);
    let script = Script::new(vec![Step::fail(10), Step::fail(20)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    assert!(matches!(
        hedging.load_execution(&callback, &()).await,
        ExecutionInfo::Loaded(_)
    ));
    assert!(matches!(
        hedging.load_execution(&callback, &()).await,
        ExecutionInfo::Loaded(execution) if execution.attempt() == 1
            && execution.kind() == HedgedTaskType::Secondary
    ));
    assert!(matches!(
        hedging.load_execution(&callback, &()).await,
        ExecutionInfo::NotLoaded
    ));
    assert_eq!(hedging.loaded_tasks(), 2);

    // both attempts fail; once nothing runs the first one in load order wins
    for _ in 0..2 {
        let execution = hedging
            .try_wait_for_completed_execution(HedgingDelay::immediate())
            .await
            .unwrap();
        assert!(execution.is_handled());
    }
    let ExecutionInfo::Finished(outcome) = hedging.load_execution(&callback, &()).await else {
        panic!("expected the race to be finished");
    };
    assert!(!outcome.has_result());
    assert!(hedging.tasks()[0].is_accepted());
    assert_eq!(script.calls(), 2);
    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_closed_budget_loads_nothing() {
    let controller = controller(5);
    let script = Script::new(vec![Step::ok(10)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    hedging.load_execution(&callback, &()).await;
    hedging.close_budget();

    assert!(matches!(
        hedging.load_execution(&callback, &()).await,
        ExecutionInfo::NotLoaded
    ));
    let outcome = drive(&mut hedging, &callback, HedgingDelay::immediate()).await;
    assert_eq!(outcome.result(), Some(&0));
    assert_eq!(script.calls(), 1);
    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_exactly_one_outcome_is_accepted_for_any_completion_order() {
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        seed >> 33
    };

    for budget in 1..=6u8 {
        for _ in 0..20 {
            let steps: Vec<_> = (0..budget)
                .map(|_| {
                    let latency = next() % 50;
                    if next() % 3 == 0 {
                        Step::fail(latency)
                    } else {
                        Step::ok(latency)
                    }
                })
                .collect();
            let delay = match next() % 3 {
                0 => HedgingDelay::immediate(),
                1 => HedgingDelay::Infinite,
                _ => HedgingDelay::Fixed(Duration::from_millis(next() % 20 + 1)),
            };
            let controller = controller(budget);
            let script = Script::new(steps);
            let callback = script.callback();
            let mut context = ResilienceContext::new();
            let mut hedging = controller.get_context(&mut context);

            drive(&mut hedging, &callback, delay).await;

            assert!(hedging.loaded_tasks() <= usize::from(budget));
            assert_eq!(accepted(&hedging), 1);
            hedging.complete(&mut context);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_returns_everything_to_the_pools() {
    let offload = OffloadManager::new();
    let controller = HedgingController::new(
        Arc::new(HedgingHandler::new(HedgingDelay::immediate())),
        MaxAttempts::try_from_u8(3).unwrap(),
        offload.clone(),
    );
    let script = Script::new(vec![Step::ok(100), Step::ok(100), Step::ok(5)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    let outcome = drive(&mut hedging, &callback, HedgingDelay::immediate()).await;
    assert_eq!(outcome.result(), Some(&2));
    assert_eq!(controller.rented_executions(), 3);
    assert_eq!(controller.rented_contexts(), 1);

    hedging.complete(&mut context);
    assert_eq!(context.properties().get(&SERVED_BY), Some(2));
    offload.wait_all().await;

    assert_eq!(controller.rented_executions(), 0);
    assert_eq!(controller.rented_contexts(), 0);
    // losers are cancelled, the winner's scope is only dropped
    let started = script.started();
    assert!(started[0].cancellation.is_cancelled());
    assert!(started[1].cancellation.is_cancelled());
    assert!(!started[2].cancellation.is_cancelled());
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "There must be exactly one accepted outcome for hedging")]
async fn test_complete_without_accepted_outcome_panics() {
    let controller = controller(2);
    let script = Script::new(vec![Step::ok(0)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    hedging.load_execution(&callback, &()).await;
    hedging
        .try_wait_for_completed_execution(HedgingDelay::Infinite)
        .await
        .unwrap();

    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_hedge_predicate_completes_the_slot_as_failed() {
    let handler = HedgingHandler::new(HedgingDelay::immediate())
        .with_should_hedge(Arc::new(hedge_fn(|_| panic!("hedge predicate failed"))));
    let controller = controller_with(handler, 2);
    let script = Script::new(vec![Step::fail(10)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    let outcome = drive(&mut hedging, &callback, HedgingDelay::immediate()).await;

    // the secondary never reached the callback, the failed primary decides
    assert_eq!(script.calls(), 1);
    assert!(!outcome.has_result());
    let secondary = &hedging.tasks()[1];
    assert_eq!(secondary.kind(), HedgedTaskType::Secondary);
    assert!(secondary.is_handled());
    assert!(secondary.outcome().is_some_and(is_panicked));
    assert_eq!(accepted(&hedging), 1);
    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_outcome_predicate_completes_the_slot_as_failed() {
    let handler = HedgingHandler::new(HedgingDelay::immediate()).with_should_handle(Arc::new(
        predicate_fn(|_: &Outcome<usize>, _: &ResilienceContext| -> bool {
            panic!("outcome predicate failed")
        }),
    ));
    let controller = controller_with(handler, 1);
    let script = Script::new(vec![Step::ok(5)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    let outcome = drive(&mut hedging, &callback, HedgingDelay::immediate()).await;

    assert!(is_panicked(&outcome));
    assert!(hedging.tasks()[0].is_handled());
    assert_eq!(accepted(&hedging), 1);
    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_panic_inside_running_attempt_completes_the_slot_as_failed() {
    let controller = controller(1);
    let script = Script::new(vec![Step::panic_after(5)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    let outcome = drive(&mut hedging, &callback, HedgingDelay::immediate()).await;

    assert!(is_panicked(&outcome));
    assert!(hedging.tasks()[0].is_handled());
    assert_eq!(accepted(&hedging), 1);
    assert_eq!(script.started().len(), 1);
    hedging.complete(&mut context);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_context_gives_back_its_rentals() {
    let controller = controller(2);
    let script = Script::new(vec![Step::ok(1000)]);
    let callback = script.callback();
    let mut context = ResilienceContext::new();
    let mut hedging = controller.get_context(&mut context);

    hedging.load_execution(&callback, &()).await;
    assert_eq!(controller.rented_contexts(), 1);
    assert_eq!(controller.rented_executions(), 1);

    drop(hedging);

    assert_eq!(controller.rented_contexts(), 0);
    assert_eq!(controller.rented_executions(), 0);
    assert!(script.started()[0].cancellation.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_abandon_restores_caller_and_cleans_up() {
    let offload = OffloadManager::new();
    let controller = HedgingController::new(
        Arc::new(HedgingHandler::new(HedgingDelay::immediate())),
        MaxAttempts::try_from_u8(2).unwrap(),
        offload.clone(),
    );
    let script = Script::new(vec![Step::ok(1000), Step::ok(10)]);
    let callback = script.callback();
    let properties = ResilienceProperties::new();
    let mut context = ResilienceContext::new();
    context.set_properties(properties.clone());
    let mut hedging = controller.get_context(&mut context);

    hedging.load_execution(&callback, &()).await;
    hedging.load_execution(&callback, &()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // the secondary finished but was never accepted, nothing is merged
    hedging.abandon(&mut context);
    assert!(context.properties().ptr_eq(&properties));
    assert_eq!(properties.get(&SERVED_BY), None);
    assert!(script.started()[0].cancellation.is_cancelled());

    offload.wait_all().await;
    assert_eq!(controller.rented_contexts(), 0);
    assert_eq!(controller.rented_executions(), 0);
}
