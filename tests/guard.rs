mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};

use asyncomp::{
    Async, CancelReason, Completion, ExecutionContext, Outcome, combine, fail, from_fn, join_all,
    never, race_all, succeed,
};
use common::{Recorder, capture_warnings, init_test_logging};

// A buggy leaf that reports both a value and an error.
fn double_firing_leaf() -> Async<u32> {
    from_fn(|_ctx: ExecutionContext, completion: Completion<u32>| {
        let again = completion.clone();
        completion.value(1);
        again.error("second report");
    })
}

#[test]
#[should_panic(expected = "fired twice")]
fn double_fire_is_loud() {
    init_test_logging();
    double_firing_leaf().run_with(&ExecutionContext::new(), Recorder::new().channels());
}

#[test]
fn double_fire_reaches_the_caller_only_once() {
    init_test_logging();
    let recorder = Recorder::new();
    let result = catch_unwind(AssertUnwindSafe(|| {
        double_firing_leaf().run_with(&ExecutionContext::new(), recorder.channels());
    }));
    assert!(result.is_err(), "the violation must not be swallowed");
    assert_eq!(recorder.calls(), 1);
    assert_eq!(recorder.take().and_then(Outcome::value), Some(1));
}

#[test]
#[should_panic(expected = "after it was parked")]
fn firing_after_never_is_a_violation() {
    init_test_logging();
    from_fn(|_ctx: ExecutionContext, completion: Completion<u8>| {
        let again = completion.clone();
        completion.park();
        again.cancelled(CancelReason::Unknown);
    })
    .run_with(&ExecutionContext::new(), Recorder::new().channels());
}

#[test]
fn abandoned_completion_only_warns() {
    init_test_logging();
    let recorder = Recorder::new();
    from_fn(|_ctx: ExecutionContext, completion: Completion<u8>| drop(completion))
        .run_with(&ExecutionContext::new(), recorder.channels());
    assert_eq!(recorder.calls(), 0);
}

fn warnings_while_running<T: Send + 'static>(computation: Async<T>) -> (String, usize) {
    let recorder = Recorder::new();
    let logged = capture_warnings(|| {
        computation.run_with(&ExecutionContext::new(), recorder.channels());
    });
    (logged, recorder.calls())
}

#[test]
fn abandoned_leaf_is_reported() {
    let (logged, calls) =
        warnings_while_running(from_fn(|_ctx: ExecutionContext, completion: Completion<u8>| {
            drop(completion)
        }));
    assert_eq!(calls, 0);
    assert!(logged.contains("never resolved"), "missing warning in {logged:?}");
}

#[test]
fn never_through_bind_is_silent() {
    let (logged, calls) = warnings_while_running(never::<u8>().bind(succeed));
    assert_eq!(calls, 0);
    assert!(!logged.contains("never resolved"), "unexpected warning: {logged}");
}

#[test]
fn never_through_map_and_recover_is_silent() {
    let chain = never::<u8>()
        .map(|x| x + 1)
        .recover(|_| succeed(0))
        .bind(|x| succeed(x * 2));
    let (logged, calls) = warnings_while_running(chain);
    assert_eq!(calls, 0);
    assert!(!logged.contains("never resolved"), "unexpected warning: {logged}");
}

#[test]
fn never_inside_joins_is_silent() {
    let (logged, calls) = warnings_while_running(combine(succeed(1u8), never::<u8>()));
    assert_eq!(calls, 0);
    assert!(!logged.contains("never resolved"), "unexpected warning: {logged}");

    let (logged, calls) =
        warnings_while_running(join_all(vec![never::<u8>(), succeed(2), never()]));
    assert_eq!(calls, 0);
    assert!(!logged.contains("never resolved"), "unexpected warning: {logged}");
}

#[test]
fn all_parked_race_is_silent() {
    let (logged, calls) =
        warnings_while_running(race_all(vec![never::<u8>(), never().map(|x: u8| x)]));
    assert_eq!(calls, 0);
    assert!(!logged.contains("never resolved"), "unexpected warning: {logged}");
}

#[test]
fn parked_branch_does_not_hide_a_failure() {
    let (logged, calls) = warnings_while_running(combine(never::<u8>(), fail::<u8>("boom")));
    assert_eq!(calls, 1);
    assert!(!logged.contains("never resolved"), "unexpected warning: {logged}");
}
