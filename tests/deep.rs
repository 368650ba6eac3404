//! Long chains must run in constant stack depth, whether they nest to the left
//! or to the right and whether their leaves complete inline or on other threads.

mod common;

use std::{sync::mpsc, thread, time::Duration};

use asyncomp::{Async, Channels, Completion, ExecutionContext, Outcome, from_fn, never, succeed};
use common::{Recorder, init_test_logging, outcome_of};

const DEPTH: u64 = 100_000;

// Small enough that recursion proportional to the chain length would overflow.
const SMALL_STACK: usize = 256 * 1024;

fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    thread::Builder::new()
        .stack_size(SMALL_STACK)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap()
}

fn count_down(n: u64) -> Async<u64> {
    if n == 0 {
        return succeed(0);
    }
    succeed(n).bind(move |n| count_down(n - 1))
}

fn count_down_mapped(n: u64) -> Async<u64> {
    if n == 0 {
        return succeed(0);
    }
    succeed(n).bind(move |n| count_down_mapped(n - 1)).map(|x| x + 1)
}

#[test]
fn left_nested_chain() {
    init_test_logging();
    let outcome = on_small_stack(|| {
        let chain = (0..DEPTH).fold(succeed(0u64), |acc, _| acc.bind(|x| succeed(x + 1)));
        outcome_of(chain).and_then(Outcome::value)
    });
    assert_eq!(outcome, Some(DEPTH));
}

#[test]
fn right_nested_chain() {
    init_test_logging();
    let outcome = on_small_stack(|| outcome_of(count_down(DEPTH)).and_then(Outcome::value));
    assert_eq!(outcome, Some(0));
}

#[test]
fn right_nested_chain_with_map_per_level() {
    init_test_logging();
    let outcome = on_small_stack(|| outcome_of(count_down_mapped(DEPTH)).and_then(Outcome::value));
    assert_eq!(outcome, Some(DEPTH));
}

#[test]
fn deep_failure_short_circuits() {
    init_test_logging();
    let outcome = on_small_stack(|| {
        let chain = (0..DEPTH).fold(asyncomp::fail::<u64>("root cause"), |acc, _| {
            acc.map(|x| x + 1)
        });
        outcome_of(chain).and_then(Outcome::error).map(|e| e.to_string())
    });
    assert_eq!(outcome.as_deref(), Some("root cause"));
}

#[test]
fn unrun_chain_drops_flat() {
    init_test_logging();
    on_small_stack(|| {
        let chain = (0..DEPTH).fold(succeed(0u64), |acc, _| acc.bind(|x| succeed(x + 1)));
        drop(chain);
    });
}

#[test]
fn unrun_join_tree_drops_flat() {
    init_test_logging();
    on_small_stack(|| {
        let tree = (0..DEPTH).fold(succeed(0u64), |acc, _| {
            asyncomp::combine(acc, succeed(1)).map(|(a, b)| a + b)
        });
        drop(tree);
    });
}

#[test]
fn parked_chain_releases_flat() {
    init_test_logging();
    let calls = on_small_stack(|| {
        let recorder = Recorder::new();
        let chain = (0..DEPTH).fold(never::<u64>(), |acc, _| acc.bind(|x| succeed(x + 1)));
        chain.run_with(&ExecutionContext::new(), recorder.channels());
        recorder.calls()
    });
    assert_eq!(calls, 0);
}

// Completes on a fresh thread, so the rest of the chain continues there.
fn off_thread(x: u64) -> Async<u64> {
    from_fn(move |_ctx: ExecutionContext, completion: Completion<u64>| {
        thread::Builder::new()
            .stack_size(SMALL_STACK)
            .spawn(move || completion.value(x + 1))
            .unwrap();
    })
}

#[test]
fn chain_resumed_from_other_threads() {
    init_test_logging();
    let chain = (0..20_000u64).fold(succeed(0u64), |acc, i| {
        if i % 1000 == 0 {
            acc.bind(off_thread)
        } else {
            acc.bind(|x| succeed(x + 1))
        }
    });

    let (tx, rx) = mpsc::channel();
    on_small_stack(move || {
        chain.run_with(
            &ExecutionContext::new(),
            Channels::from_fn(move |outcome| tx.send(outcome).unwrap()),
        );
    });
    let outcome = rx.recv_timeout(Duration::from_secs(30)).unwrap();
    assert_eq!(outcome.value(), Some(20_000));
}
