//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::{
    fmt::Display,
    io,
    sync::{
        Arc, Mutex, Once,
        atomic::{AtomicUsize, Ordering},
    },
};

use asyncomp::{Async, Channels, ExecutionContext, Outcome};
use proptest::test_runner::Config as ProptestConfig;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Routes `tracing` output to the test harness. The first call wins.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a thread-local subscriber and returns everything it logged at
/// `warn` and above.
pub fn capture_warnings(f: impl FnOnce()) -> String {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

/// Renders an outcome as `value x`, `error e` or `cancelled r`.
pub fn describe<T: Display>(outcome: &Outcome<T>) -> String {
    match outcome {
        Outcome::Value(value) => format!("value {value}"),
        Outcome::Error(error) => format!("error {error}"),
        Outcome::Cancelled(reason) => format!("cancelled {reason}"),
    }
}

/// Counts every channel call made for one run and keeps the last outcome.
pub struct Recorder<T> {
    values: AtomicUsize,
    errors: AtomicUsize,
    cancellations: AtomicUsize,
    last: Mutex<Option<Outcome<T>>>,
}

impl<T: Send + 'static> Recorder<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            values: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn channels(self: &Arc<Self>) -> Channels<T> {
        let recorder = Arc::clone(self);
        Channels::from_fn(move |outcome| {
            let counter = match &outcome {
                Outcome::Value(_) => &recorder.values,
                Outcome::Error(_) => &recorder.errors,
                Outcome::Cancelled(_) => &recorder.cancellations,
            };
            counter.fetch_add(1, Ordering::SeqCst);
            *recorder.last.lock().unwrap() = Some(outcome);
        })
    }

    /// Total channel calls across all three channels.
    pub fn calls(&self) -> usize {
        self.values.load(Ordering::SeqCst)
            + self.errors.load(Ordering::SeqCst)
            + self.cancellations.load(Ordering::SeqCst)
    }

    pub fn take(&self) -> Option<Outcome<T>> {
        self.last.lock().unwrap().take()
    }
}

/// Runs `computation` on a fresh context and returns what it reported
/// synchronously, if anything.
pub fn outcome_of<T: Send + 'static>(computation: Async<T>) -> Option<Outcome<T>> {
    outcome_in(computation, &ExecutionContext::new())
}

pub fn outcome_in<T: Send + 'static>(
    computation: Async<T>,
    ctx: &ExecutionContext,
) -> Option<Outcome<T>> {
    let recorder = Recorder::new();
    computation.run_with(ctx, recorder.channels());
    assert!(recorder.calls() <= 1, "more than one channel fired");
    recorder.take()
}
