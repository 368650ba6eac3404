//! Defines the `ExecutionContext` shared by every step of a computation chain.
//!
//! The context is created by whoever runs the outermost computation and is
//! passed explicitly to each step. It carries:
//! - a cancellation signal that can be set once and checked by anyone,
//! - an optional deadline, after which the context reports [`CancelReason::Timeout`],
//! - an optional label used in tracing output,
//! - an optional parent, whose cancellation the context observes,
//! - the work-list through which every step of the chain is executed.
//!
//! The work-list replaces direct recursion. A step never calls into the next step
//! on its own stack frame; it submits the next step, and whichever thread is
//! currently draining the list runs it. Chains of any length therefore run in
//! constant stack depth, whether their leaves complete synchronously or from
//! another thread.
//!
//! This module also provides `CancelHandle`, a capability that can only request
//! cancellation.
use std::{
    borrow::Cow,
    collections::VecDeque,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::CancelReason;

type Job = Box<dyn FnOnce() + Send>;

// Steps waiting to run for a family of contexts (a root and all its children).
// At most one thread drains the list at a time; submitting from inside a job, or
// from a foreign thread while another thread drains, only enqueues.
struct WorkList {
    queue: Mutex<VecDeque<Job>>,
    draining: AtomicBool,
}

// Releases the drain flag even if a job unwinds.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WorkList {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(16)),
            draining: AtomicBool::new(false),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, job: Job) {
        self.queue().push_back(job);
        self.drain();
    }

    fn drain(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // The current owner of the loop will pick the job up.
                return;
            }
            {
                let _guard = DrainGuard(&self.draining);
                loop {
                    let next = self.queue().pop_front();
                    match next {
                        Some(job) => job(),
                        None => break,
                    }
                }
            }
            // A job may have been queued between the last pop and the release
            // of the flag; its submitter saw the flag set and left it to us.
            if self.queue().is_empty() {
                return;
            }
        }
    }
}

struct Inner {
    cancelled: AtomicBool,
    reason: OnceLock<CancelReason>,
    deadline: Option<Instant>,
    label: Option<Cow<'static, str>>,
    parent: Option<ExecutionContext>,
    work: Arc<WorkList>,
}

/// Shared, per-invocation token threaded through every step of a computation.
///
/// Cloning is cheap and yields a handle to the same context. Create independent
/// contexts with [`ExecutionContext::new`] or [`ExecutionContext::builder`], and
/// derived ones with [`ExecutionContext::child`].
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl ExecutionContext {
    /// Creates a root context with no deadline and no label.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for configuring a context.
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Creates a child context.
    ///
    /// The child reports cancelled whenever this context does, but cancelling
    /// the child leaves this context untouched. Both share one work-list.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::builder().parent(self).build()
    }

    /// Requests cancellation with the given reason.
    ///
    /// The first reason wins; later calls keep the flag set but do not replace
    /// it. Returns `true` if this call recorded the reason.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        // Publish the reason before the flag so readers that see the flag also
        // see a reason.
        let first = self.inner.reason.set(reason).is_ok();
        self.inner.cancelled.store(true, Ordering::Release);
        if first {
            tracing::debug!(%reason, label = self.label().unwrap_or("-"), "context cancelled");
        }
        first
    }

    /// Returns `true` if this context, an ancestor, or a deadline requests
    /// cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_reason().is_some()
    }

    /// The reason this context is cancelled, if it is.
    ///
    /// An explicit reason on this context takes precedence over an elapsed
    /// deadline, which takes precedence over the state of the parent.
    #[must_use]
    pub fn cancellation_reason(&self) -> Option<CancelReason> {
        let now = Instant::now();
        let mut current = Some(self);
        while let Some(ctx) = current {
            let inner = &ctx.inner;
            if inner.cancelled.load(Ordering::Acquire) {
                return Some(inner.reason.get().copied().unwrap_or_default());
            }
            if inner.deadline.is_some_and(|deadline| now >= deadline) {
                return Some(CancelReason::Timeout);
            }
            current = inner.parent.as_ref();
        }
        None
    }

    /// Returns `Err(reason)` if the context is cancelled.
    ///
    /// Convenient at the suspension points of a leaf computation:
    ///
    /// ```
    /// # use asyncomp::{Async, from_fn};
    /// let leaf: Async<u32> = from_fn(|ctx, completion| match ctx.check() {
    ///     Ok(()) => completion.value(7),
    ///     Err(reason) => completion.cancelled(reason),
    /// });
    /// # drop(leaf);
    /// ```
    pub fn check(&self) -> Result<(), CancelReason> {
        match self.cancellation_reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// The earliest deadline of this context and its ancestors.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        let mut earliest: Option<Instant> = None;
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(deadline) = ctx.inner.deadline {
                earliest = Some(earliest.map_or(deadline, |e| e.min(deadline)));
            }
            current = ctx.inner.parent.as_ref();
        }
        earliest
    }

    /// Time left until the deadline, `None` if there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The label given at construction, or the nearest labelled ancestor's.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(label) = ctx.inner.label.as_deref() {
                return Some(label);
            }
            current = ctx.inner.parent.as_ref();
        }
        None
    }

    /// Returns a handle that can cancel this context and nothing else.
    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        CancelHandle { ctx: self.clone() }
    }

    /// Queues `job` on the context's work-list and drains the list unless
    /// another frame or thread is already draining it.
    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.inner.work.submit(Box::new(job));
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("label", &self.label())
            .field("cancelled", &self.cancellation_reason())
            .field("deadline", &self.deadline())
            .finish()
    }
}

/// Configures an [`ExecutionContext`].
///
/// # Example
/// ```
/// # use std::time::Duration;
/// # use asyncomp::ExecutionContext;
/// let ctx = ExecutionContext::builder()
///     .label("ingest")
///     .timeout(Duration::from_secs(5))
///     .build();
/// assert_eq!(ctx.label(), Some("ingest"));
/// assert!(ctx.deadline().is_some());
/// ```
#[derive(Default)]
#[must_use]
pub struct ContextBuilder {
    deadline: Option<Instant>,
    label: Option<Cow<'static, str>>,
    parent: Option<ExecutionContext>,
}

impl ContextBuilder {
    /// Names the context in tracing output.
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Cancels the context with [`CancelReason::Timeout`] once `deadline` passes.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Same as [`deadline`](Self::deadline), counted from now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Links the context to a parent whose cancellation it observes.
    pub fn parent(mut self, parent: &ExecutionContext) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    #[must_use]
    pub fn build(self) -> ExecutionContext {
        let work = self
            .parent
            .as_ref()
            .map_or_else(|| Arc::new(WorkList::new()), |p| Arc::clone(&p.inner.work));
        ExecutionContext {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                reason: OnceLock::new(),
                deadline: self.deadline,
                label: self.label,
                parent: self.parent,
                work,
            }),
        }
    }
}

/// A handle for cancelling an [`ExecutionContext`].
///
/// Cancellation is cooperative: computations already running notice it at their
/// next check, steps that have not started yet will not run, and a chain that
/// already completed is unaffected. Obtained with [`ExecutionContext::handle`].
#[derive(Clone, Debug)]
pub struct CancelHandle {
    ctx: ExecutionContext,
}

impl CancelHandle {
    /// Requests cancellation. Returns `true` if this call recorded the reason.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.ctx.cancel(reason)
    }

    /// Returns `true` if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }
}
