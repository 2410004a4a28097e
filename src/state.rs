//! Per-invocation state: progress, phase, and cooperative cancellation.
//!
//! A [`RunState`] is created by the caller for each pipeline invocation and
//! owned by it. Nothing here is global, so concurrent invocations never see
//! each other's progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Clones observe the same flag. The pipeline checks it before each oracle
/// call; an in-flight call is allowed to finish and its result is discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Nothing has run yet.
    Idle,
    /// Building the detection proxy.
    Sampling,
    /// Waiting on the whole-image detection call.
    Detecting,
    /// Scoring and extracting regions.
    Localizing,
    /// Crop/process/paste of each region.
    Processing,
    /// Second sweep with the refinement prompt.
    Refining,
    /// Finished successfully.
    Done,
}

type ProgressFn = Box<dyn FnMut(Phase, u8) + Send>;

/// Caller-owned state for one pipeline invocation.
pub struct RunState {
    progress: u8,
    phase: Phase,
    oracle_calls: usize,
    cancel: CancelToken,
    on_progress: Option<ProgressFn>,
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("progress", &self.progress)
            .field("phase", &self.phase)
            .field("oracle_calls", &self.oracle_calls)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(CancelToken::new())
    }
}

impl RunState {
    /// Fresh state observing `cancel`.
    #[must_use]
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            progress: 0,
            phase: Phase::Idle,
            oracle_calls: 0,
            cancel,
            on_progress: None,
        }
    }

    /// Attach a callback invoked on every progress update.
    #[must_use]
    pub fn with_progress(mut self, f: impl FnMut(Phase, u8) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Current progress, `0..=100`.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Oracle calls issued so far in this invocation.
    #[must_use]
    pub fn oracle_calls(&self) -> usize {
        self.oracle_calls
    }

    /// The cancellation token this state observes.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `phase` and raise progress to `percent`.
    ///
    /// Progress never decreases: lower values are ignored.
    pub fn advance(&mut self, phase: Phase, percent: u8) {
        self.phase = phase;
        self.progress = self.progress.max(percent.min(100));
        if let Some(f) = self.on_progress.as_mut() {
            f(self.phase, self.progress);
        }
    }

    pub(crate) fn record_call(&mut self) {
        self.oracle_calls += 1;
    }
}

/// Progress within a `[start, end]` band after `done` of `total` steps.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn band(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return end;
    }
    let span = usize::from(end.saturating_sub(start));
    let step = span * done.min(total) / total;
    start + step as u8
}
