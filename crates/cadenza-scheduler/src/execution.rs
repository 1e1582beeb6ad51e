//! In-flight execution handles and completions.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How a job run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run returned without error.
    Success,
    /// The run returned an error (or panicked).
    Failed,
    /// The run stopped on its cancellation token, or a caller's view of it
    /// was cancelled.
    Cancelled,
    /// Nothing ran: the record was disabled when an automatic fire arrived.
    Skipped,
}

/// Handle to one in-flight run of a job.
///
/// All concurrent fire requests for a record coalesce onto the same
/// `Execution`; its outcome is broadcast to every waiter when the run's
/// bookkeeping has finished.
#[derive(Clone)]
pub struct Execution {
    id: Uuid,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

impl Execution {
    /// A new unfinished execution plus the sender its runner publishes on.
    pub(crate) fn new_pair() -> (watch::Sender<Option<RunOutcome>>, Execution) {
        let (tx, rx) = watch::channel(None);
        let execution = Execution {
            id: Uuid::new_v4(),
            outcome: rx,
        };
        (tx, execution)
    }

    /// Identity of this run; coalesced callers observe the same id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the outcome has been published.
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Wait for the run to finish.
    pub async fn wait(&self) -> RunOutcome {
        let mut rx = self.outcome.clone();
        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Runner torn down without publishing.
                return rx.borrow().unwrap_or(RunOutcome::Cancelled);
            }
        }
    }

    /// Wait, resolving `Cancelled` as soon as `token` fires.
    ///
    /// This cancels only this caller's view; the underlying run keeps going
    /// for everyone else.
    pub async fn wait_with(&self, token: &CancellationToken) -> RunOutcome {
        tokio::select! {
            _ = token.cancelled() => RunOutcome::Cancelled,
            outcome = self.wait() => outcome,
        }
    }
}

enum CompletionInner {
    /// Settled before anything ran.
    Immediate(RunOutcome),
    /// Backed by an in-flight run, optionally composed with the requesting
    /// caller's own token.
    Running {
        execution: Execution,
        caller: Option<CancellationToken>,
    },
}

/// The result surface of one fire request.
///
/// Coalesced requests share the underlying [`Execution`] but may each carry
/// their own cancellation view.
pub struct Completion {
    inner: CompletionInner,
}

impl Completion {
    pub(crate) fn immediate(outcome: RunOutcome) -> Self {
        Self {
            inner: CompletionInner::Immediate(outcome),
        }
    }

    pub(crate) fn running(execution: Execution, caller: Option<CancellationToken>) -> Self {
        Self {
            inner: CompletionInner::Running { execution, caller },
        }
    }

    /// The underlying run's id, when one exists.
    pub fn execution_id(&self) -> Option<Uuid> {
        match &self.inner {
            CompletionInner::Immediate(_) => None,
            CompletionInner::Running { execution, .. } => Some(execution.id()),
        }
    }

    /// Whether the outcome is already available.
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            CompletionInner::Immediate(_) => true,
            CompletionInner::Running { execution, .. } => execution.is_finished(),
        }
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> RunOutcome {
        match &self.inner {
            CompletionInner::Immediate(outcome) => *outcome,
            CompletionInner::Running {
                execution,
                caller: None,
            } => execution.wait().await,
            CompletionInner::Running {
                execution,
                caller: Some(token),
            } => execution.wait_with(token).await,
        }
    }
}
