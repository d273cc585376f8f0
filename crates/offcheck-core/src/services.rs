//! Collaborator interfaces consumed by the coordinator.
//!
//! - `CompilerOptionsResolver`: async resolution of effective compiler options
//! - `ValidationService`: the isolated worker that runs full type validation
//! - `DeletionScheduler`: reverts pending filesystem cleanup
//!
//! Default implementations live in `options`, `deletion` and the
//! `offcheck-worker` crate; in-memory fakes live in `fakes`.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::domain::{
    CompilerOptions, OptionsError, PipelineConfig, ValidationJob, ValidationResult, WorkerError,
};
use crate::pipeline::CompilerState;

/// What a worker delivers for one job.
pub type WorkerOutcome = std::result::Result<ValidationResult, WorkerError>;

/// Resolves the compiler options a validation job runs with.
#[async_trait]
pub trait CompilerOptionsResolver: Send + Sync {
    async fn resolve(
        &self,
        config: &PipelineConfig,
        state: &CompilerState,
    ) -> std::result::Result<CompilerOptions, OptionsError>;
}

/// Worker-service boundary.
///
/// `submit` must not block: it queues the job and returns a ticket that
/// resolves exactly once, from whatever execution context runs the job.
pub trait ValidationService: Send + Sync {
    fn submit(&self, job: ValidationJob) -> ValidationTicket;
}

/// Reverts scheduled deletions for paths validation still needs.
pub trait DeletionScheduler: Send + Sync {
    fn cancel_delete_dirs(&self, paths: &BTreeSet<PathBuf>);

    fn cancel_delete_files(&self, paths: &BTreeSet<PathBuf>);
}

/// Pending result of a submitted job.
///
/// Awaiting the ticket yields the worker outcome; a worker that drops its
/// [`TicketSender`] without resolving surfaces as [`WorkerError::Abandoned`].
#[derive(Debug)]
pub struct ValidationTicket {
    rx: oneshot::Receiver<WorkerOutcome>,
}

/// Worker-side half of a [`ValidationTicket`]. Consumed on resolve.
#[derive(Debug)]
pub struct TicketSender {
    tx: oneshot::Sender<WorkerOutcome>,
}

impl ValidationTicket {
    /// Create a connected sender/ticket pair.
    pub fn channel() -> (TicketSender, ValidationTicket) {
        let (tx, rx) = oneshot::channel();
        (TicketSender { tx }, ValidationTicket { rx })
    }

    /// A ticket that is already resolved.
    pub fn ready(outcome: WorkerOutcome) -> Self {
        let (sender, ticket) = Self::channel();
        sender.resolve(outcome);
        ticket
    }
}

impl TicketSender {
    /// Deliver the outcome. Returns `false` if the ticket was already dropped.
    pub fn resolve(self, outcome: WorkerOutcome) -> bool {
        self.tx.send(outcome).is_ok()
    }

    /// Whether the coordinator still holds the ticket.
    pub fn is_waiting(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl Future for ValidationTicket {
    type Output = WorkerOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WorkerError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
