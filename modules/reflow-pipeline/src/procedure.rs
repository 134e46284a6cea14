//! The step-chaining workflow engine.
//!
//! Links are composed at construction time and folded into a single boxed
//! async chain, never materialized as a list. The chain type evolves per
//! link: link *i* sees only the handle and value produced by link *i−1*.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

const RUNNING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Where a started pipeline currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureStatus {
    Running,
    Completed,
    Cancelled,
}

/// A fully built workflow, ready to start exactly once.
///
/// Obtained from [`ProcedureStep::final_step`]; the builder chain starts at
/// [`Procedure::on_step`].
pub struct Procedure<Root> {
    id: Uuid,
    run: Box<dyn FnOnce(Root) -> BoxFuture<'static, ()> + Send>,
}

impl<Root: Send + 'static> Procedure<Root> {
    /// Register the first step: given the root handle, produce the next
    /// `(handle, value)` pair.
    pub fn on_step<S, V, F, Fut>(step: F) -> ProcedureStep<Root, S, V>
    where
        S: Send + 'static,
        V: Send + 'static,
        F: FnOnce(Root) -> Fut + Send + 'static,
        Fut: Future<Output = (S, V)> + Send + 'static,
    {
        ProcedureStep {
            run: Box::new(move |root| step(root).boxed()),
        }
    }

    /// Feed `root` into link 1 on a spawned task. When the final step's
    /// closure returns, the pipeline is `Completed` and `on_finish` runs —
    /// exactly once, and never after a cancellation.
    pub fn start(
        self,
        root: Root,
        on_finish: impl FnOnce() + Send + 'static,
    ) -> ProcedureHandle {
        let id = self.id;
        let status = Arc::new(AtomicU8::new(RUNNING));
        debug!(procedure = %id, "procedure started");

        let task_status = Arc::clone(&status);
        let task = tokio::spawn(async move {
            (self.run)(root).await;
            // The status decides the race against cancel(): whoever flips it
            // first wins, so the callback can never fire after a cancel.
            if task_status
                .compare_exchange(RUNNING, COMPLETED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                on_finish();
                debug!(procedure = %id, "procedure completed");
            }
        });

        ProcedureHandle { id, status, task }
    }
}

/// One link of a procedure under construction.
pub struct ProcedureStep<Root, S, V> {
    run: Box<dyn FnOnce(Root) -> BoxFuture<'static, (S, V)> + Send>,
}

impl<Root, S, V> ProcedureStep<Root, S, V>
where
    Root: Send + 'static,
    S: Send + 'static,
    V: Send + 'static,
{
    /// Compose the next link. The previous link's producer is awaited before
    /// `step` is invoked, so only one producer is live at a time.
    pub fn on_step<S2, V2, F, Fut>(self, step: F) -> ProcedureStep<Root, S2, V2>
    where
        S2: Send + 'static,
        V2: Send + 'static,
        F: FnOnce(S, V) -> Fut + Send + 'static,
        Fut: Future<Output = (S2, V2)> + Send + 'static,
    {
        let prev = self.run;
        ProcedureStep {
            run: Box::new(move |root| {
                async move {
                    let (handle, value) = prev(root).await;
                    step(handle, value).await
                }
                .boxed()
            }),
        }
    }

    /// Close the chain with a side-effecting final step. Nothing can be
    /// appended afterwards.
    pub fn final_step(self, step: impl FnOnce(S, V) + Send + 'static) -> Procedure<Root> {
        let prev = self.run;
        Procedure {
            id: Uuid::new_v4(),
            run: Box::new(move |root| {
                async move {
                    let (handle, value) = prev(root).await;
                    step(handle, value);
                }
                .boxed()
            }),
        }
    }
}

/// Handle to a started pipeline: status inspection and cancellation.
pub struct ProcedureHandle {
    id: Uuid,
    status: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl ProcedureHandle {
    /// Abort a running pipeline so the completion callback can never fire.
    ///
    /// Idempotent; a no-op once the pipeline completed. Side effects already
    /// performed by finished steps stand.
    pub fn cancel(&self) {
        if self
            .status
            .compare_exchange(RUNNING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.task.abort();
            debug!(procedure = %self.id, "procedure cancelled");
        }
    }

    pub fn status(&self) -> ProcedureStatus {
        match self.status.load(Ordering::SeqCst) {
            COMPLETED => ProcedureStatus::Completed,
            CANCELLED => ProcedureStatus::Cancelled,
            _ => ProcedureStatus::Running,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status() != ProcedureStatus::Running
    }

    /// Wait for the pipeline task to wind down (completion or abort).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
