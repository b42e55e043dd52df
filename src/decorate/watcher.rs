//! Decorating anchors that appear after page load.
//!
//! The host forwards structural mutations to a [`LinkWatcher`]. Only records
//! that add anchors matter. The first one arms a single settle timer; records
//! arriving while it is armed are folded into the same rescan. Rescans are
//! idempotent, so nothing needs cancelling.

use crate::base::error::GlueError;
use crate::base::identifier::TrackingIdentifier;
use crate::decorate::decorator::LinkDecorator;
use crate::decorate::session::SessionStorage;
use crate::dom::{Document, MutationRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

/// Handle to a running watcher task.
#[derive(Debug)]
pub struct LinkWatcher {
    tx: mpsc::UnboundedSender<MutationRecord>,
    task: JoinHandle<()>,
    rescans: Arc<AtomicUsize>,
}

impl LinkWatcher {
    /// Start watching `document`. Must be called from within a tokio runtime.
    pub fn spawn<D, S>(
        document: Arc<Mutex<D>>,
        decorator: Arc<LinkDecorator<S>>,
        identifier: TrackingIdentifier,
    ) -> Self
    where
        D: Document + Send + 'static,
        S: SessionStorage + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let rescans = Arc::new(AtomicUsize::new(0));
        let settle = decorator.config().settle_delay();

        let task = tokio::spawn(run(
            rx,
            document,
            decorator,
            identifier,
            settle,
            rescans.clone(),
        ));

        Self { tx, task, rescans }
    }

    /// Report a mutation observed on the page.
    pub fn notify(&self, record: MutationRecord) -> Result<(), GlueError> {
        self.tx.send(record).map_err(|_| GlueError::WatcherClosed)
    }

    /// Number of rescans performed so far.
    pub fn rescans(&self) -> usize {
        self.rescans.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop watching. A rescan that is already pending still runs.
    pub async fn shutdown(self) {
        let LinkWatcher { tx, task, .. } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "link watcher task failed");
        }
    }
}

async fn run<D, S>(
    mut rx: mpsc::UnboundedReceiver<MutationRecord>,
    document: Arc<Mutex<D>>,
    decorator: Arc<LinkDecorator<S>>,
    identifier: TrackingIdentifier,
    settle: Duration,
    rescans: Arc<AtomicUsize>,
) where
    D: Document + Send + 'static,
    S: SessionStorage + Send + Sync + 'static,
{
    while let Some(record) = rx.recv().await {
        if !record.adds_anchors() {
            continue;
        }

        tokio::time::sleep(settle).await;

        let mut closed = false;
        let mut coalesced = 0usize;
        loop {
            match rx.try_recv() {
                Ok(_) => coalesced += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }

        let summary = {
            let mut guard = document.lock().unwrap_or_else(PoisonError::into_inner);
            decorator.decorate_document(&mut *guard, &identifier)
        };
        rescans.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            decorated = summary.decorated,
            evaluated = summary.evaluated,
            coalesced,
            "rescanned page after content change"
        );

        if closed {
            break;
        }
    }
}
