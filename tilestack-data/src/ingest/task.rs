//! Handle for ingestion running on a blocking worker.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{IngestProgress, IngestReport};
use crate::EngineError;

/// A running ingestion.
///
/// Progress is published per processed element and reads as `None` until the
/// worker has counted its source; [`IngestTask::wait`] yields the terminal
/// result. Dropping the task detaches the worker, which keeps
/// running unless cancelled first.
#[derive(Debug)]
pub struct IngestTask {
    progress: watch::Receiver<Option<IngestProgress>>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<IngestReport, EngineError>>,
}

impl IngestTask {
    /// Run `work` on the blocking pool. Must be called inside a Tokio
    /// runtime.
    pub(crate) fn spawn<F>(cancel: CancellationToken, work: F) -> Self
    where
        F: FnOnce(&CancellationToken, &mut dyn FnMut(IngestProgress)) -> Result<IngestReport, EngineError>
            + Send
            + 'static,
    {
        let (sender, receiver) = watch::channel(None);
        let worker_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            work(&worker_cancel, &mut |progress| {
                sender.send_replace(Some(progress));
            })
        });
        Self {
            progress: receiver,
            cancel,
            handle,
        }
    }

    /// Receiver observing progress updates.
    pub fn progress(&self) -> watch::Receiver<Option<IngestProgress>> {
        self.progress.clone()
    }

    /// Latest published completion percentage; 0 before the worker starts.
    pub fn percent(&self) -> u8 {
        self.progress.borrow().map_or(0, |progress| progress.percent())
    }

    /// Whether the worker has reported every element as handled.
    pub fn is_complete(&self) -> bool {
        self.progress
            .borrow()
            .is_some_and(|progress| progress.is_complete())
    }

    /// Ask the worker to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the worker.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the terminal result.
    pub async fn wait(self) -> Result<IngestReport, EngineError> {
        self.handle.await.map_err(EngineError::Worker)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn results_and_progress_reach_the_caller() {
        let task = IngestTask::spawn(CancellationToken::new(), |_, progress| {
            progress(IngestProgress {
                processed: 2,
                total: 2,
            });
            Ok(IngestReport {
                store: "M".to_owned(),
                elements_read: 2,
                ..IngestReport::default()
            })
        });
        let mut updates = task.progress();
        let report = task.wait().await.expect("worker succeeds");
        assert_eq!(report.elements_read, 2);
        let last = updates.borrow_and_update().expect("progress published");
        assert_eq!(last.percent(), 100);
    }

    #[tokio::test]
    async fn tasks_read_as_pending_until_the_worker_reports() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let task = IngestTask::spawn(CancellationToken::new(), move |_, progress| {
            release_rx.recv().expect("released");
            progress(IngestProgress {
                processed: 0,
                total: 0,
            });
            Ok(IngestReport::default())
        });

        let mut updates = task.progress();
        assert!(updates.borrow().is_none());
        assert_eq!(task.percent(), 0);
        assert!(!task.is_complete());

        release_tx.send(()).expect("release worker");
        updates.changed().await.expect("worker publishes");
        assert!(task.is_complete());
        assert_eq!(task.percent(), 100);
        task.wait().await.expect("worker succeeds");
    }

    #[tokio::test]
    async fn cancellation_reaches_the_worker() {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let task = IngestTask::spawn(CancellationToken::new(), move |cancel, _| {
            started_tx.send(()).expect("signal start");
            while !cancel.is_cancelled() {
                std::thread::yield_now();
            }
            Err(EngineError::Cancelled)
        });
        tokio::task::spawn_blocking(move || started_rx.recv())
            .await
            .expect("join")
            .expect("worker started");
        task.cancel();
        assert!(matches!(task.wait().await, Err(EngineError::Cancelled)));
    }
}
