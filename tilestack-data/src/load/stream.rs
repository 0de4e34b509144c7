//! Streaming facade over a load running on a blocking worker.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{LoadSink, LoadSummary, LoadedElement};
use crate::EngineError;
use crate::mesh::Mesh;

/// Output of a streamed load.
///
/// Every stream ends with exactly one `Completed` or `Failed` event.
#[derive(Debug)]
pub enum LoadEvent {
    /// A mesh is ready.
    MeshBuilt {
        /// Caller-supplied correlation tag.
        tag: u64,
        /// The mesh.
        mesh: Mesh,
    },
    /// A styled element was loaded.
    ElementLoaded {
        /// Caller-supplied correlation tag.
        tag: u64,
        /// The element and its style.
        element: LoadedElement,
    },
    /// The load finished.
    Completed(LoadSummary),
    /// The load stopped with an error, possibly after emitting events.
    Failed {
        /// Caller-supplied correlation tag.
        tag: u64,
        /// Why the load stopped.
        error: EngineError,
    },
}

impl LoadEvent {
    /// Correlation tag of the load that produced the event.
    pub const fn tag(&self) -> u64 {
        match self {
            Self::MeshBuilt { tag, .. }
            | Self::ElementLoaded { tag, .. }
            | Self::Failed { tag, .. } => *tag,
            Self::Completed(summary) => summary.tag,
        }
    }

    /// Whether this is the last event of its stream.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed { .. })
    }
}

struct ChannelSink {
    sender: mpsc::UnboundedSender<LoadEvent>,
    cancel: CancellationToken,
}

impl ChannelSink {
    fn send(&self, event: LoadEvent) {
        // Nobody is listening any more; stop at the next checkpoint.
        if self.sender.send(event).is_err() {
            self.cancel.cancel();
        }
    }
}

impl LoadSink for ChannelSink {
    fn on_mesh_built(&mut self, tag: u64, mesh: Mesh) {
        self.send(LoadEvent::MeshBuilt { tag, mesh });
    }

    fn on_element_loaded(&mut self, tag: u64, element: LoadedElement) {
        self.send(LoadEvent::ElementLoaded { tag, element });
    }
}

/// Events of a load running in the background.
///
/// Dropping the stream cancels the load.
#[derive(Debug)]
pub struct LoadStream {
    receiver: mpsc::UnboundedReceiver<LoadEvent>,
    cancel: CancellationToken,
}

impl LoadStream {
    /// Run `work` on the blocking pool. Must be called inside a Tokio
    /// runtime.
    pub(crate) fn spawn<F>(tag: u64, cancel: CancellationToken, work: F) -> Self
    where
        F: FnOnce(&CancellationToken, &mut dyn LoadSink) -> Result<LoadSummary, EngineError>
            + Send
            + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let watcher = sender.clone();
        let worker_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut sink = ChannelSink {
                sender,
                cancel: worker_cancel.clone(),
            };
            let terminal = match work(&worker_cancel, &mut sink) {
                Ok(summary) => LoadEvent::Completed(summary),
                Err(error) => LoadEvent::Failed { tag, error },
            };
            sink.send(terminal);
        });
        tokio::spawn(async move {
            if let Err(err) = handle.await {
                let failed = LoadEvent::Failed {
                    tag,
                    error: EngineError::Worker(err),
                };
                if watcher.send(failed).is_err() {
                    debug!("load {tag} worker failed after its stream was dropped");
                }
            }
        });
        Self { receiver, cancel }
    }

    /// Ask the worker to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the worker.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for LoadStream {
    type Item = LoadEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for LoadStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
