use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::types::Task;

/// Producer side of the task queue.
///
/// Unbounded and FIFO. There is no back-pressure: `push` never waits,
/// so the inbound rate is only bounded by the calling platform.
///
/// The queue owns the single sender of the channel. Closing the queue drops
/// it, which lets the consumer drain whatever is still buffered and then
/// observe the end of the stream.
#[derive(Debug)]
pub struct TaskQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<Task>>>,
}

/// Consumer side of the task queue. Owned by exactly one worker.
#[derive(Debug)]
pub struct TaskReceiver {
    rx: mpsc::UnboundedReceiver<Task>,
}

/// Create a connected queue / receiver pair.
pub fn task_queue() -> (TaskQueue, TaskReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        TaskQueue { tx: Mutex::new(Some(tx)) },
        TaskReceiver { rx },
    )
}

impl TaskQueue {
    /// Append a task. Fails only once the queue has been closed.
    pub fn push(&self, task: Task) -> Result<(), RelayError> {
        let guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| RelayError::Shutdown),
            None => Err(RelayError::Shutdown),
        }
    }

    /// Stop accepting tasks. Tasks already queued stay available to the receiver.
    pub fn close(&self) {
        let mut guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        let guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

impl TaskReceiver {
    /// Wait for the next task.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn pop(&mut self) -> Option<Task> {
        self.rx.recv().await
    }
}
