//! FIFO serializer for persistence writes.
//!
//! One worker task drains the queue and runs each job to completion before
//! starting the next, so writes are never interleaved or reordered. A failing
//! (or panicking) job is reported to whoever holds its [`SaveTicket`] and the
//! worker moves on to the next job.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::{EngineError, StorageError};

type SaveResult = Result<(), StorageError>;

struct SaveJob {
    sequence: u64,
    task: BoxFuture<'static, SaveResult>,
    reply: oneshot::Sender<SaveResult>,
}

/// Handle to a queued save. Awaiting it is optional; the save runs either way.
#[derive(Debug)]
pub struct SaveTicket {
    sequence: u64,
    reply: oneshot::Receiver<SaveResult>,
}

impl SaveTicket {
    /// Position of this save in the queue, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wait until this particular save has settled.
    pub async fn wait(self) -> Result<(), EngineError> {
        match self.reply.await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::SaveQueueClosed),
        }
    }
}

/// Cloneable handle to the queue. All clones feed the same worker.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    sender: mpsc::UnboundedSender<SaveJob>,
    // Held while sending so sequence numbers follow queue order.
    next_sequence: Arc<Mutex<u64>>,
}

impl SaveQueue {
    /// Start the worker. Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(receiver));
        Self {
            sender,
            next_sequence: Arc::new(Mutex::new(1)),
        }
    }

    /// Append `task` to the queue.
    ///
    /// The task starts only after every previously enqueued task has settled.
    pub fn enqueue<F>(&self, task: F) -> SaveTicket
    where
        F: Future<Output = SaveResult> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let mut next = self.next_sequence.lock().expect("save queue lock poisoned");
        let sequence = *next;
        *next += 1;
        let job = SaveJob {
            sequence,
            task: task.boxed(),
            reply,
        };

        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            // Worker is gone; settle the ticket right away.
            let _ = job.reply.send(Err(StorageError::Backend(
                "save queue worker stopped".to_string(),
            )));
        }
        drop(next);

        SaveTicket {
            sequence,
            reply: receiver,
        }
    }

    /// Wait for everything enqueued so far to settle.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.enqueue(async { Ok(()) }).wait().await
    }
}

async fn run_worker(mut receiver: mpsc::UnboundedReceiver<SaveJob>) {
    while let Some(job) = receiver.recv().await {
        let result = match AssertUnwindSafe(job.task).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(StorageError::TaskPanicked(panic_message(&*panic))),
        };

        match &result {
            Ok(()) => tracing::trace!(sequence = job.sequence, "save settled"),
            Err(err) => tracing::warn!(
                sequence = job.sequence,
                error = %err,
                "save failed; continuing with queued saves"
            ),
        }

        // The caller may have stopped listening; the save still happened.
        let _ = job.reply.send(result);
    }
    tracing::debug!("save queue worker stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
