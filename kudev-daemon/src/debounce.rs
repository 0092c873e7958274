//! Event coalescing.
//!
//! A single task owns both the buffer and the deadline, so "event arrived"
//! and "quiet period elapsed" are handled one at a time and never race.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use kudev_core::{EventBatch, FileChangeEvent};

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Groups bursts of events into batches separated by a quiet period.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Spawn the coalescing task and return its batch stream.
    ///
    /// Each event restarts the window. When the window elapses the buffered
    /// events are emitted as one batch, in arrival order. Closing `input`
    /// flushes the buffer immediately; cancelling drops it.
    pub fn debounce(
        &self,
        input: mpsc::Receiver<FileChangeEvent>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<EventBatch> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(run(self.window, input, tx, cancel));
        rx
    }
}

async fn run(
    window: Duration,
    mut input: mpsc::Receiver<FileChangeEvent>,
    output: mpsc::Sender<EventBatch>,
    cancel: CancellationToken,
) {
    let mut buffer = EventBatch::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let quiet = async {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if !buffer.is_empty() {
                    tracing::debug!(dropped = buffer.len(), "debounce cancelled with pending events");
                }
                return;
            }
            event = input.recv() => match event {
                Some(event) => {
                    buffer.push(event);
                    deadline = Some(Instant::now() + window);
                }
                None => {
                    if !buffer.is_empty() {
                        emit(&output, std::mem::take(&mut buffer), &cancel).await;
                    }
                    return;
                }
            },
            _ = quiet => {
                deadline = None;
                let batch = std::mem::take(&mut buffer);
                if !batch.is_empty() && !emit(&output, batch, &cancel).await {
                    return;
                }
            }
        }
    }
}

/// Hand a batch downstream. False when the consumer is gone or we were
/// cancelled while waiting for it.
async fn emit(output: &mpsc::Sender<EventBatch>, batch: EventBatch, cancel: &CancellationToken) -> bool {
    tracing::debug!(events = batch.len(), "emitting batch");
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = output.send(batch) => sent.is_ok(),
    }
}
