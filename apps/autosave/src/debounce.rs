use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::draft::DraftCache;
use crate::error::AutosaveError;
use crate::sink::SaveSink;

/// Idle interval before a pending change is written.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    pub delay: Duration,
    /// Remove the draft cache once the server has the state.
    pub clear_draft_on_save: bool,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            clear_draft_on_save: false,
        }
    }
}

/// What the editor shows next to the form ("Saving…", "Saved", …).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Pending,
    Saving,
    Saved { at: DateTime<Utc> },
    Failed { message: String },
}

enum Command<T> {
    Update(T),
    Flush(oneshot::Sender<Result<(), AutosaveError>>),
    Shutdown,
}

/// Debounced single-writer save pipeline.
///
/// At most one save is in flight. A push arriving while a save runs waits in
/// the queue and starts a fresh debounce window afterwards. There is no retry:
/// a failed state stays pending (and in the draft cache) until the next push
/// or [`flush`](Self::flush).
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    status: watch::Receiver<SaveStatus>,
    worker: Option<JoinHandle<()>>,
}

impl<T> Debouncer<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Starts the worker on the current tokio runtime.
    pub fn spawn<S>(sink: S, config: AutosaveConfig, cache: Option<DraftCache>) -> Self
    where
        S: SaveSink<T> + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SaveStatus::Idle);
        let worker = Worker {
            sink,
            config,
            cache,
            status: status_tx,
            pending: None,
            deadline: None,
        };
        let handle = tokio::spawn(worker.run(rx));
        Self {
            tx,
            status,
            worker: Some(handle),
        }
    }

    /// Records the latest form state, superseding any unsaved one and
    /// restarting the idle timer.
    pub fn push(&self, state: T) -> Result<(), AutosaveError> {
        self.tx
            .send(Command::Update(state))
            .map_err(|_| AutosaveError::Closed)
    }

    /// Writes the pending state now (if any) and waits for the result.
    pub async fn flush(&self) -> Result<(), AutosaveError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply_tx))
            .map_err(|_| AutosaveError::Closed)?;
        reply_rx.await.map_err(|_| AutosaveError::Closed)?
    }

    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    /// Saves anything pending, then stops the worker.
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                warn!("Auto-save worker ended abnormally: {e}");
            }
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        // The worker still saves pending state after it sees this.
        if self.worker.is_some() {
            let _ = self.tx.send(Command::Shutdown);
        }
    }
}

struct Worker<S, T> {
    sink: S,
    config: AutosaveConfig,
    cache: Option<DraftCache>,
    status: watch::Sender<SaveStatus>,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<S, T> Worker<S, T>
where
    S: SaveSink<T>,
    T: Serialize + Send + Sync,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command<T>>) {
        loop {
            let command = match self.deadline {
                Some(deadline) => tokio::select! {
                    command = rx.recv() => command,
                    _ = sleep_until(deadline) => {
                        self.deadline = None;
                        let _ = self.save_pending().await;
                        continue;
                    }
                },
                None => rx.recv().await,
            };

            match command {
                Some(Command::Update(state)) => self.update(state).await,
                Some(Command::Flush(reply)) => {
                    self.deadline = None;
                    let _ = reply.send(self.save_pending().await);
                }
                Some(Command::Shutdown) | None => {
                    if self.pending.is_some() {
                        let _ = self.save_pending().await;
                    }
                    debug!("Auto-save worker stopped");
                    return;
                }
            }
        }
    }

    async fn update(&mut self, state: T) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&state).await {
                warn!("Failed to write draft cache {}: {e}", cache.path().display());
            }
        }
        self.pending = Some(state);
        self.deadline = Some(Instant::now() + self.config.delay);
        self.status.send_replace(SaveStatus::Pending);
    }

    async fn save_pending(&mut self) -> Result<(), AutosaveError> {
        let Some(state) = &self.pending else {
            return Ok(());
        };

        self.status.send_replace(SaveStatus::Saving);
        match self.sink.save(state).await {
            Ok(()) => {
                self.pending = None;
                self.status
                    .send_replace(SaveStatus::Saved { at: Utc::now() });
                if self.config.clear_draft_on_save {
                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.clear().await {
                            warn!("Failed to clear draft cache: {e}");
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Auto-save failed: {message}");
                self.status.send_replace(SaveStatus::Failed {
                    message: message.clone(),
                });
                Err(AutosaveError::Save(message))
            }
        }
    }
}
