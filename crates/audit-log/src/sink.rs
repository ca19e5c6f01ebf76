use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::AuditEntry;
use crate::writer::{AuditWriteError, AuditWriter};

const CHANNEL_BUFFER: usize = 1024;

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Cloneable handle feeding entries to a background journal writer.
///
/// The writer task exits after the last clone is dropped, flushing whatever
/// is still buffered; await the returned [`JoinHandle`] to be sure every
/// entry reached the file.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEntry>,
}

impl std::fmt::Debug for AuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl AuditSink {
    /// Open the journal at `path` and spawn its writer task.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), AuditWriteError> {
        Self::start_with_interval(path, DEFAULT_FLUSH_INTERVAL).await
    }

    /// Like [`start`](Self::start), flushing buffered lines every `flush_every`.
    pub async fn start_with_interval(
        path: impl AsRef<Path>,
        flush_every: Duration,
    ) -> Result<(Self, JoinHandle<()>), AuditWriteError> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let writer = AuditWriter::new(path).await?;
        let handle = tokio::spawn(drain(writer, rx, flush_every));
        Ok((Self { tx }, handle))
    }

    /// Queue an entry, waiting for channel space if the writer is behind.
    ///
    /// Entries sent after the writer task died are dropped with a warning.
    pub async fn log(&self, entry: AuditEntry) {
        if let Err(err) = self.tx.send(entry).await {
            tracing::warn!(
                event_type = ?err.0.event_type,
                "audit writer is gone; entry dropped"
            );
        }
    }
}

async fn drain(mut writer: AuditWriter, mut rx: mpsc::Receiver<AuditEntry>, flush_every: Duration) {
    let mut ticker = tokio::time::interval(flush_every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut dirty = false;

    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(entry) => match writer.write(&entry).await {
                    Ok(()) => dirty = true,
                    Err(err) => tracing::error!(%err, "failed to write audit entry"),
                },
                None => break,
            },
            _ = ticker.tick(), if dirty => {
                match writer.flush().await {
                    Ok(()) => dirty = false,
                    Err(err) => tracing::error!(%err, "periodic audit flush failed"),
                }
            }
        }
    }

    if let Err(err) = writer.flush().await {
        tracing::error!(%err, "final audit flush failed");
    }
    tracing::debug!(
        path = %writer.path().display(),
        lines = writer.lines_written(),
        "audit writer stopped"
    );
}
