//! Async Write-Ahead Log (WAL) with group commit for the HTTP server.
//!
//! Uses tokio channels + a background task to batch multiple concurrent
//! appends into a single write + fsync cycle. A commit gate orders
//! "append, then apply" against snapshots: commits hold it shared, a snapshot
//! holds it exclusively while it saves the store and truncates the log.

use parking_lot::Mutex;
use publications_core::config;
use publications_core::storage::wal::{replay_file, serialize_and_frame};
use publications_core::storage::{ReplayStats, WalEntry};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock, RwLockWriteGuard};

/// A request from a caller to append an entry to the WAL.
struct GroupCommitRequest {
    framed_bytes: Vec<u8>,
    result_tx: oneshot::Sender<io::Result<()>>,
}

/// Async append-only write-ahead log with CRC32 integrity checks and group commit.
pub struct WriteAheadLog {
    submit_tx: mpsc::Sender<GroupCommitRequest>,
    commit_gate: RwLock<()>,
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl WriteAheadLog {
    /// Open or create the WAL file and spawn the background batch writer task.
    pub fn new(data_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(config::WAL_FILE_NAME);
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let file = opts.open(&path)?;
        let writer = Arc::new(Mutex::new(BufWriter::new(file)));

        let (submit_tx, submit_rx) = mpsc::channel::<GroupCommitRequest>(4096);
        let task_writer = Arc::clone(&writer);
        tokio::spawn(async move {
            batch_writer_loop(submit_rx, task_writer).await;
        });

        Ok(Self {
            submit_tx,
            commit_gate: RwLock::new(()),
            path,
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a WAL entry using group commit.
    ///
    /// Returns once the batch holding the entry has been fsynced.
    pub async fn append(&self, entry: &WalEntry) -> io::Result<()> {
        let framed = serialize_and_frame(entry)?;

        let (result_tx, result_rx) = oneshot::channel();
        self.submit_tx
            .send(GroupCommitRequest {
                framed_bytes: framed,
                result_tx,
            })
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "WAL batch writer stopped"))?;

        result_rx
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "WAL batch result lost"))?
    }

    /// Append `entry`, then run `apply`, without a snapshot in between.
    ///
    /// `apply` is not called when the append fails.
    pub async fn commit<R>(&self, entry: &WalEntry, apply: impl FnOnce() -> R) -> io::Result<R> {
        let _gate = self.commit_gate.read().await;
        self.append(entry).await?;
        Ok(apply())
    }

    /// Read all entries from the WAL file, verifying integrity.
    pub fn replay(&self) -> io::Result<(Vec<WalEntry>, ReplayStats)> {
        replay_file(&self.path)
    }

    /// Freeze the WAL, waiting for in-flight commits and blocking new ones.
    ///
    /// Hold the returned guard while performing snapshot + truncate.
    pub async fn freeze(&self) -> RwLockWriteGuard<'_, ()> {
        self.commit_gate.write().await
    }

    /// Truncate the WAL file, fsync, and reopen in append mode.
    pub fn truncate(&self) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        let truncated = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        truncated.sync_all()?;
        *writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        );
        Ok(())
    }

    /// Current size of the WAL file in bytes.
    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}

/// Background task that batches WAL entries and writes them together.
async fn batch_writer_loop(
    mut rx: mpsc::Receiver<GroupCommitRequest>,
    writer: Arc<Mutex<BufWriter<File>>>,
) {
    let max_batch = config::WAL_GROUP_COMMIT_MAX_BATCH;
    let max_wait = Duration::from_micros(config::WAL_GROUP_COMMIT_MAX_WAIT_US);
    let mut batch: Vec<GroupCommitRequest> = Vec::with_capacity(max_batch);

    loop {
        let first = match rx.recv().await {
            Some(req) => req,
            None => break,
        };
        batch.push(first);

        while batch.len() < max_batch {
            match rx.try_recv() {
                Ok(req) => batch.push(req),
                Err(_) => break,
            }
        }

        if batch.len() > 1 && batch.len() < max_batch {
            let deadline = tokio::time::Instant::now() + max_wait;
            while batch.len() < max_batch {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(req)) => batch.push(req),
                    _ => break,
                }
            }
        }

        flush_batch(&mut batch, &writer);
    }
}

/// Write all entries in the batch, fsync once, and notify all callers.
fn flush_batch(batch: &mut Vec<GroupCommitRequest>, writer: &Arc<Mutex<BufWriter<File>>>) {
    let mut w = writer.lock();

    let mut write_err: Option<io::Error> = None;
    for req in batch.iter() {
        if let Err(e) = w.write_all(&req.framed_bytes) {
            write_err = Some(e);
            break;
        }
    }
    if write_err.is_none() {
        if let Err(e) = w.flush() {
            write_err = Some(e);
        }
    }
    if write_err.is_none() {
        if let Err(e) = w.get_mut().sync_all() {
            write_err = Some(e);
        }
    }

    match write_err {
        Some(e) => {
            tracing::error!(entries = batch.len(), "WAL batch write failed: {}", e);
            for req in batch.drain(..) {
                let _ = req
                    .result_tx
                    .send(Err(io::Error::new(e.kind(), e.to_string())));
            }
        }
        None => {
            metrics::histogram!("publications_wal_batch_size").record(batch.len() as f64);
            for req in batch.drain(..) {
                let _ = req.result_tx.send(Ok(()));
            }
        }
    }
}
