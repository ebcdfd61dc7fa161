//! Feedback persistence
//!
//! Records are appended to a JSON-lines file by a single background writer,
//! so lines from concurrent requests never interleave. The file is opened
//! with `O_APPEND` and each record goes out in one `write_all`, which keeps
//! whole lines intact when several processes share the file.

use sentiscope_core::{Error, FeedbackRecord, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Accepts feedback for later retraining
pub trait FeedbackSink: Send + Sync {
    /// Queue one record
    fn submit(&self, record: FeedbackRecord) -> Result<()>;
}

/// Configuration for the JSON-lines sink
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Log file, created with its parent directories if missing
    pub path: PathBuf,

    /// Sync to disk after this many records (0 = only on flush)
    pub sync_every: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./feedback/feedback.jsonl"),
            sync_every: 32,
        }
    }
}

/// Commands sent to the background writer
enum FeedbackCommand {
    Record(Box<FeedbackRecord>),
    Flush(oneshot::Sender<std::io::Result<()>>),
    Shutdown(Option<oneshot::Sender<()>>),
}

/// Append-only JSON-lines feedback log
pub struct JsonlFeedbackSink {
    sender: mpsc::UnboundedSender<FeedbackCommand>,
    path: PathBuf,
    writer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl JsonlFeedbackSink {
    /// Open (or create) the log and start the writer thread
    pub fn new(config: FeedbackConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let sync_every = config.sync_every;
        let handle = std::thread::Builder::new()
            .name("feedback-writer".to_string())
            .spawn(move || run_writer(file, sync_every, receiver))?;

        info!("Feedback sink writing to {:?}", config.path);

        Ok(Self {
            sender,
            path: config.path,
            writer: parking_lot::Mutex::new(Some(handle)),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every record queued so far is on disk
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(FeedbackCommand::Flush(ack))
            .map_err(|_| writer_stopped())?;
        done.await.map_err(|_| writer_stopped())??;
        Ok(())
    }

    /// Drain the queue, sync, and stop the writer
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(FeedbackCommand::Shutdown(Some(ack))).is_ok() {
            let _ = done.await;
        }
        let handle = self.writer.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Feedback writer thread panicked");
            }
        }
    }

    /// Read every record back, skipping torn or malformed lines
    pub fn read_all(path: &Path) -> Result<Vec<FeedbackRecord>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed feedback line {}: {}", number + 1, e),
            }
        }
        Ok(records)
    }
}

impl FeedbackSink for JsonlFeedbackSink {
    fn submit(&self, record: FeedbackRecord) -> Result<()> {
        self.sender
            .send(FeedbackCommand::Record(Box::new(record)))
            .map_err(|_| writer_stopped())
    }
}

impl Drop for JsonlFeedbackSink {
    fn drop(&mut self) {
        let _ = self.sender.send(FeedbackCommand::Shutdown(None));
    }
}

fn writer_stopped() -> Error {
    Error::internal("feedback writer has stopped")
}

/// Background writer loop
fn run_writer(
    mut file: File,
    sync_every: usize,
    mut receiver: mpsc::UnboundedReceiver<FeedbackCommand>,
) {
    let mut since_sync = 0usize;

    while let Some(command) = receiver.blocking_recv() {
        match command {
            FeedbackCommand::Record(record) => {
                if let Err(e) = append(&mut file, &record) {
                    error!("Failed to write feedback record: {}", e);
                    continue;
                }
                since_sync += 1;
                if sync_every > 0 && since_sync >= sync_every {
                    if let Err(e) = file.sync_data() {
                        error!("Failed to sync feedback log: {}", e);
                    }
                    since_sync = 0;
                }
            }
            FeedbackCommand::Flush(ack) => {
                let result = file.sync_data();
                since_sync = 0;
                let _ = ack.send(result);
            }
            FeedbackCommand::Shutdown(ack) => {
                debug!("Feedback writer shutting down");
                receiver.close();
                let mut pending_flushes = Vec::new();
                while let Ok(command) = receiver.try_recv() {
                    match command {
                        FeedbackCommand::Record(record) => {
                            if let Err(e) = append(&mut file, &record) {
                                error!("Failed to write feedback record: {}", e);
                            }
                        }
                        FeedbackCommand::Flush(ack) => pending_flushes.push(ack),
                        FeedbackCommand::Shutdown(_) => {}
                    }
                }
                if let Err(e) = file.sync_data() {
                    error!("Failed to sync feedback log: {}", e);
                }
                for flush in pending_flushes {
                    let _ = flush.send(Ok(()));
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                break;
            }
        }
    }
}

/// Serialize one record and emit it as a single write
fn append(file: &mut File, record: &FeedbackRecord) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    file.write_all(&line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentiscope_core::Label;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sink(dir: &Path) -> JsonlFeedbackSink {
        JsonlFeedbackSink::new(FeedbackConfig {
            path: dir.join("nested/feedback.jsonl"),
            sync_every: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let sink = sink(temp_dir.path());

        sink.submit(FeedbackRecord::new("Loved it", Label::Positive, true))
            .unwrap();
        sink.submit(FeedbackRecord::new("Cold fries", Label::Positive, false))
            .unwrap();
        sink.flush().await.unwrap();

        let records = JsonlFeedbackSink::read_all(sink.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].review, "Loved it");
        assert!(!records[1].is_correct);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_keep_lines_whole() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(sink(temp_dir.path()));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let review = format!("review {} {}", i, "x".repeat(i * 97));
                    sink.submit(FeedbackRecord::new(review, Label::Negative, i % 2 == 0))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        sink.flush().await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 32);
        assert_eq!(JsonlFeedbackSink::read_all(sink.path()).unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_two_sinks_share_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let first = sink(temp_dir.path());
        let second = sink(temp_dir.path());

        for i in 0..10 {
            first
                .submit(FeedbackRecord::new(format!("a{i}"), Label::Positive, true))
                .unwrap();
            second
                .submit(FeedbackRecord::new(format!("b{i}"), Label::Negative, true))
                .unwrap();
        }
        first.flush().await.unwrap();
        second.flush().await.unwrap();

        let records = JsonlFeedbackSink::read_all(first.path()).unwrap();
        assert_eq!(records.len(), 20);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects_new_records() {
        let temp_dir = TempDir::new().unwrap();
        let sink = sink(temp_dir.path());

        sink.submit(FeedbackRecord::new("last words", Label::Positive, true))
            .unwrap();
        sink.shutdown().await;

        assert_eq!(JsonlFeedbackSink::read_all(sink.path()).unwrap().len(), 1);
        assert!(sink
            .submit(FeedbackRecord::new("too late", Label::Positive, true))
            .is_err());
    }

    #[test]
    fn test_read_all_skips_torn_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("feedback.jsonl");
        let good = serde_json::to_string(&FeedbackRecord::new("ok", Label::Positive, true)).unwrap();
        std::fs::write(&path, format!("{good}\n{{\"review\":\"tor\n\n{good}\n")).unwrap();

        assert_eq!(JsonlFeedbackSink::read_all(&path).unwrap().len(), 2);
        assert!(JsonlFeedbackSink::read_all(&temp_dir.path().join("absent"))
            .unwrap()
            .is_empty());
    }
}
