//! # Export Delivery Module
//!
//! The "offer this file to the user" capability. The engine produces bytes
//! and a file name; a sink decides where they end up.
//!
//! ## Sinks
//! - `StdoutSink`: Writes the contents to standard output
//! - `DirectorySink`: Writes `<dir>/<file_name>`
//! - `BackgroundSink`: Queues files for a writer thread wrapping another sink
//!
//! ## Background Writer
//! Deliveries flow caller → command channel → writer thread, so a batch
//! export never blocks on disk I/O. Write failures are logged by the writer
//! thread and counted; `flush()` waits until everything queued so far has
//! been handled.

use crate::error::DeliveryError;
use crate::export::ExportFile;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Somewhere an export file can be delivered
pub trait ExportSink: Send + Sync {
    fn deliver(&self, file: &ExportFile) -> Result<(), DeliveryError>;
}

/// Writes export contents to stdout
pub struct StdoutSink;

impl ExportSink for StdoutSink {
    fn deliver(&self, file: &ExportFile) -> Result<(), DeliveryError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(&file.contents)?;
        handle.flush()?;
        log::info!("Delivered {} ({} bytes) to stdout", file.file_name, file.contents.len());
        Ok(())
    }
}

/// Writes each export as a file inside a directory
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, file: &ExportFile) -> PathBuf {
        self.dir.join(&file.file_name)
    }
}

impl ExportSink for DirectorySink {
    fn deliver(&self, file: &ExportFile) -> Result<(), DeliveryError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(file);
        fs::write(&path, &file.contents)?;
        log::info!("Delivered {} ({} bytes)", path.display(), file.contents.len());
        Ok(())
    }
}

/// Command sent from callers to the writer thread
enum WriterCommand {
    Deliver(ExportFile),
    /// Acknowledge once every earlier command is handled
    Flush(Sender<()>),
    Stop,
}

/// Delivers exports on a dedicated writer thread
pub struct BackgroundSink {
    command_tx: Sender<WriterCommand>,
    writer_thread: Option<thread::JoinHandle<()>>,
    delivered: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl BackgroundSink {
    pub fn new(inner: Box<dyn ExportSink>) -> Self {
        let (command_tx, command_rx) = unbounded();
        let delivered = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let writer_thread = {
            let delivered = delivered.clone();
            let failed = failed.clone();
            thread::spawn(move || Self::writer_loop(command_rx, inner, delivered, failed))
        };

        Self {
            command_tx,
            writer_thread: Some(writer_thread),
            delivered,
            failed,
        }
    }

    /// Block until every file queued so far has been handled
    pub fn flush(&self) -> Result<(), DeliveryError> {
        let (ack_tx, ack_rx) = bounded(1);
        self.command_tx
            .send(WriterCommand::Flush(ack_tx))
            .map_err(|_| DeliveryError::WriterClosed)?;
        ack_rx.recv().map_err(|_| DeliveryError::WriterClosed)
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    fn writer_loop(
        command_rx: Receiver<WriterCommand>,
        inner: Box<dyn ExportSink>,
        delivered: Arc<AtomicUsize>,
        failed: Arc<AtomicUsize>,
    ) {
        loop {
            match command_rx.recv() {
                Ok(WriterCommand::Deliver(file)) => match inner.deliver(&file) {
                    Ok(()) => {
                        delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log::error!("Failed to deliver {}: {}", file.file_name, e);
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                },
                Ok(WriterCommand::Flush(ack)) => {
                    let _ = ack.send(());
                }
                Ok(WriterCommand::Stop) => {
                    log::debug!("Export writer stopped");
                    break;
                }
                Err(_) => {
                    log::debug!("Export writer: command channel closed");
                    break;
                }
            }
        }
    }
}

impl ExportSink for BackgroundSink {
    fn deliver(&self, file: &ExportFile) -> Result<(), DeliveryError> {
        self.command_tx
            .send(WriterCommand::Deliver(file.clone()))
            .map_err(|_| DeliveryError::WriterClosed)
    }
}

impl Drop for BackgroundSink {
    fn drop(&mut self) {
        // Stop is queued behind pending deliveries, so they still get written
        let _ = self.command_tx.send(WriterCommand::Stop);

        if let Some(handle) = self.writer_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file(name: &str, body: &str) -> ExportFile {
        ExportFile {
            file_name: name.to_string(),
            contents: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_directory_sink_writes_file() {
        let temp_dir = tempdir().unwrap();
        let sink = DirectorySink::new(temp_dir.path().join("exports"));

        sink.deliver(&file("a.csv", "x,y\n")).unwrap();

        let written = fs::read_to_string(temp_dir.path().join("exports").join("a.csv")).unwrap();
        assert_eq!(written, "x,y\n");
    }

    #[test]
    fn test_background_sink_delivers_in_order() {
        let temp_dir = tempdir().unwrap();
        let sink = BackgroundSink::new(Box::new(DirectorySink::new(temp_dir.path())));

        sink.deliver(&file("a.csv", "1")).unwrap();
        sink.deliver(&file("b.csv", "2")).unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.delivered(), 2);
        assert_eq!(sink.failed(), 0);
        assert_eq!(fs::read_to_string(temp_dir.path().join("b.csv")).unwrap(), "2");
    }

    #[test]
    fn test_background_sink_counts_failures() {
        let temp_dir = tempdir().unwrap();
        // A regular file where the directory should be makes every write fail
        let blocker = temp_dir.path().join("blocked");
        fs::write(&blocker, "").unwrap();
        let sink = BackgroundSink::new(Box::new(DirectorySink::new(&blocker)));

        sink.deliver(&file("a.csv", "1")).unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.delivered(), 0);
        assert_eq!(sink.failed(), 1);
    }

    #[test]
    fn test_drop_flushes_pending_files() {
        let temp_dir = tempdir().unwrap();
        {
            let sink = BackgroundSink::new(Box::new(DirectorySink::new(temp_dir.path())));
            sink.deliver(&file("late.csv", "z")).unwrap();
        }
        assert!(temp_dir.path().join("late.csv").exists());
    }
}
