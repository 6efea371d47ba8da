//! Live keystroke feed from a line-oriented stream.
//!
//! A capture tool writes one `code timestamp` record per key press; this
//! collector reads those lines on a background thread and forwards parsed
//! keystrokes through a bounded channel.

use crate::collector::reader::parse_line;
use crate::collector::types::Keystroke;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors that can occur while starting the feed.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collector is already running")]
    AlreadyRunning,
    #[error("Collector input was already consumed")]
    InputConsumed,
    #[error("Failed to spawn reader thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Where the collector reads its lines from.
pub enum LineSource {
    Stdin,
    Reader(Box<dyn BufRead + Send>),
}

/// Reads keystroke records on a background thread.
///
/// The channel disconnects once the input reaches end of file, so a
/// receiver can tell a finished feed apart from a quiet one.
pub struct LineCollector {
    source: Option<LineSource>,
    sender: Option<Sender<Keystroke>>,
    receiver: Receiver<Keystroke>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl LineCollector {
    /// Collector over the process's standard input.
    pub fn stdin() -> Self {
        Self::with_source(LineSource::Stdin)
    }

    /// Collector over any buffered reader.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self::with_source(LineSource::Reader(Box::new(reader)))
    }

    fn with_source(source: LineSource) -> Self {
        // Use a bounded channel to prevent unbounded memory growth
        let (sender, receiver) = bounded(10_000);
        Self {
            source: Some(source),
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start reading in a background thread.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        let (source, sender) = match (self.source.take(), self.sender.take()) {
            (Some(source), Some(sender)) => (source, sender),
            _ => return Err(CollectorError::InputConsumed),
        };

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        let spawned = thread::Builder::new()
            .name("keystroke-reader".to_string())
            .spawn(move || {
                match source {
                    LineSource::Stdin => read_lines(std::io::stdin().lock(), &sender, &running),
                    LineSource::Reader(reader) => read_lines(reader, &sender, &running),
                }
                running.store(false, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CollectorError::Spawn(e))
            }
        }
    }

    /// Ask the reader thread to stop after its current line.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the reader thread is still consuming input.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for keystrokes.
    pub fn receiver(&self) -> &Receiver<Keystroke> {
        &self.receiver
    }

    /// Try to receive a keystroke without blocking.
    pub fn try_recv(&self) -> Option<Keystroke> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for LineCollector {
    fn drop(&mut self) {
        self.stop();
        // A thread blocked on stdin cannot be interrupted; only join finished ones.
        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

fn read_lines<R: BufRead>(reader: R, sender: &Sender<Keystroke>, running: &AtomicBool) {
    for (index, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Keystroke feed read error: {}", e);
                break;
            }
        };
        match parse_line(&line) {
            Ok(Some(keystroke)) => {
                if sender.send(keystroke).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(reason) => tracing::warn!("Skipping feed line {}: {}", index + 1, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_reader_feed_delivers_keystrokes() {
        let input = "104 10.00\nnot a record\n101 10.12\n";
        let mut collector = LineCollector::from_reader(Cursor::new(input.to_string()));
        collector.start().unwrap();

        let receiver = collector.receiver().clone();
        let first = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.code, 104);
        assert_eq!(second.code, 101);

        // End of input disconnects the channel
        assert!(receiver.recv_timeout(Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut collector = LineCollector::from_reader(Cursor::new(String::new()));
        collector.start().unwrap();
        assert!(collector.start().is_err());
    }
}
