//! Asynchronous chunked file reading.
//!
//! A [`ChunkedReadTask`] runs the same encoding detection as the
//! synchronous path once, then streams decoded text to a subscriber as
//! [`ReadEvent`]s over a rendezvous channel, so every emission is a yield
//! point paced by the consumer. Emissions are throttled to roughly one
//! hundred per file regardless of size. Cancellation is cooperative: the
//! flag is checked before each emission, and the subscriber always
//! receives exactly one terminal event.

use crate::catalog::EncodingCatalog;
use crate::encoding::StreamDecoder;
use crate::error::{Result, TextError};
use crate::file::TextFile;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;
use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Default chunk size for asynchronous reads, in bytes.
pub const ASYNC_READ_CHUNK: usize = 4096;

/// Lifecycle state carried by a [`ReadEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// The task has started; no text yet.
    Start,
    /// A decoded chunk of text.
    Reading,
    /// Reserved; not reachable in the default flow.
    Paused,
    /// The stream ended, normally or on a recorded error.
    End,
    /// The stream was cancelled before reaching the end.
    Aborted,
}

impl ReadState {
    /// Whether this state ends the stream. The terminal event is always
    /// the last message of a task.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ReadState::End | ReadState::Aborted)
    }
}

/// A progress notification from a [`ChunkedReadTask`].
#[derive(Debug, Clone)]
pub struct ReadEvent {
    /// Lifecycle state.
    pub state: ReadState,
    /// Decoded text, present on `Reading` events.
    pub text: Option<String>,
    /// Cumulative bytes consumed from the file, monotonically increasing.
    pub progress: u64,
}

impl ReadEvent {
    /// Whether the event carries text.
    #[must_use]
    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }
}

/// Handle to a background chunked read.
///
/// The worker owns a [`TextFile`] (typically a [`TextFile::duplicate`] of
/// the caller's handle) and returns it, with the detection state and any
/// recorded error, through [`ChunkedReadTask::join`]. A task is not
/// restartable; create a new one per read.
#[derive(Debug)]
pub struct ChunkedReadTask {
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<TextFile>>,
}

impl ChunkedReadTask {
    /// Spawn a background read of `file`'s path.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Read`] if the file cannot be opened or the
    /// worker thread cannot be spawned; no task exists in that case.
    pub fn spawn(file: TextFile, chunk_size: usize) -> Result<(Self, Receiver<ReadEvent>)> {
        let chunk_size = chunk_size.max(1);
        let src = File::open(file.path())
            .map_err(|err| TextError::Read(format!("{}: {err}", file.path().display())))?;
        let file_size = src.metadata().map(|meta| meta.len()).unwrap_or(0);

        let (sender, receiver) = bounded(0);
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let worker = thread::Builder::new()
            .name("textio-read".to_string())
            .spawn(move || run_read(file, src, file_size, chunk_size, &sender, &flag))
            .map_err(|err| TextError::Read(format!("failed to spawn read worker: {err}")))?;

        Ok((
            ChunkedReadTask {
                cancel,
                worker: Some(worker),
            },
            receiver,
        ))
    }

    /// Request cancellation. Advisory and cooperative: it takes effect at
    /// the worker's next emission boundary, not instantaneously.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Whether the worker has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker and recover the handle it read with, carrying
    /// the detection state and any recorded error.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Read`] if the worker panicked.
    pub fn join(mut self) -> Result<TextFile> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| TextError::Read("read worker panicked".to_string())),
            None => Err(TextError::Read("read task already joined".to_string())),
        }
    }
}

#[allow(clippy::too_many_lines, clippy::needless_pass_by_value)]
fn run_read(
    mut file: TextFile,
    mut src: File,
    file_size: u64,
    chunk_size: usize,
    events: &Sender<ReadEvent>,
    cancel: &AtomicBool,
) -> TextFile {
    debug!("read task: start {}", file.path().display());
    let _ = events.send(ReadEvent {
        state: ReadState::Start,
        text: None,
        progress: 0,
    });

    let catalog = EncodingCatalog::from_environment();
    if let Err(err) = file.detect_encoding(&catalog) {
        file.set_last_error(err.to_string());
        send_terminal(events, ReadState::End, 0);
        return file;
    }

    let mut decoder = match StreamDecoder::new(file.encoding()) {
        Ok(decoder) => decoder,
        Err(err) => {
            file.set_last_error(err.to_string());
            send_terminal(events, ReadState::End, 0);
            return file;
        },
    };

    // Amortize notifications: roughly a hundred per file, however big.
    let throttle = chunk_size.max(usize::try_from(file_size / 100).unwrap_or(usize::MAX));

    let mut progress: u64 = 0;

    // The recorded mark is state, not content; skip it in the stream.
    if let Some(mark) = file.bom() {
        let mut mark_bytes = vec![0u8; mark.len()];
        match src.read_exact(&mut mark_bytes) {
            Ok(()) => progress += mark.len() as u64,
            Err(err) => {
                file.set_last_error(err.to_string());
                send_terminal(events, ReadState::End, progress);
                return file;
            },
        }
    }

    let mut chunk = vec![0u8; chunk_size];
    let mut accumulated = String::new();
    let mut aborted = false;
    let mut failed = false;

    loop {
        let count = match src.read(&mut chunk) {
            Ok(count) => count,
            Err(err) => {
                file.set_last_error(err.to_string());
                failed = true;
                break;
            },
        };
        let last = count == 0;

        match decoder.decode(&chunk[..count], last) {
            Ok(decoded) => accumulated.push_str(&decoded),
            Err(err) => {
                debug!(
                    "read task: error while reading with {}: {err}",
                    file.encoding()
                );
                file.set_last_error(err.to_string());
                if file.magic.comment.is_some() {
                    file.magic.bad = true;
                }
                failed = true;
                break;
            },
        }
        progress += count as u64;
        if last {
            break;
        }

        if accumulated.len() >= throttle {
            if cancel.load(Ordering::Relaxed) {
                aborted = true;
                break;
            }
            let payload = std::mem::take(&mut accumulated);
            if send_reading(events, payload, progress).is_err() {
                // Subscriber went away; treat it like cancellation.
                aborted = true;
                break;
            }
        }
    }

    // Any remaining partial buffer is emitted once.
    if !aborted && !failed && !accumulated.is_empty() {
        if cancel.load(Ordering::Relaxed) {
            aborted = true;
        } else if send_reading(events, std::mem::take(&mut accumulated), progress).is_err() {
            aborted = true;
        }
    }

    let terminal = if aborted {
        ReadState::Aborted
    } else {
        ReadState::End
    };
    send_terminal(events, terminal, progress);
    debug!(
        "read task: {} {terminal:?} after {progress} bytes",
        file.path().display()
    );

    if !aborted && !failed {
        file.record_mod_time();
    }
    file
}

fn send_reading(
    events: &Sender<ReadEvent>,
    text: String,
    progress: u64,
) -> std::result::Result<(), crossbeam_channel::SendError<ReadEvent>> {
    events.send(ReadEvent {
        state: ReadState::Reading,
        text: Some(text),
        progress,
    })
}

fn send_terminal(events: &Sender<ReadEvent>, state: ReadState, progress: u64) {
    let _ = events.send(ReadEvent {
        state,
        text: None,
        progress,
    });
}
