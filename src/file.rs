//! File handles with lazily detected encoding state.
//!
//! [`TextFile`] wraps a path with everything learned about its encoding: a
//! detected byte-order mark, a magic-comment declaration, a brute-force
//! guess, or a caller-forced value. Content flows through [`TextFile::read`]
//! and [`TextFile::write`]; large files go through
//! [`TextFile::read_async`] instead.
//!
//! # Examples
//!
//! ```no_run
//! use textio::TextFile;
//!
//! let mut handle = TextFile::open("notes.txt")?;
//! let text = handle.read()?;
//! println!("{} ({})", text.len(), handle.encoding());
//! # Ok::<(), textio::TextError>(())
//! ```

use crate::bom::{self, Bom};
use crate::catalog::EncodingCatalog;
use crate::encoding::TextEncoding;
use crate::error::{Result, TextError};
use crate::guess;
use crate::magic;
use crate::read_task::{ChunkedReadTask, ReadEvent};
use crossbeam_channel::Receiver;
use log::{debug, warn};
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Default chunk size for synchronous reads, in bytes.
pub const DEFAULT_READ_CHUNK: usize = 512;

/// Observer invoked when a handle's content changes. A callback that
/// returns an error is deregistered after the notification pass finishes.
pub type ModifiedCallback = Box<dyn FnMut() -> std::result::Result<(), String> + Send>;

/// Token identifying a registered modified callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

/// Magic-comment bookkeeping: the declaration found, and whether it was
/// later proven unreliable (binary content was actually read).
#[derive(Debug, Clone, Default)]
pub(crate) struct MagicState {
    pub(crate) comment: Option<TextEncoding>,
    pub(crate) bad: bool,
}

/// A file on disk plus its detected encoding state.
///
/// Detection runs lazily on the first read and is skipped entirely once an
/// encoding is present, whether detected or forced through
/// [`TextFile::set_encoding`]. Decode failures never escape a read; the
/// content degrades to a raw byte-preserving representation and the cause
/// lands in [`TextFile::last_error`].
pub struct TextFile {
    path: PathBuf,
    mod_time: Option<SystemTime>,
    pub(crate) encoding: Option<TextEncoding>,
    pub(crate) bom: Option<Bom>,
    pub(crate) magic: MagicState,
    pub(crate) raw: bool,
    pub(crate) fuzzy_encoding: bool,
    pub(crate) last_error: Option<String>,
    buffer: Vec<u8>,
    callbacks: Vec<(CallbackId, ModifiedCallback)>,
    next_callback: u64,
    job: Option<ChunkedReadTask>,
}

impl fmt::Debug for TextFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextFile")
            .field("path", &self.path)
            .field("encoding", &self.encoding)
            .field("bom", &self.bom)
            .field("raw", &self.raw)
            .field("fuzzy_encoding", &self.fuzzy_encoding)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl TextFile {
    /// Create a handle for `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TextFile {
            path: path.into(),
            mod_time: None,
            encoding: None,
            bom: None,
            magic: MagicState::default(),
            raw: false,
            fuzzy_encoding: false,
            last_error: None,
            buffer: Vec::new(),
            callbacks: Vec::new(),
            next_callback: 0,
            job: None,
        }
    }

    /// Create a handle for `path`, verifying the file can be opened.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Read`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        File::open(&path)
            .map_err(|err| TextError::Read(format!("{}: {err}", path.display())))?;
        let mut handle = Self::new(path);
        handle.mod_time = file_mod_time(&handle.path);
        Ok(handle)
    }

    /// The wrapped path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time recorded at the last successful read or write.
    #[must_use]
    pub fn mod_time(&self) -> Option<SystemTime> {
        self.mod_time
    }

    /// Whether the file on disk has changed since the last read or write.
    #[must_use]
    pub fn changed_on_disk(&self) -> bool {
        match (self.mod_time, file_mod_time(&self.path)) {
            (Some(recorded), Some(current)) => recorded != current,
            _ => false,
        }
    }

    /// The resolved encoding, or the process default if none is set yet.
    #[must_use]
    pub fn encoding(&self) -> TextEncoding {
        self.encoding.unwrap_or_default()
    }

    /// Explicitly set or change the encoding of the file.
    ///
    /// `None` resets to the process-wide default. Either way the handle
    /// afterwards carries a value, which disables detection, and any
    /// previously recorded byte-order mark is invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::UnsupportedEncoding`] if the label names no
    /// registered encoding; the handle is unchanged in that case.
    pub fn set_encoding(&mut self, label: Option<&str>) -> Result<()> {
        let encoding = match label {
            Some(name) => TextEncoding::for_label(name)?,
            None => TextEncoding::default(),
        };
        self.encoding = Some(encoding);
        self.bom = None;
        Ok(())
    }

    /// The magic-comment declaration, if one was found.
    #[must_use]
    pub fn magic_comment(&self) -> Option<TextEncoding> {
        self.magic.comment
    }

    /// Whether a byte-order mark was detected. Always false once content
    /// degraded to raw bytes.
    #[must_use]
    pub fn has_bom(&self) -> bool {
        self.bom.is_some() && !self.raw
    }

    /// The detected byte-order mark, if any.
    #[must_use]
    pub fn bom(&self) -> Option<Bom> {
        self.bom
    }

    /// Whether the last read kept only raw bytes.
    #[must_use]
    pub fn is_raw_bytes(&self) -> bool {
        self.raw
    }

    /// Whether the resolved encoding is a low-confidence fallback: no BOM,
    /// no magic comment, and no successful brute-force guess.
    #[must_use]
    pub fn is_fuzzy_encoding(&self) -> bool {
        self.fuzzy_encoding
    }

    /// Read only: the on-disk file is not writable, or the last read
    /// degraded to raw bytes (regardless of file permissions).
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        if self.raw {
            return true;
        }
        fs::metadata(&self.path)
            .map(|meta| meta.permissions().readonly())
            .unwrap_or(false)
    }

    /// Diagnostics from the most recent degraded decode or stream error.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn set_last_error(&mut self, err: impl Into<String>) {
        self.last_error = Some(err.into());
    }

    pub(crate) fn clear_last_error(&mut self) {
        self.last_error = None;
    }

    /// Refresh the recorded modification time from disk.
    pub(crate) fn record_mod_time(&mut self) {
        self.mod_time = file_mod_time(&self.path);
    }

    /// Duplicate the handle: encoding, BOM, magic and fuzzy state are
    /// copied; the buffer, callbacks and any active read job are not.
    #[must_use]
    pub fn duplicate(&self) -> TextFile {
        TextFile {
            path: self.path.clone(),
            mod_time: self.mod_time,
            encoding: self.encoding,
            bom: self.bom,
            magic: self.magic.clone(),
            raw: false,
            fuzzy_encoding: self.fuzzy_encoding,
            last_error: self.last_error.clone(),
            buffer: Vec::new(),
            callbacks: Vec::new(),
            next_callback: 0,
            job: None,
        }
    }

    /// Reset all detection state back to the just-constructed state.
    pub fn reset_all(&mut self) {
        self.buffer = Vec::new();
        self.magic = MagicState::default();
        self.encoding = None;
        self.bom = None;
        self.raw = false;
        self.fuzzy_encoding = false;
        self.last_error = None;
    }

    /// Register a modified-content observer. The returned token removes it
    /// again through [`TextFile::remove_modified_callback`].
    pub fn add_modified_callback<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut() -> std::result::Result<(), String> + Send + 'static,
    {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Remove a registered callback. Returns whether it was present.
    pub fn remove_modified_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    /// Notify all observers of a content change.
    ///
    /// A failing callback does not abort notification of the remaining
    /// ones; failures are collected and the offending callbacks removed
    /// after the full pass.
    pub fn notify_modified(&mut self) {
        let mut failed = Vec::new();
        for (index, (id, callback)) in self.callbacks.iter_mut().enumerate() {
            if let Err(err) = callback() {
                warn!("modified callback {id:?} failed and will be removed: {err}");
                failed.push(index);
            }
        }
        for index in failed.into_iter().rev() {
            self.callbacks.remove(index);
        }
    }

    /// Determine the file's encoding and BOM state.
    ///
    /// Skipped when an encoding is already present (detected earlier or
    /// forced by the caller). Checks a byte-order mark first, then a magic
    /// comment (unless one previously proved unreliable), then brute
    /// force; with nothing confident the process default is recorded and
    /// the handle marked fuzzy.
    pub(crate) fn detect_encoding(&mut self, catalog: &EncodingCatalog) -> Result<()> {
        if let Some(encoding) = self.encoding {
            debug!("detect: skipping due to set encoding: {encoding}");
            return Ok(());
        }

        let prefix = guess::read_sample(&self.path, guess::GUESS_SAMPLE_SIZE)
            .map_err(|err| TextError::Read(format!("{}: {err}", self.path.display())))?;

        let mut detected = None;
        if !prefix.is_empty() {
            if let Some(mark) = bom::detect_bom(&prefix) {
                debug!("detect: file has {} BOM", mark.encoding());
                self.bom = Some(mark);
                detected = Some(mark.encoding());
            } else {
                self.bom = None;
                if !self.magic.bad {
                    if let Some(declared) = magic::scan_bytes_prefix(&prefix) {
                        debug!("detect: magic comment declares {declared}");
                        self.magic.comment = Some(declared);
                        detected = Some(declared);
                    }
                }
            }
        }

        if detected.is_none() {
            debug!("detect: doing brute force encoding check");
            detected = guess::guess_from_sample(&prefix, catalog);
        }

        let encoding = detected.unwrap_or_else(|| {
            self.fuzzy_encoding = true;
            warn!(
                "detect: no confident encoding for {}, falling back to {}",
                self.path.display(),
                TextEncoding::default()
            );
            TextEncoding::default()
        });
        debug!("detect: set encoding to {encoding}");
        self.encoding = Some(encoding);
        Ok(())
    }

    /// Read the whole file as text, handling any decoding that may be
    /// needed, with the default chunk size.
    ///
    /// Decode failure does not error: the content is retained as a
    /// NUL-joined raw representation, the handle is marked raw with the
    /// `binary` placeholder encoding, and the cause is available through
    /// [`TextFile::last_error`]. The same degradation applies to text that
    /// still embeds NUL after decoding, a deliberately broad heuristic
    /// that treats such content as binary.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Read`] if the file cannot be opened or read.
    pub fn read(&mut self) -> Result<String> {
        self.read_chunked(DEFAULT_READ_CHUNK)
    }

    /// [`TextFile::read`] with an explicit chunk size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Read`] if the file cannot be opened or read.
    pub fn read_chunked(&mut self, chunk_size: usize) -> Result<String> {
        let chunk_size = chunk_size.max(1);
        let catalog = EncodingCatalog::from_environment();
        self.detect_encoding(&catalog)?;

        let mut src = File::open(&self.path)
            .map_err(|err| TextError::Read(format!("{}: {err}", self.path.display())))?;

        self.buffer.clear();
        self.raw = false;
        debug!("read: start reading {}", self.path.display());
        let mut chunk = vec![0u8; chunk_size];
        loop {
            let count = src
                .read(&mut chunk)
                .map_err(|err| TextError::Read(format!("{}: {err}", self.path.display())))?;
            if count == 0 {
                break;
            }
            self.buffer.extend_from_slice(&chunk[..count]);
        }
        debug!("read: end reading");
        drop(src);

        let bytes = std::mem::take(&mut self.buffer);
        let text = self.decode_text(&bytes);
        self.mod_time = file_mod_time(&self.path);
        Ok(text)
    }

    /// Write `text` back to the file.
    ///
    /// The first two lines are re-scanned for a magic comment so user
    /// edits to a coding declaration are respected; the declared (or
    /// current) encoding leads the write trial, which picks the first
    /// candidate able to represent the whole text. The recorded BOM, if
    /// any, is written first; chunks are flushed as they go.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Write`] if no candidate encoding can represent
    /// the text (no file mutation occurs in that case) or if the
    /// destination cannot be opened.
    pub fn write(&mut self, text: &str) -> Result<()> {
        debug!("write: {}", self.path.display());

        // Check if a magic comment was added or changed.
        if let Some(declared) = magic::scan_text(text) {
            debug!("write: magic comment declares {declared}");
            self.magic.comment = Some(declared);
            self.encoding = Some(declared);
        }

        let catalog = EncodingCatalog::from_environment();
        let encoding = self.run_encode_trial(text, &catalog)?;

        let mut dest = File::create(&self.path)
            .map_err(|err| TextError::Write(format!("{}: {err}", self.path.display())))?;

        if self.has_bom() {
            if let Some(mark) = self.bom {
                debug!("write: adding BOM back to text");
                dest.write_all(mark.as_bytes())?;
            }
        }

        for chunk in crate::codec::char_chunks(text, crate::codec::ENCODE_CHUNK_CHARS) {
            let bytes = encoding
                .encode_strict(chunk)
                .map_err(|err| TextError::Write(err.to_string()))?;
            dest.write_all(bom::strip_codec_bom(&bytes))?;
            dest.flush()?;
        }
        debug!("write: {} was written successfully", self.path.display());

        self.mod_time = file_mod_time(&self.path);
        self.notify_modified();
        Ok(())
    }

    /// Start a background chunked read of the file.
    ///
    /// Detection runs once on the worker; decoded text arrives as
    /// [`ReadEvent`]s on the returned channel, ending with exactly one
    /// terminal event. The task handle is retained on this handle (see
    /// [`TextFile::active_job`], [`TextFile::cancel_read`]).
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Read`] if the file cannot be opened.
    pub fn read_async(&mut self, chunk_size: usize) -> Result<Receiver<ReadEvent>> {
        let (task, events) = ChunkedReadTask::spawn(self.duplicate(), chunk_size)?;
        self.job = Some(task);
        Ok(events)
    }

    /// The in-flight asynchronous read, if any.
    #[must_use]
    pub fn active_job(&self) -> Option<&ChunkedReadTask> {
        self.job.as_ref()
    }

    /// Request cancellation of the in-flight asynchronous read, if any.
    /// Takes effect at the task's next emission boundary.
    pub fn cancel_read(&self) {
        if let Some(job) = &self.job {
            job.cancel();
        }
    }

    /// Detach and return the active read task, e.g. to join it and recover
    /// the detection state it accumulated.
    pub fn take_job(&mut self) -> Option<ChunkedReadTask> {
        self.job.take()
    }
}

pub(crate) fn file_mod_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_open_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TextFile::open(dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, TextError::Read(_)));
    }

    #[test]
    fn test_encoding_defaults_to_utf8() {
        let handle = TextFile::new("x.txt");
        assert_eq!(handle.encoding(), TextEncoding::utf8());
    }

    #[test]
    fn test_set_encoding_validates_label() {
        let mut handle = TextFile::new("x.txt");
        assert!(matches!(
            handle.set_encoding(Some("bogus")).unwrap_err(),
            TextError::UnsupportedEncoding(_)
        ));
        handle.set_encoding(Some("latin-1")).unwrap();
        assert_eq!(handle.encoding().name(), "windows-1252");
        handle.set_encoding(None).unwrap();
        assert_eq!(handle.encoding(), TextEncoding::utf8());
    }

    #[test]
    fn test_set_encoding_invalidates_bom() {
        let mut handle = TextFile::new("x.txt");
        handle.bom = crate::bom::detect_bom(b"\xEF\xBB\xBFx");
        assert!(handle.has_bom());
        handle.set_encoding(Some("utf-8")).unwrap();
        assert!(!handle.has_bom());
    }

    #[test]
    fn test_forced_encoding_skips_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("declared.txt");
        std::fs::write(&path, "# coding: latin-1\nplain\n").unwrap();

        let mut handle = TextFile::new(&path);
        handle.set_encoding(Some("utf-8")).unwrap();
        handle
            .detect_encoding(&EncodingCatalog::from_environment())
            .unwrap();
        // The declaration was never consulted.
        assert!(handle.magic_comment().is_none());
        assert_eq!(handle.encoding(), TextEncoding::utf8());
    }

    #[test]
    fn test_failing_callback_removed_after_full_pass() {
        let mut handle = TextFile::new("x.txt");
        let hits = Arc::new(AtomicUsize::new(0));

        let first = hits.clone();
        handle.add_modified_callback(move || {
            first.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        handle.add_modified_callback(|| Err("broken".to_string()));
        let third = hits.clone();
        handle.add_modified_callback(move || {
            third.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        handle.notify_modified();
        // Both healthy callbacks ran despite the failure in between.
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        handle.notify_modified();
        // The broken one is gone; the healthy two fire again.
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_remove_modified_callback_by_token() {
        let mut handle = TextFile::new("x.txt");
        let id = handle.add_modified_callback(|| Ok(()));
        assert!(handle.remove_modified_callback(id));
        assert!(!handle.remove_modified_callback(id));
    }

    #[test]
    fn test_duplicate_copies_state_not_callbacks() {
        let mut handle = TextFile::new("x.txt");
        handle.set_encoding(Some("latin-1")).unwrap();
        handle.magic.comment = Some(TextEncoding::utf8());
        handle.set_last_error("boom");
        handle.add_modified_callback(|| Ok(()));

        let copy = handle.duplicate();
        assert_eq!(copy.encoding().name(), "windows-1252");
        assert_eq!(copy.magic_comment(), Some(TextEncoding::utf8()));
        assert_eq!(copy.last_error(), Some("boom"));
        assert_eq!(copy.callbacks.len(), 0);
        assert!(!copy.is_raw_bytes());
    }

    #[test]
    fn test_reset_all() {
        let mut handle = TextFile::new("x.txt");
        handle.set_encoding(Some("latin-1")).unwrap();
        handle.magic.bad = true;
        handle.raw = true;
        handle.fuzzy_encoding = true;
        handle.set_last_error("boom");

        handle.reset_all();
        assert_eq!(handle.encoding(), TextEncoding::utf8());
        assert!(!handle.magic.bad);
        assert!(!handle.is_raw_bytes());
        assert!(!handle.is_fuzzy_encoding());
        assert!(handle.last_error().is_none());
    }
}
