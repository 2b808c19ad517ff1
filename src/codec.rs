//! Buffer codec: the decode state machine and the write-trial encoder.
//!
//! Decoding never fails from the caller's point of view. Every failure
//! mode degrades to a NUL-joined raw representation of the original bytes
//! with the `binary` placeholder recorded as the encoding, and the cause
//! lands in the handle's last-error field.

use crate::catalog::EncodingCatalog;
use crate::encoding::TextEncoding;
use crate::error::{Result, TextError};
use crate::file::TextFile;
use crate::guess;
use log::{debug, warn};

/// Maximum characters per encode chunk on the write path.
pub(crate) const ENCODE_CHUNK_CHARS: usize = 4096;

impl TextFile {
    /// Decode accumulated raw bytes with the resolved encoding.
    ///
    /// The steps, in order: content classified as binary under a fuzzy
    /// encoding skips straight to the raw fallback; a recorded BOM is
    /// stripped once; the resolved encoding decodes strictly; NUL
    /// characters in the result trigger a UTF-16/UTF-32 re-detection of
    /// the same bytes (a wide encoding mis-detected as a narrow one);
    /// decode failure falls back to the NUL-joined raw representation and
    /// marks a trusted magic comment as bad. Any NUL surviving all of the
    /// above forces the raw representation too.
    pub(crate) fn decode_text(&mut self, bytes: &[u8]) -> String {
        let encoding = self.encoding();
        let mut decoded = None;

        if self.fuzzy_encoding && guess::is_binary_sample(bytes) {
            debug!("decode: binary bytes were read");
        } else {
            let mut payload = bytes;
            if let Some(mark) = self.bom {
                if payload.starts_with(mark.as_bytes()) {
                    debug!("decode: stripping {} BOM from text", mark.encoding());
                    payload = &payload[mark.len()..];
                }
            }
            debug!("decode: attempting to decode with {encoding}");
            match encoding.decode_strict(payload) {
                Ok(mut text) => {
                    if text.contains('\0') {
                        // NULs out of a narrow decode usually mean the
                        // bytes were really a wide encoding.
                        debug!("decode: NUL in decoded text, attempting UTF-16/32 detection");
                        for wide in [TextEncoding::Utf16Le, TextEncoding::Utf32Le] {
                            if let Ok(retried) = wide.decode_strict(payload) {
                                debug!("decode: {wide} detected");
                                self.encoding = Some(wide);
                                text = retried;
                                break;
                            }
                        }
                    }
                    decoded = Some(text);
                },
                Err(err) => {
                    debug!("decode: error while reading with {encoding}: {err}");
                    self.set_last_error(err.to_string());
                },
            }
        }

        let mut result = match decoded {
            Some(text) => text,
            None => self.handle_raw_bytes(bytes),
        };

        if !self.raw && result.contains('\0') {
            debug!("decode: joining NUL terminators");
            result = raw_join(bytes);
            self.raw = true;
        }

        if self.raw {
            // \x05 is known to corrupt the text widget when inserted.
            result = result.replace('\u{5}', " ");
            self.encoding = Some(TextEncoding::Binary);
        }
        result
    }

    /// Prep raw bytes for return to the buffer. A trusted magic comment
    /// evidently lied about the content.
    fn handle_raw_bytes(&mut self, bytes: &[u8]) -> String {
        debug!("decode: keeping raw bytes");
        if self.magic.comment.is_some() {
            self.magic.bad = true;
        }
        self.raw = true;
        raw_join(bytes)
    }

    /// Trial run of encoding all the text, to settle on an encoding that
    /// can represent it before anything is written to disk.
    ///
    /// The resolved encoding leads, followed by the catalog. Each
    /// candidate must encode every chunk of the text; the first one that
    /// does is adopted as the file's encoding, which may differ from the
    /// prior value (logged, not an error).
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Write`] when no candidate in the entire list
    /// succeeds.
    pub(crate) fn run_encode_trial(
        &mut self,
        text: &str,
        catalog: &EncodingCatalog,
    ) -> Result<TextEncoding> {
        let current = self.encoding();
        let mut candidates = Vec::with_capacity(catalog.len() + 1);
        candidates.push(current);
        candidates.extend(catalog.iter().copied());

        for candidate in candidates {
            match try_encode_all(candidate, text) {
                Ok(()) => {
                    if candidate != current {
                        warn!("encode trial: using {candidate} instead of {current}");
                    }
                    self.encoding = Some(candidate);
                    self.clear_last_error();
                    return Ok(candidate);
                },
                Err(err) => {
                    debug!("encode trial: {candidate} failed: {err}");
                    self.set_last_error(err.to_string());
                },
            }
        }
        Err(TextError::Write(
            "failed to encode text with any candidate encoding".to_string(),
        ))
    }
}

fn try_encode_all(encoding: TextEncoding, text: &str) -> Result<()> {
    for chunk in char_chunks(text, ENCODE_CHUNK_CHARS) {
        encoding.encode_strict(chunk)?;
    }
    Ok(())
}

/// NUL-delimited pass-through of the original bytes: every byte as a
/// character followed by a NUL, matching `b"ab"` to `"a\0b\0"`.
pub(crate) fn raw_join(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "\0".to_string();
    }
    let mut joined = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        joined.push(char::from(byte));
        joined.push('\0');
    }
    joined
}

/// Split text into successive chunks of at most `size` characters, always
/// on a character boundary.
pub(crate) fn char_chunks(text: &str, size: usize) -> impl Iterator<Item = &str> {
    debug_assert!(size > 0);
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let split = rest
            .char_indices()
            .nth(size)
            .map_or(rest.len(), |(index, _)| index);
        let (chunk, tail) = rest.split_at(split);
        rest = tail;
        Some(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> TextFile {
        TextFile::new("buffer.txt")
    }

    #[test]
    fn test_decode_strips_recorded_bom() {
        let mut file = handle();
        file.bom = crate::bom::detect_bom(b"\xEF\xBB\xBFhello");
        file.encoding = Some(TextEncoding::utf8());
        let text = file.decode_text(b"\xEF\xBB\xBFhello");
        assert_eq!(text, "hello");
        assert!(!file.is_raw_bytes());
    }

    #[test]
    fn test_decode_nul_triggers_wide_redetection() {
        let mut file = handle();
        file.encoding = Some(TextEncoding::for_label("latin-1").unwrap());
        let bytes = TextEncoding::Utf16Le.encode_strict("hello").unwrap();
        let text = file.decode_text(&bytes);
        assert_eq!(text, "hello");
        assert!(!text.contains('\0'));
        assert_eq!(file.encoding(), TextEncoding::Utf16Le);
        assert!(!file.is_raw_bytes());
        assert!(file.last_error().is_none());
    }

    #[test]
    fn test_decode_surviving_nul_forces_raw_join() {
        let mut file = handle();
        file.encoding = Some(TextEncoding::for_label("latin-1").unwrap());
        // Odd length defeats both wide retries; the NUL survives.
        let bytes = b"a\x00b";
        let text = file.decode_text(bytes);
        assert_eq!(text, "a\0\0\0b\0");
        assert!(file.is_raw_bytes());
        assert_eq!(file.encoding(), TextEncoding::Binary);
    }

    #[test]
    fn test_decode_failure_degrades_and_marks_magic_bad() {
        let mut file = handle();
        file.encoding = Some(TextEncoding::utf8());
        file.magic.comment = Some(TextEncoding::utf8());
        let text = file.decode_text(b"ok\xFF");
        assert_eq!(text, "o\0k\0\u{ff}\0");
        assert!(file.is_raw_bytes());
        assert!(file.magic.bad);
        assert!(file.last_error().is_some());
        assert_eq!(file.encoding(), TextEncoding::Binary);
    }

    #[test]
    fn test_raw_path_scrubs_enquiry_control() {
        let mut file = handle();
        file.encoding = Some(TextEncoding::utf8());
        let text = file.decode_text(b"\xFF\x05");
        assert!(!text.contains('\u{5}'));
        assert!(text.contains(' '));
    }

    #[test]
    fn test_fuzzy_binary_sample_skips_decode() {
        let mut file = handle();
        file.encoding = Some(TextEncoding::utf8());
        file.fuzzy_encoding = true;
        // Valid UTF-8, but NUL-riddled: classified binary under fuzzy.
        let text = file.decode_text(b"a\x00b\x00");
        assert!(file.is_raw_bytes());
        assert_eq!(text, "a\0\0\0b\0\0\0");
    }

    #[test]
    fn test_encode_trial_keeps_capable_current() {
        let mut file = handle();
        file.encoding = Some(TextEncoding::for_label("latin-1").unwrap());
        let catalog = EncodingCatalog::from_environment();
        let chosen = file.run_encode_trial("café", &catalog).unwrap();
        assert_eq!(chosen.name(), "windows-1252");
        assert!(file.last_error().is_none());
    }

    #[test]
    fn test_encode_trial_switches_encoding() {
        let mut file = handle();
        file.encoding = Some(TextEncoding::for_label("latin-1").unwrap());
        let catalog = EncodingCatalog::from_environment();
        let chosen = file.run_encode_trial("日本語テキスト", &catalog).unwrap();
        assert_eq!(chosen.name(), "utf-8");
        assert_eq!(file.encoding(), chosen);
    }

    #[test]
    fn test_encode_trial_empty_text() {
        let mut file = handle();
        let catalog = EncodingCatalog::from_environment();
        assert!(file.run_encode_trial("", &catalog).is_ok());
    }

    #[test]
    fn test_raw_join() {
        assert_eq!(raw_join(b"ab"), "a\0b\0");
        assert_eq!(raw_join(b""), "\0");
        assert_eq!(raw_join(&[0xFF]), "\u{ff}\0");
    }

    #[test]
    fn test_char_chunks_respect_boundaries() {
        let text = "ééééé";
        let chunks: Vec<&str> = char_chunks(text, 2).collect();
        assert_eq!(chunks, ["éé", "éé", "é"]);
        assert_eq!(char_chunks("", 4).count(), 0);
    }
}
