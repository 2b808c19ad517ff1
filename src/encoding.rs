//! Validated text encodings and strict codec operations.
//!
//! Narrow encodings (UTF-8, windows-1252, Shift_JIS, ...) are delegated to
//! `encoding_rs`. UTF-16 and UTF-32 get hand-rolled wide codecs:
//! `encoding_rs` has no UTF-32 support at all and its UTF-16 encoder emits
//! UTF-8, so neither direction can be delegated for the wide encodings.
//!
//! Encoding names are only constructed through [`TextEncoding::for_label`],
//! which fails with [`TextError::UnsupportedEncoding`] for unregistered
//! names, so an invalid name can never propagate into a decode call.

use crate::error::{Result, TextError};
use encoding_rs::{DecoderResult, Encoding};
use log::debug;
use std::fmt;

/// A registered character encoding, or the `binary` placeholder recorded
/// when a file's content could not be decoded as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// A narrow encoding handled by `encoding_rs`.
    Narrow(&'static Encoding),
    /// UTF-16, little endian code units.
    Utf16Le,
    /// UTF-16, big endian code units.
    Utf16Be,
    /// UTF-32, little endian code units.
    Utf32Le,
    /// UTF-32, big endian code units.
    Utf32Be,
    /// Placeholder for content that was kept as raw bytes.
    Binary,
}

impl Default for TextEncoding {
    /// The process-wide default encoding (UTF-8).
    fn default() -> Self {
        TextEncoding::utf8()
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl TextEncoding {
    /// UTF-8.
    #[must_use]
    pub fn utf8() -> Self {
        TextEncoding::Narrow(encoding_rs::UTF_8)
    }

    /// Look up an encoding by label.
    ///
    /// Labels are case-insensitive and underscores are treated as hyphens,
    /// so `utf_8`, `UTF-8` and `utf8` all resolve to the same encoding.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::UnsupportedEncoding`] if the label names no
    /// registered encoding.
    pub fn for_label(label: &str) -> Result<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "binary" => Ok(TextEncoding::Binary),
            "utf-16" | "utf-16le" | "utf-16-le" => Ok(TextEncoding::Utf16Le),
            "utf-16be" | "utf-16-be" => Ok(TextEncoding::Utf16Be),
            "utf-32" | "utf-32le" | "utf-32-le" => Ok(TextEncoding::Utf32Le),
            "utf-32be" | "utf-32-be" => Ok(TextEncoding::Utf32Be),
            // Not a WHATWG label, but ubiquitous as a locale/magic-comment
            // name; windows-1252 is its superset.
            "latin-1" => Ok(TextEncoding::Narrow(encoding_rs::WINDOWS_1252)),
            _ => Encoding::for_label(normalized.as_bytes())
                .map(Self::from_static)
                .ok_or_else(|| TextError::UnsupportedEncoding(label.to_string())),
        }
    }

    /// Wrap an `encoding_rs` encoding, rerouting the UTF-16 variants
    /// (reachable through labels like `ucs-2`) to the wide codecs.
    fn from_static(encoding: &'static Encoding) -> Self {
        if encoding == encoding_rs::UTF_16LE {
            TextEncoding::Utf16Le
        } else if encoding == encoding_rs::UTF_16BE {
            TextEncoding::Utf16Be
        } else {
            TextEncoding::Narrow(encoding)
        }
    }

    /// Canonical lower-case name of this encoding.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            TextEncoding::Narrow(encoding) => encoding.name().to_ascii_lowercase(),
            TextEncoding::Utf16Le => "utf-16-le".to_string(),
            TextEncoding::Utf16Be => "utf-16-be".to_string(),
            TextEncoding::Utf32Le => "utf-32-le".to_string(),
            TextEncoding::Utf32Be => "utf-32-be".to_string(),
            TextEncoding::Binary => "binary".to_string(),
        }
    }

    /// Whether this is the `binary` placeholder.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, TextEncoding::Binary)
    }

    /// Strictly decode `bytes` to a string.
    ///
    /// No replacement characters are ever produced: any malformed sequence
    /// fails the whole call. BOM bytes are not given special treatment;
    /// the caller strips a recorded BOM before decoding.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Encoding`] if the bytes are invalid for this
    /// encoding, or if this is the `binary` placeholder.
    pub fn decode_strict(&self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Narrow(encoding) => encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(std::borrow::Cow::into_owned)
                .ok_or_else(|| {
                    TextError::Encoding(format!("invalid {} byte sequence", self.name()))
                }),
            TextEncoding::Utf16Le => decode_utf16(bytes, false),
            TextEncoding::Utf16Be => decode_utf16(bytes, true),
            TextEncoding::Utf32Le => decode_utf32(bytes, false),
            TextEncoding::Utf32Be => decode_utf32(bytes, true),
            TextEncoding::Binary => Err(TextError::Encoding(
                "binary placeholder cannot decode text".to_string(),
            )),
        }
    }

    /// Strictly encode `text` to bytes.
    ///
    /// The wide encodings can represent any string. Narrow encodings fail
    /// on the first unmappable character instead of substituting numeric
    /// references the way lossy `encoding_rs` encoding would.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Encoding`] if a character cannot be
    /// represented, or if this is the `binary` placeholder.
    pub fn encode_strict(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            TextEncoding::Narrow(encoding) => {
                let (bytes, _, unmappable) = encoding.encode(text);
                if unmappable {
                    Err(TextError::Encoding(format!(
                        "unmappable character for {}",
                        self.name()
                    )))
                } else {
                    Ok(bytes.into_owned())
                }
            },
            TextEncoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            TextEncoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            TextEncoding::Utf32Le => Ok(text
                .chars()
                .flat_map(|c| u32::from(c).to_le_bytes())
                .collect()),
            TextEncoding::Utf32Be => Ok(text
                .chars()
                .flat_map(|c| u32::from(c).to_be_bytes())
                .collect()),
            TextEncoding::Binary => Err(TextError::Encoding(
                "binary placeholder cannot encode text".to_string(),
            )),
        }
    }
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(TextError::Encoding(
            "utf-16 input is not a whole number of code units".to_string(),
        ));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            if big_endian {
                u16::from_be_bytes(pair)
            } else {
                u16::from_le_bytes(pair)
            }
        })
        .collect();
    String::from_utf16(&units)
        .map_err(|_| TextError::Encoding("unpaired utf-16 surrogate".to_string()))
}

fn decode_utf32(bytes: &[u8], big_endian: bool) -> Result<String> {
    if bytes.len() % 4 != 0 {
        return Err(TextError::Encoding(
            "utf-32 input is not a whole number of code units".to_string(),
        ));
    }
    bytes
        .chunks_exact(4)
        .map(|quad| {
            let quad = [quad[0], quad[1], quad[2], quad[3]];
            let unit = if big_endian {
                u32::from_be_bytes(quad)
            } else {
                u32::from_le_bytes(quad)
            };
            char::from_u32(unit)
                .ok_or_else(|| TextError::Encoding(format!("invalid utf-32 code unit {unit:#x}")))
        })
        .collect()
}

/// Incremental strict decoder tolerating multi-byte units split across
/// chunk boundaries.
///
/// Used by the brute-force guesser (a sample may cut a sequence short) and
/// by the chunked read task. Call [`StreamDecoder::decode`] with
/// `last = true` on the final chunk so trailing incomplete units are
/// reported as errors instead of silently dropped.
pub struct StreamDecoder {
    kind: StreamDecoderKind,
    name: String,
}

enum StreamDecoderKind {
    Narrow(encoding_rs::Decoder),
    Wide {
        encoding: TextEncoding,
        carry: Vec<u8>,
    },
}

impl fmt::Debug for StreamDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("encoding", &self.name)
            .finish_non_exhaustive()
    }
}

impl StreamDecoder {
    /// Create a streaming decoder for the given encoding.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Encoding`] for the `binary` placeholder, which
    /// has no codec.
    pub fn new(encoding: TextEncoding) -> Result<Self> {
        let kind = match encoding {
            TextEncoding::Narrow(narrow) => {
                StreamDecoderKind::Narrow(narrow.new_decoder_without_bom_handling())
            },
            TextEncoding::Binary => {
                return Err(TextError::Encoding(
                    "binary placeholder cannot stream-decode".to_string(),
                ))
            },
            wide => StreamDecoderKind::Wide {
                encoding: wide,
                carry: Vec::new(),
            },
        };
        Ok(StreamDecoder {
            kind,
            name: encoding.name(),
        })
    }

    /// Decode the next chunk of input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Encoding`] on a malformed sequence, or on a
    /// trailing incomplete unit when `last` is true.
    pub fn decode(&mut self, input: &[u8], last: bool) -> Result<String> {
        match &mut self.kind {
            StreamDecoderKind::Narrow(decoder) => {
                let mut output = String::new();
                let needed = decoder
                    .max_utf8_buffer_length_without_replacement(input.len())
                    .ok_or_else(|| {
                        TextError::Encoding("decode output length overflow".to_string())
                    })?;
                output.reserve(needed);
                let (result, _) =
                    decoder.decode_to_string_without_replacement(input, &mut output, last);
                match result {
                    DecoderResult::InputEmpty => Ok(output),
                    DecoderResult::Malformed(..) => Err(TextError::Encoding(format!(
                        "invalid {} byte sequence",
                        self.name
                    ))),
                    DecoderResult::OutputFull => {
                        Err(TextError::Encoding("decode output overflow".to_string()))
                    },
                }
            },
            StreamDecoderKind::Wide { encoding, carry } => {
                carry.extend_from_slice(input);
                let unit = match encoding {
                    TextEncoding::Utf16Le | TextEncoding::Utf16Be => 2,
                    _ => 4,
                };
                let mut take = carry.len() - carry.len() % unit;
                // A chunk may end on a high surrogate whose pair arrives in
                // the next chunk; hold it back until then.
                if !last && unit == 2 && take >= 2 {
                    let tail = [carry[take - 2], carry[take - 1]];
                    let code = match encoding {
                        TextEncoding::Utf16Be => u16::from_be_bytes(tail),
                        _ => u16::from_le_bytes(tail),
                    };
                    if (0xD800..0xDC00).contains(&code) {
                        take -= 2;
                    }
                }
                let text = encoding.decode_strict(&carry[..take])?;
                carry.drain(..take);
                if last && !carry.is_empty() {
                    return Err(TextError::Encoding(format!(
                        "trailing incomplete {} unit",
                        self.name
                    )));
                }
                Ok(text)
            },
        }
    }
}

/// Decode bytes with the given encoding, or the process default when
/// `None`, falling back to a lossy pass-through of the input on failure
/// rather than erroring.
#[must_use]
pub fn decode_string(bytes: &[u8], encoding: Option<TextEncoding>) -> String {
    let encoding = encoding.unwrap_or_default();
    match encoding.decode_strict(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug!("decode_string with {encoding} failed: {err}");
            String::from_utf8_lossy(bytes).into_owned()
        },
    }
}

/// Encode text with the given encoding, or the process default when
/// `None`, falling back to the UTF-8 bytes of the input on failure.
#[must_use]
pub fn encode_string(text: &str, encoding: Option<TextEncoding>) -> Vec<u8> {
    let encoding = encoding.unwrap_or_default();
    match encoding.encode_strict(text) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("encode_string with {encoding} failed: {err}");
            text.as_bytes().to_vec()
        },
    }
}
