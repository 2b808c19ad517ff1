//! Byte-order-mark detection and write-path sanitation.
//!
//! Detection order is significant and fixed: UTF-32 before UTF-16 before
//! UTF-8. The UTF-16 LE mark is a byte-prefix of the UTF-32 LE mark, so
//! checking UTF-16 first would misreport every UTF-32 LE file.

use crate::encoding::TextEncoding;

/// UTF-8 BOM bytes.
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
/// UTF-16 little-endian BOM bytes.
pub const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
/// UTF-16 big-endian BOM bytes.
pub const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];
/// UTF-32 little-endian BOM bytes.
pub const UTF32_LE_BOM: [u8; 4] = [0xFF, 0xFE, 0x00, 0x00];
/// UTF-32 big-endian BOM bytes.
pub const UTF32_BE_BOM: [u8; 4] = [0x00, 0x00, 0xFE, 0xFF];

/// A detected byte-order mark: the encoding it identifies plus the literal
/// byte sequence, needed later to strip it from content and reattach it on
/// write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bom {
    encoding: TextEncoding,
    bytes: &'static [u8],
}

impl Bom {
    /// The encoding this mark identifies.
    #[must_use]
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// The literal mark bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &'static [u8] {
        self.bytes
    }

    /// Length of the mark in bytes.
    #[must_use]
    #[allow(clippy::len_without_is_empty)] // a BOM is never empty
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Detect a byte-order mark at the start of `prefix` (the first raw bytes
/// of a file).
///
/// No side effects beyond reporting; the caller records whether a mark was
/// found and which literal sequence it was.
#[must_use]
pub fn detect_bom(prefix: &[u8]) -> Option<Bom> {
    if prefix.starts_with(&UTF32_LE_BOM) {
        return Some(Bom {
            encoding: TextEncoding::Utf32Le,
            bytes: &UTF32_LE_BOM,
        });
    }
    if prefix.starts_with(&UTF32_BE_BOM) {
        return Some(Bom {
            encoding: TextEncoding::Utf32Be,
            bytes: &UTF32_BE_BOM,
        });
    }
    if prefix.starts_with(&UTF16_LE_BOM) {
        return Some(Bom {
            encoding: TextEncoding::Utf16Le,
            bytes: &UTF16_LE_BOM,
        });
    }
    if prefix.starts_with(&UTF16_BE_BOM) {
        return Some(Bom {
            encoding: TextEncoding::Utf16Be,
            bytes: &UTF16_BE_BOM,
        });
    }
    if prefix.starts_with(&UTF8_BOM) {
        return Some(Bom {
            encoding: TextEncoding::utf8(),
            bytes: &UTF8_BOM,
        });
    }
    None
}

/// Strip a mark that a codec re-inserted at the front of an encoded chunk.
///
/// Mark placement on write is governed solely by the handle's recorded BOM
/// state, never by the codec, so anything a codec prepends is an artifact
/// to suppress. Checks UTF-8, then UTF-32, then UTF-16 (the UTF-16 LE mark
/// is a prefix of the UTF-32 LE one).
#[must_use]
pub(crate) fn strip_codec_bom(bytes: &[u8]) -> &[u8] {
    for mark in [
        &UTF8_BOM[..],
        &UTF32_LE_BOM[..],
        &UTF32_BE_BOM[..],
        &UTF16_LE_BOM[..],
        &UTF16_BE_BOM[..],
    ] {
        if bytes.starts_with(mark) {
            return &bytes[mark.len()..];
        }
    }
    bytes
}
