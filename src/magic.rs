//! Magic-comment encoding declarations.
//!
//! Source files frequently carry an explicit declaration near the top,
//! e.g. `# -*- coding: utf-8 -*-` or `encoding=latin-1`. Only the first
//! two lines are consulted.

use crate::encoding::TextEncoding;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// The first capture group is the declared encoding name.
    static ref MAGIC_COMMENT: Regex =
        Regex::new(r#"coding[:=]\s*"*([-\w.]+)"*"#).expect("magic comment pattern");
}

/// How many leading lines are scanned for a declaration.
pub const MAGIC_SCAN_LINES: usize = 2;

/// Scan up to the first two lines of text for an encoding declaration.
///
/// A captured name that is not a registered encoding (or names the raw
/// `binary` placeholder) is discarded and scanning continues with the
/// remaining lines. Returns the first valid match.
#[must_use]
pub fn scan_magic_comment<'a, I>(lines: I) -> Option<TextEncoding>
where
    I: IntoIterator<Item = &'a str>,
{
    for line in lines.into_iter().take(MAGIC_SCAN_LINES) {
        if let Some(captures) = MAGIC_COMMENT.captures(line) {
            if let Ok(encoding) = TextEncoding::for_label(&captures[1]) {
                if !encoding.is_binary() {
                    return Some(encoding);
                }
            }
        }
    }
    None
}

/// Scan the first two lines of an in-memory text value, as done on the
/// write path where user edits may have added or changed a declaration.
#[must_use]
pub fn scan_text(text: &str) -> Option<TextEncoding> {
    scan_magic_comment(text.lines())
}

/// Scan the first two raw lines of a byte prefix read from disk.
///
/// The prefix is decoded lossily for scanning only; declarations are
/// ASCII in practice and survive any mangling of surrounding bytes.
#[must_use]
pub fn scan_bytes_prefix(prefix: &[u8]) -> Option<TextEncoding> {
    let text = String::from_utf8_lossy(prefix);
    scan_magic_comment(text.lines())
}
