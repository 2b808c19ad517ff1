//! Ordered candidate encodings derived from locale defaults.
//!
//! The catalog is an explicit value passed into detection and the write
//! trial; there is no process-wide mutable list. The only global is the
//! default encoding constant (UTF-8, [`TextEncoding::default`]).

use crate::encoding::TextEncoding;
use log::debug;
use std::env;

/// Ordered list of candidate encodings for guessing and write trials.
///
/// Priority order: an explicitly preferred encoding (if any), the locale
/// preferred encoding, UTF-8, the locale-reported codeset, the filesystem
/// encoding, UTF-16, UTF-16 LE, Latin-1. Duplicates are removed by
/// canonical codec name, and any name normalizing to ASCII is excluded:
/// ASCII is redundant with the UTF-8/Latin-1 coverage and prone to false
/// positives when probing.
#[derive(Debug, Clone)]
pub struct EncodingCatalog {
    candidates: Vec<TextEncoding>,
}

impl EncodingCatalog {
    /// Build the catalog from the process environment.
    #[must_use]
    pub fn from_environment() -> Self {
        Self::with_preferred(None)
    }

    /// Build the catalog with an explicitly preferred encoding in front.
    #[must_use]
    pub fn with_preferred(preferred: Option<TextEncoding>) -> Self {
        let locale = locale_codeset();
        Self::from_labels(preferred, &[locale.as_deref(), locale.as_deref()])
    }

    /// Assemble candidates from locale-derived labels. The two slots are
    /// the locale-reported codeset and the filesystem encoding; on Unix
    /// both resolve through the same environment probe and collapse in
    /// deduplication.
    fn from_labels(preferred: Option<TextEncoding>, locale_labels: &[Option<&str>]) -> Self {
        let mut candidates: Vec<TextEncoding> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        if let Some(encoding) = preferred {
            push_unique(&mut candidates, &mut seen, encoding);
        }
        if let Some(label) = locale_labels.first().copied().flatten() {
            push_label(&mut candidates, &mut seen, label);
        }
        push_label(&mut candidates, &mut seen, "utf-8");
        for label in locale_labels.iter().skip(1).copied().flatten() {
            push_label(&mut candidates, &mut seen, label);
        }
        for label in ["utf-16", "utf-16-le", "latin-1"] {
            push_label(&mut candidates, &mut seen, label);
        }

        EncodingCatalog { candidates }
    }

    /// Iterate candidates in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &TextEncoding> {
        self.candidates.iter()
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the catalog is empty (never the case for built catalogs).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn push_label(candidates: &mut Vec<TextEncoding>, seen: &mut Vec<String>, label: &str) {
    // Ascii is useless so ignore it (ascii, us-ascii, ...).
    if label.to_ascii_lowercase().contains("ascii") {
        return;
    }
    match TextEncoding::for_label(label) {
        Ok(encoding) => push_unique(candidates, seen, encoding),
        Err(err) => debug!("skipping catalog label {label}: {err}"),
    }
}

fn push_unique(candidates: &mut Vec<TextEncoding>, seen: &mut Vec<String>, encoding: TextEncoding) {
    let name = encoding.name();
    if !seen.contains(&name) {
        seen.push(name);
        candidates.push(encoding);
    }
}

/// Codeset of the active locale, from `LC_ALL`, `LC_CTYPE` or `LANG`
/// (e.g. `en_US.UTF-8` yields `UTF-8`).
fn locale_codeset() -> Option<String> {
    for var in ["LC_ALL", "LC_CTYPE", "LANG"] {
        if let Ok(value) = env::var(var) {
            if !value.is_empty() {
                return codeset_of(&value);
            }
        }
    }
    None
}

/// Extract the codeset portion of a locale string, ignoring any modifier
/// (`en_US.UTF-8@euro` yields `UTF-8`).
fn codeset_of(locale: &str) -> Option<String> {
    let codeset = locale.split('.').nth(1)?;
    let codeset = codeset.split('@').next().unwrap_or(codeset);
    if codeset.is_empty() {
        None
    } else {
        Some(codeset.to_string())
    }
}
