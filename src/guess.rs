//! Brute-force encoding guessing and binary classification.

use crate::catalog::EncodingCatalog;
use crate::encoding::{StreamDecoder, TextEncoding};
use crate::error::Result;
use log::debug;
use memchr::memchr;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default number of bytes sampled from the front of a file.
pub const GUESS_SAMPLE_SIZE: usize = 4096;

/// Attempt to guess the encoding of the file at `path` by trial-decoding
/// a leading sample against the catalog.
///
/// Returns the first candidate that decodes the sample cleanly, or `None`
/// when every candidate fails or produces a NUL character. Callers treat
/// `None` as a low-confidence situation and substitute the process
/// default.
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened or read.
pub fn guess_encoding(
    path: &Path,
    sample_size: usize,
    catalog: &EncodingCatalog,
) -> Result<Option<TextEncoding>> {
    let sample = read_sample(path, sample_size)?;
    Ok(guess_from_sample(&sample, catalog))
}

/// Trial-decode an in-memory sample against the catalog.
///
/// A candidate is rejected if it cannot decode the sample or if the
/// decoded text contains a NUL character, a strong signal of wrong
/// multi-byte alignment or of binary content. The sample may end inside a
/// multi-byte sequence, so decoding is incremental and the cut tail is
/// tolerated.
#[must_use]
pub fn guess_from_sample(sample: &[u8], catalog: &EncodingCatalog) -> Option<TextEncoding> {
    for &candidate in catalog.iter() {
        let Ok(mut decoder) = StreamDecoder::new(candidate) else {
            continue;
        };
        match decoder.decode(sample, false) {
            Ok(text) if !text.contains('\0') => {
                debug!("brute force guess: {candidate}");
                return Some(candidate);
            },
            Ok(_) => debug!("rejecting {candidate}: NUL in decoded sample"),
            Err(err) => debug!("rejecting {candidate}: {err}"),
        }
    }
    None
}

/// Classify a byte sample as binary rather than text.
///
/// A NUL byte anywhere in the sample is the strong signal; otherwise the
/// sample counts as binary when more than a tenth of it is control bytes
/// outside the usual whitespace and escape set.
#[must_use]
pub fn is_binary_sample(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if memchr(0, sample).is_some() {
        return true;
    }
    let suspect = sample
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C | 0x1B))
        .count();
    suspect * 10 > sample.len()
}

/// Read up to `sample_size` bytes from the front of the file.
pub(crate) fn read_sample(path: &Path, sample_size: usize) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut sample = Vec::with_capacity(sample_size.min(64 * 1024));
    file.take(sample_size as u64).read_to_end(&mut sample)?;
    Ok(sample)
}
