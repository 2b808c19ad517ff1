#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # Modules
//!
//! - [`file`] — `TextFile` handles: detection orchestration, read, write
//! - [`encoding`] — validated `TextEncoding` type and strict codecs
//! - [`catalog`] — ordered candidate encodings from locale defaults
//! - [`bom`] — byte-order-mark detection
//! - [`magic`] — magic-comment encoding declarations
//! - [`guess`] — brute-force guessing and binary classification
//! - [`read_task`] — asynchronous chunked reading with progress events
//! - [`error`] — error types and result type

pub mod bom;
pub mod catalog;
mod codec;
pub mod encoding;
pub mod error;
pub mod file;
pub mod guess;
pub mod magic;
pub mod read_task;

pub use bom::{detect_bom, Bom};
pub use catalog::EncodingCatalog;
pub use encoding::{decode_string, encode_string, StreamDecoder, TextEncoding};
pub use error::{Result, TextError};
pub use file::{CallbackId, ModifiedCallback, TextFile, DEFAULT_READ_CHUNK};
pub use guess::{guess_encoding, is_binary_sample, GUESS_SAMPLE_SIZE};
pub use magic::{scan_magic_comment, scan_text};
pub use read_task::{ChunkedReadTask, ReadEvent, ReadState, ASYNC_READ_CHUNK};
