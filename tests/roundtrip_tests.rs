//! Write-trial and round-trip behavior.

mod common;

use common::fixture;
use proptest::prelude::*;
use textio::{TextEncoding, TextFile};

#[test]
fn magic_comment_respected_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("declared.txt");
    let text = "# -*- coding: latin-1 -*-\ncafé";

    let mut handle = TextFile::new(&path);
    handle.set_encoding(None).unwrap();
    handle.write(text).unwrap();

    // The declaration led the trial, so the bytes on disk are Latin-1.
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.contains(&0xE9));
    assert_eq!(handle.encoding().name(), "windows-1252");

    let mut reread = TextFile::open(&path).unwrap();
    assert_eq!(reread.read().unwrap(), text);
}

#[test]
fn write_trial_switches_to_capable_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("multi.txt");
    let text = "日本語テキスト mixed with ascii\n";

    let mut handle = TextFile::new(&path);
    handle.set_encoding(Some("latin-1")).unwrap();
    handle.write(text).unwrap();

    // Latin-1 cannot represent the text; the trial moved on.
    assert_eq!(handle.encoding().name(), "utf-8");

    let mut reread = TextFile::open(&path).unwrap();
    assert_eq!(reread.read().unwrap(), text);
}

#[test]
fn bom_reattached_on_write() {
    let (_dir, path) = fixture(b"\xEF\xBB\xBForiginal");
    let mut handle = TextFile::open(&path).unwrap();
    handle.read().unwrap();
    assert!(handle.has_bom());

    handle.write("rewritten").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes, b"\xEF\xBB\xBFrewritten");

    let mut reread = TextFile::open(&path).unwrap();
    assert_eq!(reread.read().unwrap(), "rewritten");
    assert!(reread.has_bom());
}

#[test]
fn utf16_file_round_trips_through_write() {
    let mut content = b"\xFF\xFE".to_vec();
    content.extend(TextEncoding::Utf16Le.encode_strict("wide text").unwrap());
    let (_dir, path) = fixture(&content);

    let mut handle = TextFile::open(&path).unwrap();
    assert_eq!(handle.read().unwrap(), "wide text");
    assert_eq!(handle.encoding().name(), "utf-16-le");

    handle.write("wider text é").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"\xFF\xFE"));

    let mut reread = TextFile::open(&path).unwrap();
    assert_eq!(reread.read().unwrap(), "wider text é");
    assert_eq!(reread.encoding().name(), "utf-16-le");
}

#[test]
fn write_notifies_modified_callbacks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("observed.txt");
    let hits = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handle = TextFile::new(&path);
    let counter = hits.clone();
    handle.add_modified_callback(move || {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    });

    handle.write("content").unwrap();
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn write_to_unopenable_destination_fails_before_bytes() {
    let dir = tempfile::tempdir().unwrap();
    // The directory itself cannot be created as a file.
    let mut handle = TextFile::new(dir.path());
    assert!(matches!(
        handle.write("text"),
        Err(textio::TextError::Write(_))
    ));
}

#[test]
fn large_text_round_trips_in_chunks() {
    // Spans several 4096-character encode chunks, with multi-byte
    // characters placed to land on chunk boundaries.
    let text: String = "abcdé".repeat(3000);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.txt");

    let mut handle = TextFile::new(&path);
    handle.write(&text).unwrap();

    let mut reread = TextFile::open(&path).unwrap();
    assert_eq!(reread.read().unwrap(), text);
}

proptest! {
    #[test]
    fn write_then_read_reproduces_text(text in "\\PC{0,200}") {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.txt");

        let mut handle = TextFile::new(&path);
        handle.write(&text).unwrap();

        let mut reread = TextFile::open(&path).unwrap();
        prop_assert_eq!(reread.read().unwrap(), text);
    }
}
