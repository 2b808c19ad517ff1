//! Shared fixtures for integration tests.

use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// Write `content` to a fresh file in a fresh temp directory.
///
/// The directory guard must stay alive for the duration of the test.
pub fn fixture(content: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("fixture.txt");
    let mut file = std::fs::File::create(&path).expect("create fixture");
    file.write_all(content).expect("write fixture");
    (dir, path)
}
