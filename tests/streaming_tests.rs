//! Asynchronous chunked read behavior through the handle API.

mod common;

use common::fixture;
use textio::{ReadState, TextFile, ASYNC_READ_CHUNK};

#[test]
fn read_async_streams_whole_file_in_order() {
    let content = "line of text\n".repeat(5_000);
    let (_dir, path) = fixture(content.as_bytes());

    let mut handle = TextFile::open(&path).unwrap();
    let events = handle.read_async(ASYNC_READ_CHUNK).unwrap();
    assert!(handle.active_job().is_some());

    let mut states = Vec::new();
    let mut text = String::new();
    let mut last_progress = 0;
    for event in &events {
        assert!(event.progress >= last_progress, "progress went backwards");
        last_progress = event.progress;
        if let Some(chunk) = &event.text {
            text.push_str(chunk);
        }
        let terminal = event.state.is_terminal();
        states.push(event.state);
        if terminal {
            break;
        }
    }

    assert_eq!(states.first(), Some(&ReadState::Start));
    assert_eq!(states.last(), Some(&ReadState::End));
    assert_eq!(text, content);
    assert_eq!(last_progress, content.len() as u64);

    let task = handle.take_job().unwrap();
    let worker_state = task.join().unwrap();
    assert_eq!(worker_state.encoding().name(), "utf-8");
}

#[test]
fn cancellation_is_cooperative_with_single_terminal() {
    // Large enough that cancellation after the first chunk lands well
    // before the end of the stream.
    let content = vec![b'z'; 500_000];
    let (_dir, path) = fixture(&content);

    let mut handle = TextFile::open(&path).unwrap();
    let events = handle.read_async(ASYNC_READ_CHUNK).unwrap();

    assert_eq!(events.recv().unwrap().state, ReadState::Start);
    let first = events.recv().unwrap();
    assert_eq!(first.state, ReadState::Reading);

    handle.cancel_read();
    assert!(handle.active_job().unwrap().is_cancelled());

    let mut readings_after_cancel = 0;
    let mut terminals = 0;
    for event in &events {
        match event.state {
            ReadState::Reading => readings_after_cancel += 1,
            state if state.is_terminal() => {
                terminals += 1;
                assert_eq!(state, ReadState::Aborted);
                break;
            },
            _ => {},
        }
    }
    assert_eq!(terminals, 1);
    // The terminal event is the last message for the task.
    assert!(events.recv().is_err());
    // At most one chunk was already past its cancellation check.
    assert!(readings_after_cancel <= 1);

    handle.take_job().unwrap().join().unwrap();
}

#[test]
fn mid_stream_decode_error_ends_stream_with_recorded_cause() {
    let mut content = "clean text ".repeat(2_000).into_bytes();
    content.push(0xC3); // truncated multi-byte sequence at EOF
    let (_dir, path) = fixture(&content);

    let mut handle = TextFile::open(&path).unwrap();
    handle.set_encoding(Some("utf-8")).unwrap();
    let events = handle.read_async(512).unwrap();

    let mut terminal = None;
    for event in &events {
        if event.state.is_terminal() {
            terminal = Some(event.state);
            break;
        }
    }
    assert_eq!(terminal, Some(ReadState::End));

    let worker_state = handle.take_job().unwrap().join().unwrap();
    assert!(worker_state.last_error().is_some());
}

#[test]
fn tasks_are_not_restartable_but_handles_are() {
    let (_dir, path) = fixture(b"short content");
    let mut handle = TextFile::open(&path).unwrap();

    for _ in 0..2 {
        let events = handle.read_async(ASYNC_READ_CHUNK).unwrap();
        let mut text = String::new();
        for event in &events {
            if let Some(chunk) = &event.text {
                text.push_str(chunk);
            }
            if event.state.is_terminal() {
                break;
            }
        }
        assert_eq!(text, "short content");
        handle.take_job().unwrap().join().unwrap();
    }
}
