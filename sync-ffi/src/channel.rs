//! Per-thread call results.
//!
//! C callers cannot receive a status code and a string from one call, so
//! every entry point returns the status and parks its payload (or error
//! message) here. The caller fetches it with `chainsync_get_result` /
//! `chainsync_get_last_error` on the same thread, right after the call.
//! Reads do not clear the slots.

use std::cell::RefCell;

thread_local! {
    static LAST_RESULT: RefCell<Option<String>> = const { RefCell::new(None) };
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Store the payload of a successful call.
pub fn set_result(value: impl Into<String>) {
    LAST_RESULT.with(|cell| *cell.borrow_mut() = Some(value.into()));
}

/// Store the message of a failed call.
pub fn set_error(message: impl Into<String>) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(message.into()));
}

/// Last payload stored on this thread.
pub fn result() -> Option<String> {
    LAST_RESULT.with(|cell| cell.borrow().clone())
}

/// Last error stored on this thread.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}
