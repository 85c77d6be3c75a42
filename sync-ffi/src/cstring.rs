//! Strings across the C boundary.
//!
//! Buffers handed to C are allocated here with [`CString::into_raw`] and
//! must come back through [`release_foreign`] (exported as
//! `chainsync_free_string`). Buffers C hands in are only ever borrowed.

use std::ffi::{c_char, CStr, CString};

/// Allocate a NUL-terminated copy of `value` owned by the caller.
///
/// Interior NUL bytes cannot be represented and are replaced with U+FFFD.
pub fn to_foreign(value: &str) -> *mut c_char {
    let owned = match CString::new(value) {
        Ok(owned) => owned,
        Err(err) => {
            let cleaned = String::from_utf8_lossy(&err.into_vec()).replace('\0', "\u{FFFD}");
            CString::new(cleaned).unwrap_or_default()
        }
    };
    owned.into_raw()
}

/// Free a buffer returned by [`to_foreign`]. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from [`to_foreign`] that has not
/// been released yet.
pub unsafe fn release_foreign(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Read a caller-owned C string without taking ownership.
///
/// Null and invalid UTF-8 both read as absent.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated buffer that stays valid
/// for the duration of the call.
pub unsafe fn from_foreign(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}
