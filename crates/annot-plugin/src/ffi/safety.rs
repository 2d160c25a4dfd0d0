//! Conversions from raw descriptor memory into owned Rust values.
//!
//! Plugin descriptors are untrusted: every pointer may be null and every
//! string may be invalid UTF-8.

use std::ffi::{CStr, c_char};

/// Copies a C string into an owned `String`, replacing invalid UTF-8.
///
/// Returns an empty string for a null pointer.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub unsafe fn c_str_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Views `len` elements at `ptr` as a slice; null yields an empty slice.
///
/// # Safety
///
/// When non-null, `ptr` must point to `len` initialised elements that
/// outlive `'a`.
pub unsafe fn slice_or_empty<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(ptr, len) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_string_is_empty() {
        assert_eq!(unsafe { c_str_lossy(std::ptr::null()) }, "");
    }

    #[test]
    fn test_copies_string() {
        let s = c"Amplifier";
        assert_eq!(unsafe { c_str_lossy(s.as_ptr()) }, "Amplifier");
    }

    #[test]
    fn test_null_slice_is_empty() {
        let empty: &[i32] = unsafe { slice_or_empty(std::ptr::null(), 4) };
        assert!(empty.is_empty());
    }
}
