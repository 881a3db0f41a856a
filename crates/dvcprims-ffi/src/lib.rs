//! dvcprims-ffi: C-ABI exports for dvcprims push channels.
//!
//! The host owns the native virtual channel. It creates a channel handle with
//! write/close callbacks, forwards every arriving frame with
//! `dvc_channel_on_data`, and reports remote close with `dvc_channel_on_close`.

mod channel;
mod error;
mod message;
mod transport;
mod types;

use std::panic::AssertUnwindSafe;

pub use channel::{
    dvc_channel_create, dvc_channel_dispose, dvc_channel_free, dvc_channel_on_close,
    dvc_channel_on_data, dvc_channel_read, dvc_channel_send, dvc_channel_state,
    dvc_validate_channel_name,
};
pub use message::dvc_message_free;
pub use types::{
    DvcChannelHandle, DvcCloseFn, DvcMessage, DvcNativeCallbacks, DvcResult, DvcWriteFn,
    DVC_ERR_CANCELLED, DVC_ERR_DISCONNECTED, DVC_ERR_INTERNAL, DVC_ERR_INVALID_ARGUMENT,
    DVC_ERR_INVALID_NAME, DVC_ERR_IO, DVC_ERR_MESSAGE_TOO_LARGE, DVC_ERR_PROTOCOL_VIOLATION,
    DVC_ERR_TIMEOUT, DVC_ERR_UNAVAILABLE, DVC_OK, DVC_STATE_LOCALLY_CLOSED, DVC_STATE_OPEN,
    DVC_STATE_REMOTE_CLOSED,
};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::set_panic_error();
            on_panic
        }
    }
}

#[no_mangle]
pub extern "C" fn dvc_init() -> DvcResult {
    ffi_boundary(DvcResult::Internal, || {
        error::clear_error_state();
        DvcResult::Ok
    })
}

#[no_mangle]
pub extern "C" fn dvc_cleanup() {
    ffi_boundary((), || {
        error::clear_error_state();
    });
}

#[no_mangle]
pub extern "C" fn dvc_last_error() -> *const std::os::raw::c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;

    #[test]
    fn init_and_cleanup_are_ok() {
        assert_eq!(dvc_init(), DvcResult::Ok);
        dvc_cleanup();
    }

    #[test]
    fn last_error_returns_non_null_pointer() {
        dvc_cleanup();
        let ptr = dvc_last_error();
        assert!(!ptr.is_null());

        // SAFETY: dvc_last_error returns a pointer to a thread-local CString.
        let text = unsafe { CStr::from_ptr(ptr).to_str().unwrap() };
        assert!(text.is_empty());
    }

    #[test]
    fn panics_are_contained() {
        let result = ffi_boundary(DvcResult::Internal, || panic!("boom"));
        assert_eq!(result, DvcResult::Internal);
        // SAFETY: dvc_last_error returns a pointer to a thread-local CString.
        let text = unsafe { CStr::from_ptr(dvc_last_error()).to_str().unwrap() };
        assert_eq!(text, "panic across FFI boundary");
    }
}
