use std::ptr;

use crate::error;
use crate::types::{DvcMessage, DvcResult};

/// Copy `payload` into `out_msg`, freeing any payload it already holds.
pub(crate) fn write_message_out(out_msg: *mut DvcMessage, payload: &[u8]) -> DvcResult {
    if out_msg.is_null() {
        return error::set_invalid_argument("out_msg cannot be null");
    }

    // SAFETY: Pointer validity is guaranteed by the caller.
    let msg_ref = unsafe { &mut *out_msg };
    release_payload(msg_ref);

    let boxed: Box<[u8]> = payload.to_vec().into_boxed_slice();
    let len = boxed.len();
    msg_ref.data = if len == 0 {
        ptr::null_mut()
    } else {
        Box::into_raw(boxed) as *mut u8
    };
    msg_ref.len = len;

    DvcResult::Ok
}

fn release_payload(msg: &mut DvcMessage) {
    if !msg.data.is_null() {
        let slice_ptr = ptr::slice_from_raw_parts_mut(msg.data, msg.len);
        // SAFETY: Non-null payloads are only ever allocated by `write_message_out`.
        unsafe {
            drop(Box::from_raw(slice_ptr));
        }
    }
    *msg = DvcMessage::default();
}

/// Free payload memory held by a [`DvcMessage`] populated by `dvc_channel_read`.
///
/// # Safety
/// `msg` must be either null or a valid pointer to a `DvcMessage` created by caller code.
/// If `msg->data` is non-null, it must have originated from this library.
#[no_mangle]
pub unsafe extern "C" fn dvc_message_free(msg: *mut DvcMessage) {
    crate::ffi_boundary((), || {
        if msg.is_null() {
            return;
        }

        // SAFETY: Pointer validity is guaranteed by the caller.
        release_payload(unsafe { &mut *msg });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_message_out_populates_output() {
        let mut msg = DvcMessage::default();
        assert_eq!(write_message_out(&mut msg, b"abc"), DvcResult::Ok);
        assert_eq!(msg.len, 3);
        assert!(!msg.data.is_null());

        // SAFETY: `msg` was populated by `write_message_out`.
        unsafe { dvc_message_free(&mut msg) };
        assert!(msg.data.is_null());
        assert_eq!(msg.len, 0);
    }

    #[test]
    fn reusing_a_message_frees_the_previous_payload() {
        let mut msg = DvcMessage::default();
        assert_eq!(write_message_out(&mut msg, b"old"), DvcResult::Ok);
        assert_eq!(write_message_out(&mut msg, b"newer"), DvcResult::Ok);
        assert_eq!(msg.len, 5);
        // SAFETY: `data` points at `len` bytes allocated above.
        let bytes = unsafe { std::slice::from_raw_parts(msg.data, msg.len) };
        assert_eq!(bytes, b"newer");

        // SAFETY: `msg` was populated by `write_message_out`.
        unsafe { dvc_message_free(&mut msg) };
    }

    #[test]
    fn empty_payload_leaves_null_data() {
        let mut msg = DvcMessage::default();
        assert_eq!(write_message_out(&mut msg, b""), DvcResult::Ok);
        assert!(msg.data.is_null());
        assert_eq!(msg.len, 0);
    }

    #[test]
    fn null_output_is_rejected() {
        assert_eq!(
            write_message_out(ptr::null_mut(), b"x"),
            DvcResult::InvalidArgument
        );
        // SAFETY: Null is explicitly allowed.
        unsafe { dvc_message_free(ptr::null_mut()) };
    }
}
