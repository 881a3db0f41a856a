use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use dvcprims_channel::ChannelError;

use crate::types::DvcResult;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::default();
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let sanitized = message.into().replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized).unwrap_or_default();
    });
}

pub(crate) fn set_invalid_argument(message: impl Into<String>) -> DvcResult {
    set_error_message(message);
    DvcResult::InvalidArgument
}

pub(crate) fn set_internal(message: impl Into<String>) -> DvcResult {
    set_error_message(message);
    DvcResult::Internal
}

pub(crate) fn set_panic_error() {
    set_error_message("panic across FFI boundary");
}

pub(crate) fn map_channel_error(err: &ChannelError) -> DvcResult {
    set_error_message(err.to_string());
    match err {
        ChannelError::ProtocolViolation(_) => DvcResult::ProtocolViolation,
        ChannelError::Disconnected | ChannelError::Disposed => DvcResult::Disconnected,
        ChannelError::Unavailable { .. } => DvcResult::Unavailable,
        ChannelError::InvalidName { .. } => DvcResult::InvalidName,
        ChannelError::Cancelled => DvcResult::Cancelled,
        ChannelError::MessageTooLarge { .. } => DvcResult::MessageTooLarge,
        ChannelError::Transport(_) | ChannelError::Io(_) => DvcResult::Io,
    }
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}
