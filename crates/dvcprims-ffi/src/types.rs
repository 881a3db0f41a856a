use std::ffi::c_void;
use std::sync::Arc;

use dvcprims_channel::CallbackChannel;
use tokio::runtime::Runtime;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DvcResult {
    Ok = 0,
    InvalidArgument = 1,
    ProtocolViolation = 2,
    Disconnected = 3,
    Unavailable = 4,
    InvalidName = 5,
    Cancelled = 6,
    Timeout = 7,
    MessageTooLarge = 8,
    Io = 9,
    Internal = 99,
}

#[allow(dead_code)]
pub const DVC_OK: DvcResult = DvcResult::Ok;
#[allow(dead_code)]
pub const DVC_ERR_INVALID_ARGUMENT: DvcResult = DvcResult::InvalidArgument;
#[allow(dead_code)]
pub const DVC_ERR_PROTOCOL_VIOLATION: DvcResult = DvcResult::ProtocolViolation;
#[allow(dead_code)]
pub const DVC_ERR_DISCONNECTED: DvcResult = DvcResult::Disconnected;
#[allow(dead_code)]
pub const DVC_ERR_UNAVAILABLE: DvcResult = DvcResult::Unavailable;
#[allow(dead_code)]
pub const DVC_ERR_INVALID_NAME: DvcResult = DvcResult::InvalidName;
#[allow(dead_code)]
pub const DVC_ERR_CANCELLED: DvcResult = DvcResult::Cancelled;
#[allow(dead_code)]
pub const DVC_ERR_TIMEOUT: DvcResult = DvcResult::Timeout;
#[allow(dead_code)]
pub const DVC_ERR_MESSAGE_TOO_LARGE: DvcResult = DvcResult::MessageTooLarge;
#[allow(dead_code)]
pub const DVC_ERR_IO: DvcResult = DvcResult::Io;
#[allow(dead_code)]
pub const DVC_ERR_INTERNAL: DvcResult = DvcResult::Internal;

/// Channel states reported by `dvc_channel_state`.
#[allow(dead_code)]
pub const DVC_STATE_OPEN: i32 = 0;
#[allow(dead_code)]
pub const DVC_STATE_REMOTE_CLOSED: i32 = 1;
#[allow(dead_code)]
pub const DVC_STATE_LOCALLY_CLOSED: i32 = 2;

/// Native write primitive. Receives one complete frame; returns 0 on success,
/// `DVC_ERR_DISCONNECTED` if the peer is gone, any other value on failure.
pub type DvcWriteFn = extern "C" fn(user_data: *mut c_void, data: *const u8, len: usize) -> i32;

/// Native close primitive. Called at most once per channel.
pub type DvcCloseFn = extern "C" fn(user_data: *mut c_void);

/// Outbound half of a native channel, supplied by the host.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DvcNativeCallbacks {
    pub user_data: *mut c_void,
    pub write: Option<DvcWriteFn>,
    pub close: Option<DvcCloseFn>,
}

#[repr(C)]
#[derive(Debug)]
pub struct DvcMessage {
    pub data: *mut u8,
    pub len: usize,
}

impl Default for DvcMessage {
    fn default() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
        }
    }
}

pub type DvcChannelHandle = *mut c_void;

pub(crate) struct ChannelHandle {
    pub(crate) channel: Arc<CallbackChannel>,
    pub(crate) runtime: Runtime,
}
