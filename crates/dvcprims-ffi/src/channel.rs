use std::ffi::c_void;
use std::io;
use std::os::raw::c_char;
use std::sync::Arc;
use std::time::Duration;

use dvcprims_channel::{CallbackChannel, ChannelName, MessageChannel};
use dvcprims_transport::NativeChannel;
use tokio_util::sync::CancellationToken;

use crate::error;
use crate::message::write_message_out;
use crate::transport;
use crate::types::{
    ChannelHandle, DvcChannelHandle, DvcCloseFn, DvcMessage, DvcNativeCallbacks, DvcResult,
    DvcWriteFn,
};

/// Native handle backed by host callbacks.
struct HostNative {
    user_data: *mut c_void,
    write: DvcWriteFn,
    close: Option<DvcCloseFn>,
}

// SAFETY: `dvc_channel_create` requires the host callbacks and `user_data`
// to be usable from any thread.
unsafe impl Send for HostNative {}
// SAFETY: As above; the library never touches `user_data` itself.
unsafe impl Sync for HostNative {}

impl NativeChannel for HostNative {
    fn write(&self, frame: &[u8]) -> io::Result<()> {
        match (self.write)(self.user_data, frame.as_ptr(), frame.len()) {
            0 => Ok(()),
            code if code == DvcResult::Disconnected as i32 => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "native channel disconnected",
            )),
            code => Err(io::Error::other(format!(
                "native write failed with status {code}"
            ))),
        }
    }

    fn close(&self) {
        if let Some(close) = self.close {
            close(self.user_data);
        }
    }
}

fn with_channel<T>(handle: DvcChannelHandle, on_error: T, f: impl FnOnce(&ChannelHandle) -> T) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("channel handle cannot be null");
        return on_error;
    }

    // SAFETY: Pointer validity is guaranteed by the caller. Shared access only,
    // since receive callbacks and reads may run on different threads.
    let channel_handle = unsafe { &*(handle as *const ChannelHandle) };

    f(channel_handle)
}

/// Create a push channel named `name` over host-provided callbacks.
///
/// Returns null on failure; `dvc_last_error` describes why.
///
/// # Safety
/// `name` must be a non-null pointer to a valid UTF-8, NUL-terminated C string.
/// `callbacks` must be non-null and readable. The callbacks and their
/// `user_data` must stay valid until the close callback runs or the handle is
/// freed, and must tolerate being called from any thread.
#[no_mangle]
pub unsafe extern "C" fn dvc_channel_create(
    name: *const c_char,
    callbacks: *const DvcNativeCallbacks,
) -> DvcChannelHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        // SAFETY: Caller guarantees `name` is a valid C string.
        let name = match unsafe { transport::required_str_arg(name, "name") } {
            Some(v) => v,
            None => return std::ptr::null_mut(),
        };

        if callbacks.is_null() {
            let _ = error::set_invalid_argument("callbacks cannot be null");
            return std::ptr::null_mut();
        }
        // SAFETY: Pointer was checked for null above; the struct is `Copy`.
        let callbacks = unsafe { *callbacks };
        let write = match callbacks.write {
            Some(write) => write,
            None => {
                let _ = error::set_invalid_argument("callbacks.write cannot be null");
                return std::ptr::null_mut();
            }
        };

        let name = match ChannelName::new(name) {
            Ok(name) => name,
            Err(err) => {
                let _ = error::map_channel_error(&err);
                return std::ptr::null_mut();
            }
        };

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = error::set_internal(format!("failed to start runtime: {err}"));
                return std::ptr::null_mut();
            }
        };

        let native = HostNative {
            user_data: callbacks.user_data,
            write,
            close: callbacks.close,
        };
        let handle = ChannelHandle {
            channel: Arc::new(CallbackChannel::new(name.as_str(), Box::new(native))),
            runtime,
        };
        Box::into_raw(Box::new(handle)) as DvcChannelHandle
    })
}

/// Native receive callback: hand in one complete frame, header included.
///
/// A framing violation closes the channel; it is not reported here.
///
/// # Safety
/// `channel` must be a valid channel handle. If `len > 0`, `data` must be
/// readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dvc_channel_on_data(
    channel: DvcChannelHandle,
    data: *const u8,
    len: usize,
) -> DvcResult {
    crate::ffi_boundary(DvcResult::Internal, || {
        error::clear_error_state();

        // SAFETY: We validate pointer/length pairing in helper.
        let frame = match unsafe { transport::bytes_arg(data, len, "data") } {
            Some(v) => v,
            None => return DvcResult::InvalidArgument,
        };

        with_channel(channel, DvcResult::InvalidArgument, |handle| {
            handle.channel.on_data_received(frame);
            DvcResult::Ok
        })
    })
}

/// Native close callback. Safe to call more than once.
///
/// # Safety
/// `channel` must be a valid channel handle.
#[no_mangle]
pub unsafe extern "C" fn dvc_channel_on_close(channel: DvcChannelHandle) -> DvcResult {
    crate::ffi_boundary(DvcResult::Internal, || {
        error::clear_error_state();

        with_channel(channel, DvcResult::InvalidArgument, |handle| {
            handle.channel.on_close();
            DvcResult::Ok
        })
    })
}

/// Send one message, split into frames through the write callback.
///
/// # Safety
/// `channel` must be a valid channel handle. If `len > 0`, `data` must be
/// readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dvc_channel_send(
    channel: DvcChannelHandle,
    data: *const u8,
    len: usize,
) -> DvcResult {
    crate::ffi_boundary(DvcResult::Internal, || {
        error::clear_error_state();

        // SAFETY: We validate pointer/length pairing in helper.
        let payload = match unsafe { transport::bytes_arg(data, len, "data") } {
            Some(v) => v,
            None => return DvcResult::InvalidArgument,
        };

        with_channel(channel, DvcResult::InvalidArgument, |handle| {
            match handle.runtime.block_on(handle.channel.send_message(payload)) {
                Ok(()) => DvcResult::Ok,
                Err(err) => error::map_channel_error(&err),
            }
        })
    })
}

/// Block until the next message arrives.
///
/// `timeout_ms` of 0 waits indefinitely. On timeout the read is withdrawn and
/// no message is lost.
///
/// # Safety
/// `channel` must be a valid channel handle and `out_msg` must be a valid
/// writable pointer. If `out_msg->data` already contains a prior payload from
/// this library, it is freed first.
#[no_mangle]
pub unsafe extern "C" fn dvc_channel_read(
    channel: DvcChannelHandle,
    timeout_ms: u64,
    out_msg: *mut DvcMessage,
) -> DvcResult {
    crate::ffi_boundary(DvcResult::Internal, || {
        error::clear_error_state();

        if out_msg.is_null() {
            return error::set_invalid_argument("out_msg cannot be null");
        }

        with_channel(channel, DvcResult::InvalidArgument, |handle| {
            let outcome = handle.runtime.block_on(async {
                let cancel = CancellationToken::new();
                let read = handle.channel.read_message(&cancel);
                if timeout_ms == 0 {
                    Some(read.await)
                } else {
                    tokio::time::timeout(Duration::from_millis(timeout_ms), read)
                        .await
                        .ok()
                }
            });

            match outcome {
                Some(Ok(message)) => write_message_out(out_msg, &message),
                Some(Err(err)) => error::map_channel_error(&err),
                None => {
                    error::set_error_message(format!("no message within {timeout_ms} ms"));
                    DvcResult::Timeout
                }
            }
        })
    })
}

/// Current channel state: `DVC_STATE_OPEN`, `DVC_STATE_REMOTE_CLOSED` or
/// `DVC_STATE_LOCALLY_CLOSED`. Returns -1 for a null handle.
///
/// # Safety
/// `channel` must be null or a valid channel handle.
#[no_mangle]
pub unsafe extern "C" fn dvc_channel_state(channel: DvcChannelHandle) -> i32 {
    crate::ffi_boundary(-1, || {
        with_channel(channel, -1, |handle| handle.channel.state() as i32)
    })
}

/// Close the channel locally and release the native handle. Idempotent.
///
/// Reads blocked on other threads return `DVC_ERR_CANCELLED`.
///
/// # Safety
/// `channel` must be a valid channel handle.
#[no_mangle]
pub unsafe extern "C" fn dvc_channel_dispose(channel: DvcChannelHandle) -> DvcResult {
    crate::ffi_boundary(DvcResult::Internal, || {
        error::clear_error_state();

        with_channel(channel, DvcResult::InvalidArgument, |handle| {
            handle.channel.dispose();
            DvcResult::Ok
        })
    })
}

/// Free a channel handle, disposing the channel if still open.
///
/// # Safety
/// `channel` must be null or a handle returned by `dvc_channel_create`, with
/// no other call on it in progress.
#[no_mangle]
pub unsafe extern "C" fn dvc_channel_free(channel: DvcChannelHandle) {
    crate::ffi_boundary((), || {
        if channel.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by dvc_channel_create.
        let handle = unsafe { Box::from_raw(channel as *mut ChannelHandle) };
        handle.channel.dispose();
        drop(handle);
    });
}

/// Check a channel name. Returns `DVC_ERR_INVALID_NAME` with a reason in
/// `dvc_last_error` if it is unusable.
///
/// # Safety
/// `name` must be a non-null pointer to a valid UTF-8, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn dvc_validate_channel_name(name: *const c_char) -> DvcResult {
    crate::ffi_boundary(DvcResult::Internal, || {
        error::clear_error_state();

        // SAFETY: Caller guarantees `name` is a valid C string.
        let name = match unsafe { transport::required_str_arg(name, "name") } {
            Some(v) => v,
            None => return DvcResult::InvalidArgument,
        };

        match dvcprims_channel::validate_channel_name(name) {
            Ok(()) => DvcResult::Ok,
            Err(err) => error::map_channel_error(&err),
        }
    })
}
