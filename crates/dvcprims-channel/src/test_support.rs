use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dvcprims_transport::NativeChannel;
use parking_lot::Mutex;

/// Records what a channel does to its native handle.
#[derive(Default)]
pub(crate) struct NativeLog {
    pub frames: Mutex<Vec<Vec<u8>>>,
    pub closes: AtomicUsize,
    pub broken: AtomicBool,
}

impl NativeLog {
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub(crate) struct RecordingNative(pub Arc<NativeLog>);

impl RecordingNative {
    pub fn boxed() -> (Box<dyn NativeChannel>, Arc<NativeLog>) {
        let log = Arc::new(NativeLog::default());
        (Box::new(Self(Arc::clone(&log))), log)
    }
}

impl NativeChannel for RecordingNative {
    fn write(&self, frame: &[u8]) -> io::Result<()> {
        if self.0.broken.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.0.frames.lock().push(frame.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}
