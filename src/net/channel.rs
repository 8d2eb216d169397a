use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use pnet::datalink::{self, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};

use crate::core::events::EventLog;
use crate::error::{Result, WardenError};

/// Synchronous best-effort frame emission.
///
/// The engines only ever hold one of these behind an `Arc`, which is what
/// lets the tests substitute a [`MemorySink`] for the live NIC.
pub trait FrameSink: Send + Sync {
    fn inject(&self, frame: &[u8]) -> Result<()>;
}

/// Open an Ethernet channel on `iface` in promiscuous mode and split it into
/// the injector half and the raw receiver half.
pub fn open(
    iface: &NetworkInterface,
    read_timeout: Duration,
) -> Result<(Injector, Box<dyn DataLinkReceiver>)> {
    let config = Config {
        read_timeout: Some(read_timeout),
        promiscuous: true,
        ..Default::default()
    };
    match datalink::channel(iface, config) {
        Ok(datalink::Channel::Ethernet(tx, rx)) => Ok((Injector::new(tx), rx)),
        Ok(_) => Err(WardenError::Network("unsupported channel type".into())),
        Err(e) => Err(match e.kind() {
            std::io::ErrorKind::PermissionDenied => WardenError::PermissionDenied,
            _ => WardenError::Network(e.to_string()),
        }),
    }
}

/// Production frame sink writing to the pnet datalink sender.
pub struct Injector {
    tx: Mutex<Box<dyn DataLinkSender>>,
}

impl Injector {
    fn new(tx: Box<dyn DataLinkSender>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl FrameSink for Injector {
    fn inject(&self, frame: &[u8]) -> Result<()> {
        self.tx
            .lock()
            .send_to(frame, None)
            .ok_or_else(|| WardenError::Network("send returned no result".into()))?
            .map_err(|e| WardenError::Network(e.to_string()))
    }
}

/// In-memory frame sink for tests: records every injected frame and can be
/// switched into a failing mode. Clones share state.
#[derive(Clone, Default)]
pub struct MemorySink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl FrameSink for MemorySink {
    fn inject(&self, frame: &[u8]) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(WardenError::Network("injection disabled".into()));
        }
        self.frames.lock().push(frame.to_vec());
        Ok(())
    }
}

/// Background capture loop delivering each received frame to a callback.
pub struct Capture {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Capture {
    /// Spawn the capture thread. Each captured frame is handed to `on_frame`
    /// exactly once; read timeouts poll the stop flag, and other receive
    /// errors are logged without killing the loop.
    pub fn start<F>(mut rx: Box<dyn DataLinkReceiver>, events: EventLog, on_frame: F) -> Self
    where
        F: Fn(&[u8]) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                match rx.next() {
                    Ok(frame) => on_frame(frame),
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => events.emit(format!("[!] capture error: {e}")),
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the capture thread and wait for it to exit. Idempotent; the
    /// blocked reader unblocks within the channel read timeout.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_frames() {
        let sink = MemorySink::new();
        sink.inject(&[1, 2, 3]).unwrap();
        sink.inject(&[4, 5, 6]).unwrap();

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.frames()[1], vec![4, 5, 6]);
    }

    #[test]
    fn memory_sink_clones_share_state() {
        let sink = MemorySink::new();
        let other = sink.clone();
        other.inject(&[9]).unwrap();
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn memory_sink_failure_mode() {
        let sink = MemorySink::new();
        sink.set_fail(true);
        assert!(sink.inject(&[1]).is_err());
        assert_eq!(sink.count(), 0);

        sink.set_fail(false);
        assert!(sink.inject(&[1]).is_ok());
    }
}
