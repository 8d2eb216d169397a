use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::core::blocker::Blocker;
use crate::core::device::{Device, DeviceTable};
use crate::core::events::EventLog;
use crate::core::scanner::Scanner;
use crate::core::timing::CancelToken;
use crate::error::{Result, WardenError};
use crate::net::channel::{self, Capture, FrameSink};
use crate::net::interface::InterfaceBinding;

const GATEWAY_PROBES: usize = 3;
const GATEWAY_WAIT: Duration = Duration::from_secs(3);
const GATEWAY_POLL: Duration = Duration::from_millis(100);

/// Owns the capture channel and the discovery engine; the single entry point
/// the surrounding UI constructs after interface selection.
pub struct ArpEngine {
    binding: InterfaceBinding,
    scanner: Arc<Scanner>,
    sink: Arc<dyn FrameSink>,
    table: DeviceTable,
    events: EventLog,
    config: EngineConfig,
    capture: Capture,
}

impl ArpEngine {
    /// Open the interface and start the capture thread feeding discovery.
    pub fn new(binding: InterfaceBinding, config: EngineConfig) -> Result<Self> {
        let events = EventLog::new(config.max_log_lines);
        let (injector, rx) = channel::open(&binding.interface, config.read_timeout)?;
        let sink: Arc<dyn FrameSink> = Arc::new(injector);
        let table = DeviceTable::new();
        let scanner = Arc::new(Scanner::new(
            binding.clone(),
            sink.clone(),
            table.clone(),
            events.clone(),
            &config,
        ));

        let capture = {
            let scanner = scanner.clone();
            Capture::start(rx, events.clone(), move |frame| scanner.ingest(frame))
        };

        Ok(Self {
            binding,
            scanner,
            sink,
            table,
            events,
            config,
            capture,
        })
    }

    pub fn binding(&self) -> &InterfaceBinding {
        &self.binding
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Sweep the subnet; blocks until done or cancelled.
    pub fn scan(&self, progress: impl FnMut(u8), cancel: &CancelToken) {
        self.scanner.scan(progress, cancel);
    }

    pub fn devices(&self) -> Vec<Device> {
        self.scanner.devices()
    }

    pub fn find_device(&self, ip: Ipv4Addr) -> Option<Device> {
        self.table.find_by_ip(ip)
    }

    pub fn request(&self, ip: Ipv4Addr) {
        self.scanner.request(ip);
    }

    pub fn resolve_hostnames(&self, cancel: &CancelToken) {
        self.scanner.resolve_hostnames(cancel);
    }

    /// Return the gateway device, probing for it if the sweep missed it.
    /// Without a resolved gateway the blocking engine cannot be built.
    pub fn resolve_gateway(&self) -> Result<Device> {
        if let Some(gateway) = self.table.gateway() {
            return Ok(gateway);
        }

        for _ in 0..GATEWAY_PROBES {
            self.scanner.request(self.binding.gateway_ip);
        }
        let deadline = Instant::now() + GATEWAY_WAIT;
        while Instant::now() < deadline {
            if let Some(gateway) = self.table.gateway() {
                return Ok(gateway);
            }
            thread::sleep(GATEWAY_POLL);
        }

        Err(WardenError::GatewayUnresolved(self.binding.gateway_ip))
    }

    /// Build the blocking engine once the gateway is known.
    pub fn blocking_engine(&self, gateway: Device) -> Result<Blocker> {
        Blocker::new(
            self.binding.own_mac,
            gateway,
            self.table.clone(),
            self.sink.clone(),
            self.events.clone(),
            &self.config,
        )
    }

    /// Release the capture handle. Idempotent; also runs on Drop.
    pub fn shutdown(&mut self) {
        self.capture.close();
    }
}
