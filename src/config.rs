use std::time::Duration;

/// Tunables for the sweep, poison and restoration loops.
///
/// The defaults are the values the engines were tuned with; tests substitute
/// scaled-down copies so the timing-sensitive paths run in milliseconds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capture read timeout; bounds how quickly shutdown is noticed.
    pub read_timeout: Duration,
    /// Gap between ARP requests during a subnet sweep.
    pub sweep_gap: Duration,
    /// How long to keep listening for late replies after the last request.
    pub sweep_grace: Duration,
    /// Interval between periodic poison rounds.
    pub spoof_interval: Duration,
    /// Number of corrective reply rounds sent when a victim is released.
    pub restore_rounds: usize,
    /// Gap between restoration rounds.
    pub restore_gap: Duration,
    /// Maximum retained log lines.
    pub max_log_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            sweep_gap: Duration::from_millis(3),
            sweep_grace: Duration::from_secs(1),
            spoof_interval: Duration::from_millis(1500),
            restore_rounds: 5,
            restore_gap: Duration::from_millis(100),
            max_log_lines: 100,
        }
    }
}
