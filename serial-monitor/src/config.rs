//! Configuration for serial-monitor.
//!
//! There is no configuration file. The binary builds a [`MonitorConfig`] from
//! command-line flags and environment variables; library users construct one
//! directly or start from [`MonitorConfig::default`].

use std::time::Duration;
use tokio::time::Instant;
use tokio_serial::{DataBits, Parity, StopBits};

use crate::{
    error::{Error, Result},
    transport::Endpoint,
};

/// Bridge address used when none is given.
pub const DEFAULT_ADDRESS: &str = "rfc2217://localhost:4000";

/// Serial link speed used when none is given.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// How long one read waits for a complete line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait for the TCP connection to the bridge.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the bridge gets to answer each handshake phase.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest timeout `validate` accepts for any of the timeouts.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

// Roughly 30 years; stands in for a deadline that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Serial line parameters requested from the port.
///
/// The baud rate is passed through as given; the bridge or the driver is the
/// one to reject values the hardware cannot do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl SerialSettings {
    /// 8N1 at the given baud rate.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Everything needed to open and monitor one serial port.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Bridge address or local device
    pub endpoint: Endpoint,

    /// Line parameters sent to the port
    pub serial: SerialSettings,

    /// Per-read timeout
    pub read_timeout: Duration,

    /// TCP connect timeout (bridge endpoints only)
    pub connect_timeout: Duration,

    /// Timeout for each RFC 2217 handshake phase
    pub handshake_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::rfc2217("localhost", 4000),
            serial: SerialSettings::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl MonitorConfig {
    /// Default configuration pointed at another endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Check the values that would otherwise fail late or spin.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("read timeout", self.read_timeout),
            ("connect timeout", self.connect_timeout),
            ("handshake timeout", self.handshake_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
            if value > MAX_TIMEOUT {
                return Err(Error::Config(format!(
                    "{} of {:?} exceeds the maximum of {:?}",
                    name, value, MAX_TIMEOUT
                )));
            }
        }
        Ok(())
    }
}

/// Parse a possibly fractional number of seconds, e.g. `"0.25"`.
pub fn parse_seconds(s: &str) -> Result<Duration> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid number of seconds '{}': {}", s, e)))?;

    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("invalid number of seconds '{}': {}", s, e)))
}

/// The instant `timeout` from now, saturating instead of overflowing.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}
