//! Supervision and per-scale configuration.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::identity::DeviceIdentity;

/// Default cadence between liveness checks and reconnect attempts, in seconds.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;

/// Default upper bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing parameters for one supervisor.
///
/// Both values are strictly positive; the constructors reject zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawSupervisionConfig", into = "RawSupervisionConfig")
)]
pub struct SupervisionConfig {
    /// Retry and liveness cadence, in whole seconds.
    scan_interval_secs: u64,
    /// Bound on one connect attempt, in milliseconds.
    connect_timeout_ms: u64,
}

impl SupervisionConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if either value is zero.
    pub fn new(scan_interval_secs: u64, connect_timeout: Duration) -> Result<Self> {
        Self::default()
            .with_scan_interval_secs(scan_interval_secs)?
            .with_connect_timeout(connect_timeout)
    }

    /// Replace the scan interval.
    pub fn with_scan_interval_secs(mut self, secs: u64) -> Result<Self> {
        if secs == 0 {
            return Err(Error::InvalidParameter {
                name: "scan_interval".to_string(),
                value: secs.to_string(),
            });
        }
        self.scan_interval_secs = secs;
        Ok(self)
    }

    /// Replace the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Result<Self> {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if ms == 0 {
            return Err(Error::InvalidParameter {
                name: "connect_timeout".to_string(),
                value: format!("{:?}", timeout),
            });
        }
        self.connect_timeout_ms = ms;
        Ok(self)
    }

    /// Interval between liveness checks and between reconnect attempts.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Scan interval in whole seconds.
    pub fn scan_interval_secs(&self) -> u64 {
        self.scan_interval_secs
    }

    /// Upper bound on a single connect attempt.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Serialized form of [`SupervisionConfig`]; both durations in seconds.
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct RawSupervisionConfig {
    scan_interval_secs: u64,
    connect_timeout_secs: f64,
}

#[cfg(feature = "serde")]
impl TryFrom<RawSupervisionConfig> for SupervisionConfig {
    type Error = Error;

    fn try_from(raw: RawSupervisionConfig) -> Result<Self> {
        let timeout = Duration::try_from_secs_f64(raw.connect_timeout_secs).map_err(|_| {
            Error::InvalidParameter {
                name: "connect_timeout".to_string(),
                value: raw.connect_timeout_secs.to_string(),
            }
        })?;
        Self::new(raw.scan_interval_secs, timeout)
    }
}

#[cfg(feature = "serde")]
impl From<SupervisionConfig> for RawSupervisionConfig {
    fn from(config: SupervisionConfig) -> Self {
        Self {
            scan_interval_secs: config.scan_interval_secs,
            connect_timeout_secs: config.connect_timeout().as_secs_f64(),
        }
    }
}

/// Everything needed to set up supervision of one scale.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleConfig {
    /// Hardware address of the scale.
    pub device: DeviceIdentity,
    /// Timing parameters.
    #[cfg_attr(feature = "serde", serde(default))]
    pub supervision: SupervisionConfig,
}

impl ScaleConfig {
    /// Configuration for the scale at `address` with default timings.
    pub fn new(address: &str) -> Result<Self> {
        Ok(Self {
            device: DeviceIdentity::parse(address)?,
            supervision: SupervisionConfig::default(),
        })
    }

    /// Replace the timing parameters.
    pub fn with_supervision(mut self, supervision: SupervisionConfig) -> Self {
        self.supervision = supervision;
        self
    }
}
