//! Monitor control over DDC/CI
//!
//! `MonitorPort` is the narrow interface to the hardware; `I2cMonitors` implements it
//! on top of Linux i2c-dev, and `MonitorControl` adds timeouts, surveys and input toggling.

pub mod control;
pub mod i2c;

pub use control::MonitorControl;
pub use i2c::{I2cMonitors, OutputInfo};

use std::time::Duration;

/// Monitor identifier as used in the config file (DRM connector name, e.g. `DP-1`)
pub type MonitorId = String;

/// A VCP feature code
pub type VcpCode = u8;

/// VCP code of the input source register
pub const INPUT_SOURCE: VcpCode = 0x60;

/// The two inputs `flip` toggles between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum InputSource {
    Hdmi1 = 0,
    Dvi = 17,
}

impl InputSource {
    pub fn value(self) -> u16 {
        self as u16
    }

    /// Input to switch to given the current register value.
    /// Only DVI is recognised; every other value counts as HDMI 1.
    pub fn toggled_from(current: u16) -> Self {
        if current == InputSource::Dvi.value() {
            InputSource::Hdmi1
        } else {
            InputSource::Dvi
        }
    }
}

/// Current and maximum value of a VCP register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpReading {
    pub current: u16,
    pub max: u16,
}

/// Errors from talking to a monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcpError {
    /// Monitors could not be enumerated
    Enumerate(String),
    /// No monitor with that id is attached
    UnknownMonitor(MonitorId),
    /// The monitor did not answer the query
    Read {
        monitor: MonitorId,
        code: VcpCode,
        message: String,
    },
    /// The monitor rejected or never received the write
    Write {
        monitor: MonitorId,
        code: VcpCode,
        message: String,
    },
    /// The device call did not finish in time
    Timeout {
        monitor: MonitorId,
        code: VcpCode,
        after: Duration,
    },
}

impl std::fmt::Display for VcpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VcpError::Enumerate(e) => write!(f, "Failed to enumerate monitors: {}", e),
            VcpError::UnknownMonitor(id) => write!(f, "Unknown monitor \"{}\"", id),
            VcpError::Read {
                monitor,
                code,
                message,
            } => write!(
                f,
                "VCP read of 0x{:02x} on {} failed: {}",
                code, monitor, message
            ),
            VcpError::Write {
                monitor,
                code,
                message,
            } => write!(
                f,
                "VCP write of 0x{:02x} on {} failed: {}",
                code, monitor, message
            ),
            VcpError::Timeout {
                monitor,
                code,
                after,
            } => write!(
                f,
                "VCP 0x{:02x} on {} timed out after {}ms",
                code,
                monitor,
                after.as_millis()
            ),
        }
    }
}

impl std::error::Error for VcpError {}

/// Reads and writes VCP registers. Calls may block on bus I/O.
pub trait MonitorPort: Send + Sync + 'static {
    fn list_monitors(&self) -> Result<Vec<MonitorId>, VcpError>;

    fn read_vcp(&self, monitor: &str, code: VcpCode) -> Result<VcpReading, VcpError>;

    fn write_vcp(&self, monitor: &str, code: VcpCode, value: u16) -> Result<(), VcpError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory monitors for unit tests

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeMonitors {
        pub monitors: Vec<MonitorId>,
        pub values: Mutex<HashMap<(MonitorId, VcpCode), u16>>,
        pub writes: Mutex<Vec<(MonitorId, VcpCode, u16)>>,
        pub unreadable: HashSet<MonitorId>,
        pub rejected: HashSet<(MonitorId, VcpCode)>,
        pub delay: Option<Duration>,
    }

    impl FakeMonitors {
        pub fn with_monitors(ids: &[&str]) -> Self {
            Self {
                monitors: ids.iter().map(|id| id.to_string()).collect(),
                ..Default::default()
            }
        }

        pub fn set(&self, monitor: &str, code: VcpCode, value: u16) {
            self.values
                .lock()
                .unwrap()
                .insert((monitor.to_string(), code), value);
        }

        pub fn writes(&self) -> Vec<(MonitorId, VcpCode, u16)> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl MonitorPort for FakeMonitors {
        fn list_monitors(&self) -> Result<Vec<MonitorId>, VcpError> {
            Ok(self.monitors.clone())
        }

        fn read_vcp(&self, monitor: &str, code: VcpCode) -> Result<VcpReading, VcpError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.unreadable.contains(monitor) {
                return Err(VcpError::Read {
                    monitor: monitor.to_string(),
                    code,
                    message: "unsupported".to_string(),
                });
            }
            let current = self
                .values
                .lock()
                .unwrap()
                .get(&(monitor.to_string(), code))
                .copied()
                .unwrap_or(0);
            Ok(VcpReading { current, max: 100 })
        }

        fn write_vcp(&self, monitor: &str, code: VcpCode, value: u16) -> Result<(), VcpError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.writes
                .lock()
                .unwrap()
                .push((monitor.to_string(), code, value));
            if self.rejected.contains(&(monitor.to_string(), code)) {
                return Err(VcpError::Write {
                    monitor: monitor.to_string(),
                    code,
                    message: "rejected".to_string(),
                });
            }
            self.set(monitor, code, value);
            Ok(())
        }
    }
}
