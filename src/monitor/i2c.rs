//! DDC/CI over Linux i2c-dev
//!
//! Monitors are discovered through /sys/class/drm: every connected output with a DDC
//! bus becomes a monitor whose id is the connector name (`DP-1`, `HDMI-A-1`, ...).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ddc::Ddc;
use ddc_i2c::I2cDeviceDdc;

use super::{MonitorId, MonitorPort, VcpCode, VcpError, VcpReading};

const DRM_ROOT: &str = "/sys/class/drm";
const DEV_ROOT: &str = "/dev";

/// Monitors reachable over i2c-dev
pub struct I2cMonitors {
    drm_root: PathBuf,
    buses: Mutex<HashMap<MonitorId, PathBuf>>,
    handles: HandleCache<I2cDeviceDdc>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Open device handles, one lock per monitor.
/// The map lock is only held to look up, insert or evict a handle, so a monitor stuck
/// in bus I/O never blocks calls to the others.
struct HandleCache<H> {
    handles: Mutex<HashMap<MonitorId, Arc<Mutex<H>>>>,
}

impl<H> HandleCache<H> {
    fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Run `op` against the handle for `monitor`, calling `open` when there is none.
    /// A failed `op` evicts the handle so the next call reopens the device.
    fn with_handle<T>(
        &self,
        monitor: &str,
        open: impl FnOnce() -> Result<H, String>,
        op: impl FnOnce(&mut H) -> Result<T, String>,
    ) -> Result<T, String> {
        let existing = lock(&self.handles).get(monitor).cloned();
        let handle = match existing {
            Some(handle) => handle,
            None => {
                let opened = Arc::new(Mutex::new(open()?));
                lock(&self.handles)
                    .entry(monitor.to_string())
                    .or_insert(opened)
                    .clone()
            }
        };

        let result = op(&mut lock(&handle));
        if result.is_err() {
            let mut handles = lock(&self.handles);
            if handles.get(monitor).is_some_and(|h| Arc::ptr_eq(h, &handle)) {
                handles.remove(monitor);
            }
        }
        result
    }
}

/// A connected output as seen in sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub id: MonitorId,
    /// i2c-dev node carrying DDC/CI
    pub bus: PathBuf,
    /// Preferred mode such as `2560x1440`, if the kernel lists any
    pub mode: Option<String>,
}

/// First entry of the connector's `modes` file
fn preferred_mode(output_path: &Path) -> Option<String> {
    let modes = fs::read_to_string(output_path.join("modes")).ok()?;
    modes
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Connector name without the `cardN-` prefix
fn connector_name(dir_name: &str) -> Option<&str> {
    let rest = dir_name.strip_prefix("card")?;
    let (card, connector) = rest.split_once('-')?;
    if card.is_empty() || !card.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(connector)
}

/// Find the i2c bus backing a DRM connector directory
fn find_i2c_bus(output_path: &Path) -> Option<String> {
    // AMD: i2c-N directories directly under the connector
    if let Ok(entries) = output_path.read_dir() {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("i2c-") {
                return Some(name);
            }
        }
    }

    // Intel: ddc/i2c-dev/i2c-N
    let intel_path = output_path.join("ddc").join("i2c-dev");
    if let Ok(mut entries) = intel_path.read_dir() {
        if let Some(Ok(entry)) = entries.next() {
            return Some(entry.file_name().to_string_lossy().to_string());
        }
    }

    // Fallback: ddc symlink pointing at ../i2c-N
    let ddc_symlink = output_path.join("ddc");
    if let Ok(target) = fs::read_link(&ddc_symlink) {
        if let Some(name) = target.file_name().and_then(|n| n.to_str()) {
            if name.starts_with("i2c-") {
                return Some(name.to_string());
            }
        }
    }

    None
}

impl I2cMonitors {
    pub fn new() -> Self {
        Self::with_drm_root(DRM_ROOT)
    }

    pub fn with_drm_root(drm_root: impl Into<PathBuf>) -> Self {
        Self {
            drm_root: drm_root.into(),
            buses: Mutex::new(HashMap::new()),
            handles: HandleCache::new(),
        }
    }

    /// Scan DRM connectors for connected outputs with a DDC bus
    fn scan(&self) -> Result<Vec<OutputInfo>, VcpError> {
        let entries = self.drm_root.read_dir().map_err(|e| {
            VcpError::Enumerate(format!("read {}: {}", self.drm_root.display(), e))
        })?;

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let dir_name = entry.file_name().to_string_lossy().to_string();
            let Some(connector) = connector_name(&dir_name) else {
                continue;
            };
            // Embedded panels don't speak DDC/CI
            if connector.starts_with("eDP") || connector.starts_with("LVDS") {
                continue;
            }

            let output_path = entry.path();
            let connected = fs::read_to_string(output_path.join("status"))
                .map(|s| s.trim() == "connected")
                .unwrap_or(false);
            if !connected {
                continue;
            }

            match find_i2c_bus(&output_path) {
                Some(bus) => found.push(OutputInfo {
                    id: connector.to_string(),
                    bus: Path::new(DEV_ROOT).join(bus),
                    mode: preferred_mode(&output_path),
                }),
                None => log::debug!("No DDC bus for connected output {}", connector),
            }
        }

        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    /// Connected outputs with their bus and preferred mode
    pub fn outputs(&self) -> Result<Vec<OutputInfo>, VcpError> {
        let found = self.scan()?;
        self.remember(&found);
        Ok(found)
    }

    fn remember(&self, outputs: &[OutputInfo]) {
        *lock(&self.buses) = outputs
            .iter()
            .map(|output| (output.id.clone(), output.bus.clone()))
            .collect();
    }

    fn bus_for(&self, monitor: &str) -> Result<PathBuf, VcpError> {
        if let Some(path) = lock(&self.buses).get(monitor) {
            return Ok(path.clone());
        }
        self.list_monitors()?;
        lock(&self.buses)
            .get(monitor)
            .cloned()
            .ok_or_else(|| VcpError::UnknownMonitor(monitor.to_string()))
    }

    /// Run `op` against an open handle for `monitor`, opening the bus on first use
    fn with_handle<T>(
        &self,
        monitor: &str,
        op: impl FnOnce(&mut I2cDeviceDdc) -> Result<T, String>,
    ) -> Result<T, String> {
        self.handles.with_handle(
            monitor,
            || {
                let bus = self.bus_for(monitor).map_err(|e| e.to_string())?;
                log::debug!("Opening DDC bus {:?} for {}", bus, monitor);
                ddc_i2c::from_i2c_device(&bus).map_err(|e| format!("open {}: {}", bus.display(), e))
            },
            op,
        )
    }
}

impl Default for I2cMonitors {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorPort for I2cMonitors {
    fn list_monitors(&self) -> Result<Vec<MonitorId>, VcpError> {
        Ok(self.outputs()?.into_iter().map(|output| output.id).collect())
    }

    fn read_vcp(&self, monitor: &str, code: VcpCode) -> Result<VcpReading, VcpError> {
        self.with_handle(monitor, |handle| {
            handle
                .get_vcp_feature(code)
                .map(|value| VcpReading {
                    current: value.value(),
                    max: value.maximum(),
                })
                .map_err(|e| format!("{:?}", e))
        })
        .map_err(|message| VcpError::Read {
            monitor: monitor.to_string(),
            code,
            message,
        })
    }

    fn write_vcp(&self, monitor: &str, code: VcpCode, value: u16) -> Result<(), VcpError> {
        self.with_handle(monitor, |handle| {
            handle
                .set_vcp_feature(code, value)
                .map_err(|e| format!("{:?}", e))
        })
        .map_err(|message| VcpError::Write {
            monitor: monitor.to_string(),
            code,
            message,
        })
    }
}
