//! End-to-end tests: config file -> keyboard hook -> monitor writes
//!
//! A scripted key source and an in-memory monitor port stand in for evdev and i2c-dev,
//! so these run without hardware:
//! ```bash
//! cargo test --test hotkey_dispatch
//! ```

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use display_manager::config::{self, ConfigError};
use display_manager::hotkey::{HotkeyError, KeyEvent, KeyEventSource};
use display_manager::monitor::{MonitorControl, MonitorId, MonitorPort, VcpCode, VcpError, VcpReading};
use display_manager::{serve, AppError};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Records every write; monitors listed in `broken` fail reads and writes
#[derive(Default)]
struct RecordingMonitors {
    monitors: Vec<MonitorId>,
    broken: Vec<MonitorId>,
    values: Mutex<HashMap<(MonitorId, VcpCode), u16>>,
    writes: Mutex<Vec<(MonitorId, VcpCode, u16)>>,
}

impl RecordingMonitors {
    fn new(monitors: &[&str], broken: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            monitors: monitors.iter().map(|s| s.to_string()).collect(),
            broken: broken.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    fn writes(&self) -> Vec<(MonitorId, VcpCode, u16)> {
        self.writes.lock().unwrap().clone()
    }
}

impl MonitorPort for RecordingMonitors {
    fn list_monitors(&self) -> Result<Vec<MonitorId>, VcpError> {
        Ok(self.monitors.clone())
    }

    fn read_vcp(&self, monitor: &str, code: VcpCode) -> Result<VcpReading, VcpError> {
        if self.broken.iter().any(|m| m == monitor) {
            return Err(VcpError::Read {
                monitor: monitor.to_string(),
                code,
                message: "no DDC/CI support".to_string(),
            });
        }
        let current = self
            .values
            .lock()
            .unwrap()
            .get(&(monitor.to_string(), code))
            .copied()
            .unwrap_or(0);
        Ok(VcpReading { current, max: 255 })
    }

    fn write_vcp(&self, monitor: &str, code: VcpCode, value: u16) -> Result<(), VcpError> {
        self.writes
            .lock()
            .unwrap()
            .push((monitor.to_string(), code, value));
        if self.broken.iter().any(|m| m == monitor) {
            return Err(VcpError::Write {
                monitor: monitor.to_string(),
                code,
                message: "no DDC/CI support".to_string(),
            });
        }
        self.values
            .lock()
            .unwrap()
            .insert((monitor.to_string(), code), value);
        Ok(())
    }
}

/// Replays a fixed list of key presses, then closes
struct ScriptedKeys {
    events: Vec<KeyEvent>,
    fail_start: bool,
    stopped: Arc<AtomicBool>,
}

impl ScriptedKeys {
    fn new(events: Vec<KeyEvent>) -> (Self, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        (
            Self {
                events,
                fail_start: false,
                stopped: stopped.clone(),
            },
            stopped,
        )
    }
}

impl KeyEventSource for ScriptedKeys {
    fn start(&mut self, tx: mpsc::Sender<KeyEvent>) -> Result<(), HotkeyError> {
        if self.fail_start {
            return Err(HotkeyError::NoKeyboards("no devices in test".to_string()));
        }
        let events = std::mem::take(&mut self.events);
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn alt(keycode: u32) -> KeyEvent {
    KeyEvent {
        alt_key: true,
        keycode,
        rawcode: keycode,
        ..Default::default()
    }
}

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("display-manager").join("config.json");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn alt_2_switches_m1_to_input_15() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"[{"keyBinding":{"modifier":"alt","keycode":2},"monitors":[{"id":"M1","codes":{"60":15}}]}]"#,
    );
    let port = RecordingMonitors::new(&["M1"], &[]);
    let (keys, stopped) = ScriptedKeys::new(vec![alt(2)]);

    let handled = serve(&path, MonitorControl::new(port.clone()), keys, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handled, 1);
    assert_eq!(port.writes(), vec![("M1".to_string(), 0x60, 15)]);
    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn duplicate_triggers_both_fire_and_failures_are_tolerated() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"[
            {"keyBinding":{"modifier":"alt","keycode":3},
             "monitors":[{"id":"BROKEN","codes":{"60":17}},{"id":"M1","codes":{"60":17,"10":40}}]},
            {"keyBinding":{"modifier":"alt","keycode":3},
             "monitors":[{"id":"M2","codes":{"60":0}}]},
            {"keyBinding":{"modifier":"ctrl","keycode":3},
             "monitors":[{"id":"M2","codes":{"60":15}}]}
        ]"#,
    );
    let port = RecordingMonitors::new(&["M1", "M2", "BROKEN"], &["BROKEN"]);
    let (keys, _) = ScriptedKeys::new(vec![alt(3), alt(4)]);

    let handled = serve(&path, MonitorControl::new(port.clone()), keys, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handled, 1);
    assert_eq!(
        port.writes(),
        vec![
            ("BROKEN".to_string(), 0x60, 17),
            ("M1".to_string(), 0x60, 17),
            ("M1".to_string(), 0x10, 40),
            ("M2".to_string(), 0x60, 0),
        ]
    );
}

#[tokio::test]
async fn first_run_creates_empty_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fresh").join("config.json");
    let port = RecordingMonitors::new(&["M1"], &[]);
    let (keys, _) = ScriptedKeys::new(vec![alt(2)]);

    let handled = serve(&path, MonitorControl::new(port.clone()), keys, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handled, 0);
    assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    assert!(port.writes().is_empty());
}

#[tokio::test]
async fn invalid_config_fails_before_hook_attaches() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"[{"keyBinding":{"modifier":"hyper","keycode":"2"},"monitors":[{"id":"M1","codes":{"60":15}}]}]"#,
    );
    let port = RecordingMonitors::new(&["M1"], &[]);
    let (keys, stopped) = ScriptedKeys::new(vec![alt(2)]);

    let err = serve(&path, MonitorControl::new(port.clone()), keys, CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        AppError::Config(ConfigError::Invalid { violations, .. }) => {
            assert_eq!(violations.len(), 2);
        }
        other => panic!("expected invalid config, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 2);
    assert!(port.writes().is_empty());
    // The keyboard source was never acquired
    assert!(!stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn hook_start_failure_releases_source() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[]");
    let port = RecordingMonitors::new(&[], &[]);
    let (mut keys, stopped) = ScriptedKeys::new(Vec::new());
    keys.fail_start = true;

    let err = serve(&path, MonitorControl::new(port), keys, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Hotkey(HotkeyError::NoKeyboards(_))));
    assert_eq!(err.exit_code(), 1);
    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn loaded_bindings_round_trip_to_the_file_contents() {
    let dir = TempDir::new().unwrap();
    let contents = r#"[
        {"keyBinding":{"modifier":"meta","keycode":30},
         "monitors":[{"id":"DP-1","codes":{"60":15,"10":80}},{"id":"HDMI-A-1","codes":{}}]},
        {"keyBinding":{"modifier":"shift","keycode":31},"monitors":[]}
    ]"#;
    let path = write_config(&dir, contents);

    let bindings = config::load(&path).unwrap();
    let expected: serde_json::Value = serde_json::from_str(contents).unwrap();
    assert_eq!(serde_json::to_value(&bindings).unwrap(), expected);
}

#[tokio::test]
async fn survey_reports_remaining_monitors_when_one_fails() {
    let port = RecordingMonitors::new(&["M1", "BROKEN", "M2"], &["BROKEN"]);
    port.write_vcp("M2", 0x60, 17).unwrap();
    let control = MonitorControl::new(port);

    let inputs = control.survey_inputs().await.unwrap();
    assert_eq!(inputs, vec![("M1".to_string(), 0), ("M2".to_string(), 17)]);
}
