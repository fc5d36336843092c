//! Typed hotkey bindings as stored in config.json

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::hotkey::{KeyEvent, Modifier};
use crate::monitor::{MonitorId, VcpCode};

/// One config entry: a trigger and the writes it performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub key_binding: KeyBinding,
    pub monitors: Vec<MonitorAction>,
}

impl Binding {
    /// Keycode matches and the configured modifier is held
    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.key_binding.keycode == event.keycode && event.has_modifier(self.key_binding.modifier)
    }

    /// Number of device writes this binding performs
    pub fn write_count(&self) -> usize {
        self.monitors.iter().map(|m| m.codes.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyBinding {
    pub modifier: Modifier,
    pub keycode: u32,
}

impl std::fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.modifier, self.keycode)
    }
}

/// VCP writes for a single monitor, in file order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorAction {
    pub id: MonitorId,
    #[serde(serialize_with = "serialize_codes")]
    pub codes: Vec<VcpSetting>,
}

/// A single `"<hex code>": value` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcpSetting {
    /// The key as written in the file
    pub key: String,
    pub code: VcpCode,
    pub value: u16,
}

impl VcpSetting {
    pub fn new(code: VcpCode, value: u16) -> Self {
        Self {
            key: format!("{:02x}", code),
            code,
            value,
        }
    }
}

fn serialize_codes<S: Serializer>(codes: &[VcpSetting], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(codes.len()))?;
    for setting in codes {
        map.serialize_entry(&setting.key, &setting.value)?;
    }
    map.end()
}
