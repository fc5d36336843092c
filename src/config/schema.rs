//! Validation of the bindings document
//!
//! The whole document is walked once and every violation is collected, so a hand-edited
//! file can be fixed in a single pass.

use serde_json::{Map, Value};

use super::binding::{Binding, KeyBinding, MonitorAction, VcpSetting};
use crate::hotkey::Modifier;

const BINDING_KEYS: &[&str] = &["keyBinding", "monitors"];
const KEY_BINDING_KEYS: &[&str] = &["modifier", "keycode"];
const MONITOR_KEYS: &[&str] = &["id", "codes"];

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer to the offending value ("" is the document root)
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: expected {}, found {}", path, self.expected, self.actual)
    }
}

/// Validate a parsed config document and convert it to bindings
pub fn validate(document: &Value) -> Result<Vec<Binding>, Vec<Violation>> {
    let mut validator = Validator::default();
    let bindings = validator.bindings(document);
    if validator.violations.is_empty() {
        Ok(bindings)
    } else {
        Err(validator.violations)
    }
}

/// Short description of a JSON value for error messages
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string \"{}\"", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

fn child(path: &str, segment: &str) -> String {
    format!("{}/{}", path, segment.replace('~', "~0").replace('/', "~1"))
}

/// Parse a VCP code key such as `60`, `0x60` or `e1`
fn parse_vcp_code(key: &str) -> Option<u8> {
    let digits = key
        .strip_prefix("0x")
        .or_else(|| key.strip_prefix("0X"))
        .unwrap_or(key);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

#[derive(Default)]
struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    fn push(&mut self, path: &str, expected: impl Into<String>, actual: impl Into<String>) {
        self.violations.push(Violation {
            path: path.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        });
    }

    /// Check that `value` is an object with no keys outside `allowed`
    fn object<'a>(
        &mut self,
        path: &str,
        value: &'a Value,
        allowed: &[&str],
    ) -> Option<&'a Map<String, Value>> {
        let Some(map) = value.as_object() else {
            self.push(path, "object", describe(value));
            return None;
        };
        for key in map.keys() {
            if !allowed.contains(&key.as_str()) {
                self.push(
                    &child(path, key),
                    format!("no additional properties (allowed: {})", allowed.join(", ")),
                    format!("property \"{}\"", key),
                );
            }
        }
        Some(map)
    }

    fn required<'a>(
        &mut self,
        path: &str,
        map: &'a Map<String, Value>,
        key: &str,
    ) -> Option<&'a Value> {
        let value = map.get(key);
        if value.is_none() {
            self.push(&child(path, key), "required property", "nothing");
        }
        value
    }

    fn bindings(&mut self, document: &Value) -> Vec<Binding> {
        let Some(items) = document.as_array() else {
            self.push("", "array of bindings", describe(document));
            return Vec::new();
        };

        let parsed: Vec<_> = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.binding(&child("", &index.to_string()), item))
            .collect();
        parsed.into_iter().flatten().collect()
    }

    fn binding(&mut self, path: &str, value: &Value) -> Option<Binding> {
        let map = self.object(path, value, BINDING_KEYS)?;

        let key_binding = self
            .required(path, map, "keyBinding")
            .and_then(|v| self.key_binding(&child(path, "keyBinding"), v));
        let monitors = self
            .required(path, map, "monitors")
            .and_then(|v| self.monitors(&child(path, "monitors"), v));

        Some(Binding {
            key_binding: key_binding?,
            monitors: monitors?,
        })
    }

    fn key_binding(&mut self, path: &str, value: &Value) -> Option<KeyBinding> {
        let map = self.object(path, value, KEY_BINDING_KEYS)?;

        let modifier = self
            .required(path, map, "modifier")
            .and_then(|v| self.modifier(&child(path, "modifier"), v));
        let keycode = self
            .required(path, map, "keycode")
            .and_then(|v| self.keycode(&child(path, "keycode"), v));

        Some(KeyBinding {
            modifier: modifier?,
            keycode: keycode?,
        })
    }

    fn modifier(&mut self, path: &str, value: &Value) -> Option<Modifier> {
        const EXPECTED: &str = "one of alt, ctrl, meta, shift";

        let Some(name) = value.as_str() else {
            self.push(path, EXPECTED, describe(value));
            return None;
        };
        match name.parse::<Modifier>() {
            Ok(modifier) => {
                if name == Modifier::CTRL_ALIAS {
                    log::warn!(
                        "{}: \"{}\" is accepted as \"ctrl\"; please fix the spelling",
                        path,
                        name
                    );
                }
                Some(modifier)
            }
            Err(e) => {
                self.push(path, EXPECTED, describe(value));
                log::debug!("{}", e);
                None
            }
        }
    }

    fn keycode(&mut self, path: &str, value: &Value) -> Option<u32> {
        match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(keycode) => Some(keycode),
            None => {
                self.push(path, "non-negative integer keycode", describe(value));
                None
            }
        }
    }

    fn monitors(&mut self, path: &str, value: &Value) -> Option<Vec<MonitorAction>> {
        let Some(items) = value.as_array() else {
            self.push(path, "array of monitors", describe(value));
            return None;
        };

        let parsed: Vec<_> = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.monitor(&child(path, &index.to_string()), item))
            .collect();
        parsed.into_iter().collect()
    }

    fn monitor(&mut self, path: &str, value: &Value) -> Option<MonitorAction> {
        let map = self.object(path, value, MONITOR_KEYS)?;

        let id = self.required(path, map, "id").and_then(|v| {
            let id = v.as_str().map(str::to_string);
            if id.is_none() {
                self.push(&child(path, "id"), "string", describe(v));
            }
            id
        });
        let codes = self
            .required(path, map, "codes")
            .and_then(|v| self.codes(&child(path, "codes"), v));

        Some(MonitorAction {
            id: id?,
            codes: codes?,
        })
    }

    fn codes(&mut self, path: &str, value: &Value) -> Option<Vec<VcpSetting>> {
        let Some(map) = value.as_object() else {
            self.push(path, "object of VCP code to value", describe(value));
            return None;
        };

        let parsed: Vec<_> = map
            .iter()
            .map(|(key, v)| {
                let entry_path = child(path, key);
                let code = parse_vcp_code(key);
                if code.is_none() {
                    self.push(
                        &entry_path,
                        "hexadecimal VCP code key (00-ff)",
                        format!("key \"{}\"", key),
                    );
                }
                let setting_value = v.as_u64().and_then(|n| u16::try_from(n).ok());
                if setting_value.is_none() {
                    self.push(&entry_path, "integer between 0 and 65535", describe(v));
                }
                Some(VcpSetting {
                    key: key.clone(),
                    code: code?,
                    value: setting_value?,
                })
            })
            .collect();
        parsed.into_iter().collect()
    }
}
