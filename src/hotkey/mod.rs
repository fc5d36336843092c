//! Global keyboard events via evdev
//!
//! This module reads keyboard events directly from /dev/input/event* devices,
//! so hotkeys fire regardless of which window has focus.
//!
//! # Requirements
//! - User must be in the `input` group: `sudo usermod -aG input $USER`
//! - Log out and back in after adding to group

mod detector;
pub mod hook;
pub mod manager;

pub use hook::{HotkeyHook, KeyEventSource, SubscriptionId};
pub use manager::EvdevKeyboards;

use serde::{Serialize, Serializer};
use std::str::FromStr;

/// A single key press, delivered once per press (never on release or repeat)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyEvent {
    pub shift_key: bool,
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub meta_key: bool,
    pub keycode: u32,
    pub rawcode: u32,
}

impl KeyEvent {
    /// Whether the flag for `modifier` is held in this event
    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Alt => self.alt_key,
            Modifier::Shift => self.shift_key,
            Modifier::Ctrl => self.ctrl_key,
            Modifier::Meta => self.meta_key,
        }
    }
}

impl std::fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.ctrl_key {
            parts.push("Ctrl".to_string());
        }
        if self.alt_key {
            parts.push("Alt".to_string());
        }
        if self.shift_key {
            parts.push("Shift".to_string());
        }
        if self.meta_key {
            parts.push("Meta".to_string());
        }
        parts.push(self.keycode.to_string());
        write!(f, "{}", parts.join("+"))
    }
}

/// Modifier key that must be held for a binding to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Alt,
    Ctrl,
    Meta,
    Shift,
}

impl Modifier {
    /// Misspelling of `ctrl` that older config files contain
    pub const CTRL_ALIAS: &'static str = "crtl";

    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::Alt => "alt",
            Modifier::Ctrl => "ctrl",
            Modifier::Meta => "meta",
            Modifier::Shift => "shift",
        }
    }
}

impl std::fmt::Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modifier {
    type Err = UnknownModifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alt" => Ok(Modifier::Alt),
            "ctrl" | Modifier::CTRL_ALIAS => Ok(Modifier::Ctrl),
            "meta" => Ok(Modifier::Meta),
            "shift" => Ok(Modifier::Shift),
            other => Err(UnknownModifier(other.to_string())),
        }
    }
}

impl Serialize for Modifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A modifier name outside of alt/ctrl/meta/shift
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModifier(pub String);

impl std::fmt::Display for UnknownModifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown modifier \"{}\"", self.0)
    }
}

impl std::error::Error for UnknownModifier {}

/// Errors from attaching to the keyboard devices
#[derive(Debug)]
pub enum HotkeyError {
    /// No readable keyboard was found
    NoKeyboards(String),
    /// `start` was called on a hook that is already running
    AlreadyStarted,
    /// `start` was called after the hook was unloaded
    Unloaded,
}

impl std::fmt::Display for HotkeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotkeyError::NoKeyboards(e) => write!(f, "No keyboard available: {}", e),
            HotkeyError::AlreadyStarted => write!(f, "Keyboard hook already started"),
            HotkeyError::Unloaded => write!(f, "Keyboard hook was unloaded"),
        }
    }
}

impl std::error::Error for HotkeyError {}
