//! Turns raw evdev key events into `KeyEvent`s with modifier state tracking

use evdev::Key;

use super::KeyEvent;

/// Tracks the current state of modifier keys
#[derive(Debug, Default)]
pub struct ModifierState {
    left_ctrl: bool,
    right_ctrl: bool,
    left_alt: bool,
    right_alt: bool,
    left_shift: bool,
    right_shift: bool,
    left_meta: bool,
    right_meta: bool,
}

impl ModifierState {
    /// Update modifier state based on key event
    pub fn update(&mut self, key: Key, pressed: bool) {
        match key {
            Key::KEY_LEFTCTRL => self.left_ctrl = pressed,
            Key::KEY_RIGHTCTRL => self.right_ctrl = pressed,
            Key::KEY_LEFTALT => self.left_alt = pressed,
            Key::KEY_RIGHTALT => self.right_alt = pressed,
            Key::KEY_LEFTSHIFT => self.left_shift = pressed,
            Key::KEY_RIGHTSHIFT => self.right_shift = pressed,
            Key::KEY_LEFTMETA => self.left_meta = pressed,
            Key::KEY_RIGHTMETA => self.right_meta = pressed,
            _ => {}
        }
    }

    /// Get combined Ctrl state (left or right)
    pub fn ctrl(&self) -> bool {
        self.left_ctrl || self.right_ctrl
    }

    /// Get combined Alt state (left or right)
    pub fn alt(&self) -> bool {
        self.left_alt || self.right_alt
    }

    /// Get combined Shift state (left or right)
    pub fn shift(&self) -> bool {
        self.left_shift || self.right_shift
    }

    /// Get combined Meta/Super state (left or right)
    pub fn meta(&self) -> bool {
        self.left_meta || self.right_meta
    }
}

/// Per-device translator from evdev events to key presses
#[derive(Debug, Default)]
pub struct KeyTranslator {
    modifiers: ModifierState,
    last_scancode: Option<u32>,
}

impl KeyTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the scancode reported by MSC_SCAN; it precedes the key event it belongs to
    pub fn record_scancode(&mut self, scancode: i32) {
        self.last_scancode = u32::try_from(scancode).ok();
    }

    /// Process a key event, returning a `KeyEvent` for presses
    ///
    /// # Arguments
    /// * `key` - The key code
    /// * `value` - 0 = released, 1 = pressed, 2 = repeat
    pub fn process_key(&mut self, key: Key, value: i32) -> Option<KeyEvent> {
        let pressed = value == 1;
        let scancode = self.last_scancode.take();

        // Update modifier state for all events (press/release)
        self.modifiers.update(key, pressed);

        if value != 1 {
            return None;
        }

        let keycode = u32::from(key.code());
        Some(KeyEvent {
            shift_key: self.modifiers.shift(),
            alt_key: self.modifiers.alt(),
            ctrl_key: self.modifiers.ctrl(),
            meta_key: self.modifiers.meta(),
            keycode,
            rawcode: scancode.unwrap_or(keycode),
        })
    }
}
