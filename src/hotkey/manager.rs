//! evdev keyboard source - one monitoring task per keyboard device

use std::path::PathBuf;

use evdev::{Device, InputEventKind, Key, MiscType};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::detector::KeyTranslator;
use super::hook::KeyEventSource;
use super::{HotkeyError, KeyEvent};

/// Find all keyboard devices on the system
pub fn find_keyboards() -> Vec<(PathBuf, Device)> {
    evdev::enumerate()
        .filter_map(|(path, device)| {
            // A keyboard should support common keys
            let is_keyboard = device.supported_keys().map_or(false, |keys| {
                keys.contains(Key::KEY_ENTER)
                    && keys.contains(Key::KEY_SPACE)
                    && keys.contains(Key::KEY_A)
                    && keys.contains(Key::KEY_Z)
            });

            if is_keyboard {
                let name = device.name().unwrap_or("Unknown");
                log::info!("Found keyboard device: {:?} ({})", path, name);
                Some((path, device))
            } else {
                None
            }
        })
        .collect()
}

/// Check if we have permission to access input devices
/// Takes pre-discovered keyboards to avoid redundant enumeration
pub fn check_permissions(keyboards: &[(PathBuf, Device)]) -> Result<(), HotkeyError> {
    if keyboards.is_empty() {
        let all_devices: Vec<_> = evdev::enumerate().collect();

        if all_devices.is_empty() {
            return Err(HotkeyError::NoKeyboards(
                "No input devices found. Ensure you are in the 'input' group:\n\
                 sudo usermod -aG input $USER\n\
                 Then log out and back in."
                    .to_string(),
            ));
        } else {
            return Err(HotkeyError::NoKeyboards(format!(
                "Found {} input devices but none appear to be keyboards. \
                 This might be a permissions issue or no keyboard is connected.",
                all_devices.len()
            )));
        }
    }

    Ok(())
}

/// Key presses from every keyboard attached to the machine
pub struct EvdevKeyboards {
    cancel_token: CancellationToken,
}

impl EvdevKeyboards {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    /// Monitor a single keyboard device for key presses
    async fn monitor_device(
        path: String,
        device: Device,
        tx: mpsc::Sender<KeyEvent>,
        cancel: CancellationToken,
    ) {
        let name = device.name().unwrap_or("Unknown").to_string();
        log::info!("Monitoring keyboard device: {} ({})", path, name);

        let mut translator = KeyTranslator::new();

        let mut stream = match device.into_event_stream() {
            Ok(s) => s,
            Err(e) => {
                log::error!("Failed to create event stream for {}: {}", path, e);
                return;
            }
        };

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::info!("Keyboard monitoring cancelled for {}", path);
                    break;
                }

                result = stream.next_event() => {
                    match result {
                        Ok(ev) => match ev.kind() {
                            InputEventKind::Misc(MiscType::MSC_SCAN) => {
                                translator.record_scancode(ev.value());
                            }
                            InputEventKind::Key(key) => {
                                if let Some(event) = translator.process_key(key, ev.value()) {
                                    log::trace!("Key press on {}: {}", path, event);
                                    if tx.send(event).await.is_err() {
                                        log::debug!("Key event receiver closed, stopping {}", path);
                                        break;
                                    }
                                }
                            }
                            _ => {}
                        },
                        Err(e) => {
                            log::warn!("Device read error for {} (disconnected?): {}", path, e);
                            break;
                        }
                    }
                }
            }
        }

        log::info!("Stopped monitoring device: {}", path);
    }
}

impl Default for EvdevKeyboards {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyEventSource for EvdevKeyboards {
    fn start(&mut self, tx: mpsc::Sender<KeyEvent>) -> Result<(), HotkeyError> {
        // Find keyboards once and check permissions
        let keyboards = find_keyboards();
        check_permissions(&keyboards)?;

        log::info!("Starting key monitoring on {} device(s)", keyboards.len());

        // Spawn a task for each keyboard
        for (path, device) in keyboards {
            let tx = tx.clone();
            let cancel = self.cancel_token.clone();
            let path_str = path.to_string_lossy().to_string();

            tokio::spawn(async move {
                Self::monitor_device(path_str, device, tx, cancel).await;
            });
        }

        Ok(())
    }

    fn stop(&mut self) {
        log::info!("Stopping keyboard monitoring");
        self.cancel_token.cancel();
    }
}
