use std::sync::mpsc::Sender;
use std::thread;

use anyhow::{Context, Result};
use evdev::{Device, EventType, InputEventKind, Key};
use tracing::{error, info, warn};

use crate::constants::{input, permissions};
use crate::events::{AppEvent, KeyEvent};

/// Find all keyboard devices that carry the Tab key.
fn find_all_keyboard_devices() -> Result<Vec<Device>> {
    info!(path = %permissions::DEV_INPUT, "scanning for keyboard devices");

    let mut devices = Vec::new();
    for entry in std::fs::read_dir(permissions::DEV_INPUT).context(format!(
        "failed to read {} - are you in the '{}' group?",
        permissions::DEV_INPUT,
        permissions::INPUT_GROUP
    ))? {
        let entry = entry?;
        let path = entry.path();
        if let Ok(device) = Device::open(&path)
            && let Some(keys) = device.supported_keys()
            && keys.contains(Key::KEY_TAB)
        {
            info!(device_path = %path.display(), name = ?device.name(), "found keyboard device");
            devices.push(device);
        }
    }

    if devices.is_empty() {
        anyhow::bail!(
            "no keyboard device found. Ensure you're in the '{}' group:\n {}\nthen log out and back in.",
            permissions::INPUT_GROUP,
            permissions::ADD_TO_INPUT_GROUP
        )
    }
    info!(count = devices.len(), "listening on keyboard device(s)");
    Ok(devices)
}

/// Spawn a background listener per keyboard device. Listeners never block on
/// the coordination thread; they only enqueue key transitions.
pub fn spawn_listener(sender: Sender<AppEvent>) -> Result<Vec<thread::JoinHandle<()>>> {
    let devices = find_all_keyboard_devices()?;
    let mut handles = Vec::new();
    for device in devices {
        let sender = sender.clone();
        let handle = thread::spawn(move || {
            info!(device = ?device.name(), "hotkey listener started");
            if let Err(e) = listen(device, sender) {
                error!(error = %e, "hotkey listener error");
            }
        });
        handles.push(handle);
    }
    Ok(handles)
}

/// Translate raw Tab/Shift transitions into cycle key events. Key-repeat
/// values are dropped here; the coordinator's latch guards against repeats
/// from other devices as well.
fn listen(mut device: Device, sender: Sender<AppEvent>) -> Result<()> {
    let mut left_shift = false;
    let mut right_shift = false;
    loop {
        for event in device.fetch_events().context("failed to fetch events")? {
            if event.event_type() != EventType::KEY {
                continue;
            }
            let InputEventKind::Key(key) = event.kind() else {
                continue;
            };
            let value = event.value();
            match key {
                Key::KEY_TAB => {
                    let mapped = if value == input::KEY_PRESS {
                        Some(KeyEvent::TriggerDown)
                    } else if value == input::KEY_RELEASE {
                        Some(KeyEvent::TriggerUp)
                    } else {
                        None
                    };
                    if let Some(mapped) = mapped {
                        sender
                            .send(AppEvent::Key(mapped))
                            .context("failed to send key event")?;
                    }
                }
                Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => {
                    let was_held = left_shift || right_shift;
                    let held = value != input::KEY_RELEASE;
                    if key == Key::KEY_LEFTSHIFT {
                        left_shift = held;
                    } else {
                        right_shift = held;
                    }
                    let now_held = left_shift || right_shift;
                    if now_held != was_held {
                        let mapped = if now_held {
                            KeyEvent::ModifierDown
                        } else {
                            KeyEvent::ModifierUp
                        };
                        sender
                            .send(AppEvent::Key(mapped))
                            .context("failed to send key event")?;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Check if hotkeys are available (user has input group permissions).
pub fn check_permissions() -> bool {
    std::fs::read_dir(permissions::DEV_INPUT).is_ok()
}

/// Print a helpful error when permissions are missing.
pub fn print_permission_error() {
    error!(path = %permissions::DEV_INPUT, "cannot access input devices");
    error!(group = %permissions::INPUT_GROUP, "hotkeys require group membership");
    error!(command = %permissions::ADD_TO_INPUT_GROUP, "add user to input group, then log out and back in");
    warn!("continuing without hotkey support");
}
