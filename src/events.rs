use image::RgbaImage;

use crate::types::WindowHandle;

/// Hand-off messages delivered to the coordination thread. Background tasks
/// never mutate coordinator state directly; everything arrives through this
/// enum on a single channel.
#[derive(Debug)]
pub enum AppEvent {
    /// A refresh task produced a freshly scaled thumbnail.
    Frame { handle: WindowHandle, image: RgbaImage },
    /// A refresh task hit a terminal capture failure and stopped itself.
    CaptureFailed { handle: WindowHandle },
    /// Pointer activity on one of our overlay windows, in root coordinates.
    Pointer(PointerEvent),
    /// Raw cycle-hotkey transition from the keyboard listener.
    Key(KeyEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Press { button: u8, x: i32, y: i32 },
    Release { button: u8, x: i32, y: i32 },
    Motion { x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    TriggerDown,
    TriggerUp,
    ModifierDown,
    ModifierUp,
}
