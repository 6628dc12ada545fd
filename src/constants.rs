//! Application-wide constants
//!
//! Single source of truth for the magic numbers and string literals used
//! throughout the coordinator.

/// Game window detection constants
pub mod marker {
    /// Default title substring that marks a relevant game client window.
    pub const DEFAULT_GAME_MARKER: &str = "EVE - ";

    /// Delimiter separating the client title from the character name.
    pub const NAME_DELIMITER: &str = " - ";

    /// Display name used when the title carries no delimiter.
    pub const UNKNOWN_NAME: &str = "Unknown";
}

/// Reconciler poll timing
pub mod poll {
    /// Fixed reconciliation period in milliseconds.
    pub const INTERVAL_MS: u64 = 1000;
}

/// Per-surface refresh loop timing
pub mod refresh {
    /// Base capture interval in milliseconds.
    pub const BASE_INTERVAL_MS: u64 = 500;

    /// Upper bound on the capture interval in milliseconds.
    pub const MAX_INTERVAL_MS: u64 = 3000;

    /// Client count at or below which the base interval applies.
    pub const BASE_CLIENT_COUNT: usize = 2;

    /// Interval growth per additional client in milliseconds.
    pub const STEP_PER_CLIENT_MS: u64 = 250;
}

/// Magnetic snapping constants
pub mod snap {
    /// Edge distance below which a released surface snaps flush, in pixels.
    pub const DISTANCE: i32 = 20;
}

/// Mouse button constants
pub mod mouse {
    /// Primary button: focus-and-raise the bound client window.
    pub const BUTTON_ACTIVATE: u8 = 1;

    /// Secondary button: drag the preview surface.
    pub const BUTTON_DRAG: u8 = 3;
}

/// Input event constants (from evdev)
pub mod input {
    /// Key press event value.
    pub const KEY_PRESS: i32 = 1;

    /// Key release event value.
    pub const KEY_RELEASE: i32 = 0;
}

/// Hotkey permission constants
pub mod permissions {
    pub const DEV_INPUT: &str = "/dev/input";

    pub const INPUT_GROUP: &str = "input";

    pub const ADD_TO_INPUT_GROUP: &str = "sudo usermod -aG input $USER";
}

/// Default surface placement
pub mod positioning {
    /// Origin for surfaces with no saved position.
    pub const SPAWN_X: i32 = 100;
    pub const SPAWN_Y: i32 = 100;

    /// Diagonal step between consecutive unsaved surfaces.
    pub const SPAWN_STEP: i32 = 30;

    /// Nominal surface size before the first capture arrives.
    pub const INITIAL_WIDTH: u32 = 160;
    pub const INITIAL_HEIGHT: u32 = 90;
}

/// Active indicator decoration
pub mod indicator {
    /// Ring thickness in pixels, drawn outset around the target surface.
    pub const BORDER_WIDTH: i32 = 3;
}
