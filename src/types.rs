use std::fmt;

use crate::constants::marker;

/// Opaque identifier for an OS-level window. Stable for the lifetime of the
/// window; equality and hashing are what the coordinator keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u32);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// One discovered window, produced fresh on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left() && x < self.right() && y >= self.top() && y < self.bottom()
    }

    /// Grow the rect by `amount` pixels on every side.
    pub fn outset(&self, amount: i32) -> Self {
        Self {
            x: self.x - amount,
            y: self.y - amount,
            width: self.width + amount * 2,
            height: self.height + amount * 2,
        }
    }
}

/// Derive the display name from a window title: the substring after the last
/// `" - "`, or `"Unknown"` when the delimiter is absent. Used as both the
/// persistence key and the cycling-match key.
pub fn display_name(title: &str) -> String {
    match title.rsplit_once(marker::NAME_DELIMITER) {
        Some((_, name)) => name.to_string(),
        None => marker::UNKNOWN_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_takes_substring_after_last_delimiter() {
        assert_eq!(display_name("EVE - Bob"), "Bob");
        assert_eq!(display_name("EVE - Tranquility - Alice"), "Alice");
    }

    #[test]
    fn display_name_without_delimiter_is_unknown() {
        assert_eq!(display_name("EVE"), "Unknown");
        assert_eq!(display_name(""), "Unknown");
    }

    #[test]
    fn rect_contains_is_half_open() {
        let r = Rect::new(10, 20, 30, 40);
        assert!(r.contains(10, 20));
        assert!(r.contains(39, 59));
        assert!(!r.contains(40, 20));
        assert!(!r.contains(10, 60));
    }

    #[test]
    fn rect_outset_grows_every_side() {
        let r = Rect::new(10, 10, 20, 20).outset(3);
        assert_eq!(r, Rect::new(7, 7, 26, 26));
    }
}
