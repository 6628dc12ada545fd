use anyhow::Result;
use image::RgbaImage;

use crate::types::{Position, Rect};

/// One floating, borderless, topmost overlay window. Implementations own
/// the underlying platform window and destroy it on drop.
pub trait Overlay {
    fn show(&mut self) -> Result<()>;

    fn hide(&mut self) -> Result<()>;

    fn move_to(&mut self, pos: Position) -> Result<()>;

    /// Move and resize in one step (used by the indicator decoration).
    fn set_geometry(&mut self, rect: Rect) -> Result<()>;

    /// Draw `image` and resize the window to exactly its pixel dimensions.
    /// Fully transparent pixels are excluded from the clickable area where
    /// the platform supports it.
    fn present(&mut self, image: &RgbaImage) -> Result<()>;
}

/// Creates overlays for preview surfaces and the active indicator.
pub trait OverlayFactory {
    fn create_overlay(&mut self, name: &str, rect: Rect) -> Result<Box<dyn Overlay>>;
}

#[cfg(test)]
pub mod mock {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default, Clone)]
    pub struct OverlayLog {
        pub visible: bool,
        pub moves: Vec<Position>,
        pub geometry_updates: Vec<Rect>,
        pub presented: Vec<(u32, u32)>,
        pub destroyed: bool,
    }

    pub type SharedLog = Arc<Mutex<OverlayLog>>;

    pub struct MockOverlay {
        log: SharedLog,
    }

    impl Overlay for MockOverlay {
        fn show(&mut self) -> Result<()> {
            self.log.lock().unwrap().visible = true;
            Ok(())
        }

        fn hide(&mut self) -> Result<()> {
            self.log.lock().unwrap().visible = false;
            Ok(())
        }

        fn move_to(&mut self, pos: Position) -> Result<()> {
            self.log.lock().unwrap().moves.push(pos);
            Ok(())
        }

        fn set_geometry(&mut self, rect: Rect) -> Result<()> {
            self.log.lock().unwrap().geometry_updates.push(rect);
            Ok(())
        }

        fn present(&mut self, image: &RgbaImage) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .presented
                .push((image.width(), image.height()));
            Ok(())
        }
    }

    impl Drop for MockOverlay {
        fn drop(&mut self) {
            self.log.lock().unwrap().destroyed = true;
        }
    }

    /// Factory that hands out recording overlays and keeps their logs so
    /// tests can inspect them after the overlay is gone.
    #[derive(Default)]
    pub struct MockFactory {
        pub created: Vec<(String, SharedLog)>,
    }

    impl MockFactory {
        pub fn log_for(&self, name: &str) -> Option<SharedLog> {
            self.created
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, log)| log.clone())
        }
    }

    impl OverlayFactory for MockFactory {
        fn create_overlay(&mut self, name: &str, _rect: Rect) -> Result<Box<dyn Overlay>> {
            let log = SharedLog::default();
            self.created.push((name.to_string(), log.clone()));
            Ok(Box::new(MockOverlay { log }))
        }
    }
}
