use anyhow::Result;
use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::overlay::Overlay;
use crate::types::{Rect, WindowHandle};

/// Decoration overlay that outlines whichever preview surface is active.
/// It has no geometry tracking of its own: the reconciler re-syncs it
/// whenever the target moves, resizes, or changes thumbnail dimensions.
pub struct ActiveIndicator {
    overlay: Box<dyn Overlay>,
    target: Option<WindowHandle>,
    rect: Option<Rect>,
    color: [u8; 3],
    border_width: i32,
    enabled: bool,
}

impl ActiveIndicator {
    pub fn new(overlay: Box<dyn Overlay>, color: [u8; 3], border_width: i32, enabled: bool) -> Self {
        Self {
            overlay,
            target: None,
            rect: None,
            color,
            border_width,
            enabled,
        }
    }

    pub fn target(&self) -> Option<WindowHandle> {
        self.target
    }

    /// Attach to a surface (repositioning immediately) or detach and hide.
    pub fn follow(&mut self, target: Option<(WindowHandle, Rect)>) -> Result<()> {
        match target {
            None => {
                self.target = None;
                self.rect = None;
                self.overlay.hide()
            }
            Some((handle, rect)) => {
                debug!(%handle, "indicator following surface");
                self.target = Some(handle);
                self.update_position(rect)?;
                if self.enabled {
                    self.overlay.show()?;
                }
                Ok(())
            }
        }
    }

    /// Re-anchor over the target's current geometry, outset by the border.
    pub fn update_position(&mut self, target_rect: Rect) -> Result<()> {
        let outset = target_rect.outset(self.border_width);
        self.rect = Some(outset);
        if !self.enabled {
            return Ok(());
        }
        self.overlay.set_geometry(outset)?;
        self.overlay.present(&ring_image(
            outset.width.max(1) as u32,
            outset.height.max(1) as u32,
            self.border_width.max(1) as u32,
            self.color,
        ))
    }

    /// The surface a click on the indicator should be routed to, if the
    /// point lands on the decoration.
    pub fn proxy_target(&self, x: i32, y: i32) -> Option<WindowHandle> {
        let rect = self.rect?;
        if rect.contains(x, y) { self.target } else { None }
    }
}

/// Hollow rectangle: opaque border pixels, fully transparent interior. The
/// overlay excludes transparent pixels from its clickable area, so only the
/// ring itself intercepts clicks.
fn ring_image(width: u32, height: u32, border: u32, color: [u8; 3]) -> RgbaImage {
    let on = Rgba([color[0], color[1], color[2], 255]);
    let off = Rgba([0, 0, 0, 0]);
    RgbaImage::from_fn(width, height, |x, y| {
        if x < border || y < border || x >= width - border || y >= height - border {
            on
        } else {
            off
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::mock::{MockFactory, SharedLog};
    use crate::overlay::OverlayFactory;

    const GREEN: [u8; 3] = [0x47, 0xf7, 0x3e];

    fn indicator() -> (ActiveIndicator, SharedLog) {
        let mut factory = MockFactory::default();
        let overlay = factory
            .create_overlay("indicator", Rect::new(0, 0, 1, 1))
            .unwrap();
        let log = factory.log_for("indicator").unwrap();
        (ActiveIndicator::new(overlay, GREEN, 3, true), log)
    }

    #[test]
    fn follow_none_hides_and_detaches() {
        let (mut indicator, log) = indicator();
        indicator
            .follow(Some((WindowHandle(7), Rect::new(10, 10, 100, 50))))
            .unwrap();
        assert!(log.lock().unwrap().visible);

        indicator.follow(None).unwrap();
        assert_eq!(indicator.target(), None);
        assert!(!log.lock().unwrap().visible);
        assert_eq!(indicator.proxy_target(15, 15), None);
    }

    #[test]
    fn follow_outsets_around_the_target() {
        let (mut indicator, log) = indicator();
        indicator
            .follow(Some((WindowHandle(7), Rect::new(10, 10, 100, 50))))
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.geometry_updates.last(), Some(&Rect::new(7, 7, 106, 56)));
        assert_eq!(log.presented.last(), Some(&(106, 56)));
    }

    #[test]
    fn proxy_routes_ring_clicks_to_the_target() {
        let (mut indicator, _log) = indicator();
        indicator
            .follow(Some((WindowHandle(7), Rect::new(10, 10, 100, 50))))
            .unwrap();

        assert_eq!(indicator.proxy_target(8, 8), Some(WindowHandle(7)));
        assert_eq!(indicator.proxy_target(500, 500), None);
    }

    #[test]
    fn ring_is_hollow() {
        let ring = ring_image(20, 10, 3, GREEN);
        assert_eq!(ring.get_pixel(0, 0).0[3], 255);
        assert_eq!(ring.get_pixel(19, 9).0[3], 255);
        assert_eq!(ring.get_pixel(10, 5).0[3], 0);
    }

    #[test]
    fn disabled_indicator_tracks_without_drawing() {
        let mut factory = MockFactory::default();
        let overlay = factory
            .create_overlay("indicator", Rect::new(0, 0, 1, 1))
            .unwrap();
        let log = factory.log_for("indicator").unwrap();
        let mut indicator = ActiveIndicator::new(overlay, GREEN, 3, false);

        indicator
            .follow(Some((WindowHandle(7), Rect::new(10, 10, 100, 50))))
            .unwrap();
        assert_eq!(indicator.target(), Some(WindowHandle(7)));
        assert!(!log.lock().unwrap().visible);
        assert!(log.lock().unwrap().presented.is_empty());
    }
}
