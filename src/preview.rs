use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::{debug, warn};

use crate::capture::{self, SharedProvider};
use crate::events::AppEvent;
use crate::snapping;
use crate::types::{Dimensions, Position, Rect, WindowHandle};

/// One tracked client window: its overlay, geometry, drag state, and the
/// background refresh task feeding it thumbnails.
pub struct PreviewSurface {
    pub handle: WindowHandle,
    pub display_name: String,
    pub position: Position,
    pub size: Dimensions,
    pub is_active: bool,
    overlay: Box<dyn crate::overlay::Overlay>,
    refresh: RefreshTask,
    drag: Option<DragState>,
}

struct DragState {
    pointer_start: (i32, i32),
    origin: Position,
}

impl PreviewSurface {
    pub fn new(
        handle: WindowHandle,
        display_name: String,
        position: Position,
        size: Dimensions,
        overlay: Box<dyn crate::overlay::Overlay>,
        refresh: RefreshTask,
    ) -> Self {
        Self {
            handle,
            display_name,
            position,
            size,
            is_active: false,
            overlay,
            refresh,
            drag: None,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            self.size.width as i32,
            self.size.height as i32,
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rect().contains(x, y)
    }

    /// Display a freshly scaled thumbnail; the surface resizes to exactly
    /// match the new bitmap dimensions.
    pub fn present_frame(&mut self, image: &RgbaImage) -> Result<()> {
        self.size = Dimensions {
            width: image.width(),
            height: image.height(),
        };
        self.overlay.present(image)
    }

    pub fn show(&mut self) -> Result<()> {
        self.overlay.show()
    }

    pub fn begin_drag(&mut self, x: i32, y: i32) {
        self.drag = Some(DragState {
            pointer_start: (x, y),
            origin: self.position,
        });
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Follow the cursor delta from the press point.
    pub fn drag_to(&mut self, x: i32, y: i32) -> Result<()> {
        let Some(drag) = &self.drag else {
            return Ok(());
        };
        let new = Position::new(
            drag.origin.x + (x - drag.pointer_start.0),
            drag.origin.y + (y - drag.pointer_start.1),
        );
        self.position = new;
        self.overlay.move_to(new)
    }

    /// End the drag with a snap pass against the other live surfaces.
    pub fn end_drag(&mut self, others: &[Rect], snap_distance: i32) -> Result<()> {
        if self.drag.take().is_none() {
            return Ok(());
        }
        let snapped = snapping::snap_released(self.rect(), others, snap_distance);
        if snapped != self.position {
            debug!(handle = %self.handle, ?snapped, "snapped surface into place");
            self.position = snapped;
            self.overlay.move_to(snapped)?;
        }
        Ok(())
    }

    /// Signal the refresh task to stop. A capture in flight has its result
    /// discarded by the coordination loop once the surface is untracked.
    pub fn stop_refresh(&mut self) {
        self.refresh.stop();
    }
}

/// Cancellable periodic capture task bound to one surface.
pub struct RefreshTask {
    stop: Arc<AtomicBool>,
    _handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Spawn the background refresh loop for one window. Ticks are strictly
/// sequential within a surface: capture, scale, hand off, then sleep. On a
/// terminal capture failure the task reports once and exits; the
/// coordination loop tears the surface down.
pub fn spawn_refresh(
    provider: SharedProvider,
    handle: WindowHandle,
    scale: f32,
    interval: Duration,
    events: Sender<AppEvent>,
) -> RefreshTask {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let join = thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            let captured = match capture::lock(&provider) {
                Ok(mut provider) => provider.capture_window(handle),
                Err(err) => {
                    warn!(%handle, error = %err, "refresh task lost the provider");
                    let _ = events.send(AppEvent::CaptureFailed { handle });
                    return;
                }
            };
            match captured {
                Ok(image) => {
                    let scaled = scale_image(&image, scale);
                    if events.send(AppEvent::Frame { handle, image: scaled }).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!(%handle, error = %err, "capture failed, stopping refresh loop");
                    let _ = events.send(AppEvent::CaptureFailed { handle });
                    return;
                }
            }
            thread::sleep(interval);
        }
    });
    RefreshTask {
        stop,
        _handle: join,
    }
}

/// Bilinear downscale by a single factor on both axes, so the aspect ratio
/// is preserved. Dimensions never collapse to zero.
pub fn scale_image(image: &RgbaImage, factor: f32) -> RgbaImage {
    let width = ((image.width() as f32 * factor).round() as u32).max(1);
    let height = ((image.height() as f32 * factor).round() as u32).max(1);
    imageops::resize(image, width, height, FilterType::Triangle)
}
