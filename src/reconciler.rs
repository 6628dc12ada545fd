use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;

use anyhow::Result;
use image::RgbaImage;
use tracing::{debug, error, info, warn};

use crate::capture::{self, SharedProvider};
use crate::config::Config;
use crate::constants::{positioning, snap};
use crate::events::AppEvent;
use crate::indicator::ActiveIndicator;
use crate::overlay::OverlayFactory;
use crate::preview::{spawn_refresh, PreviewSurface};
use crate::types::{display_name, Dimensions, Position, Rect, WindowHandle, WindowInfo};

/// Owns the live set of preview surfaces and the single source of truth for
/// the active client. Polled on a fixed period; diffs the discovered window
/// set against the tracked one and creates/destroys surfaces accordingly.
pub struct Reconciler {
    marker: String,
    surfaces: HashMap<WindowHandle, PreviewSurface>,
    active: Option<WindowHandle>,
    indicator: ActiveIndicator,
    events: Sender<AppEvent>,
}

impl Reconciler {
    pub fn new(marker: String, events: Sender<AppEvent>, indicator: ActiveIndicator) -> Self {
        Self {
            marker,
            surfaces: HashMap::new(),
            active: None,
            indicator,
            events,
        }
    }

    /// One reconciliation pass. A failed listing skips the pass entirely:
    /// "list failed" is never read as "all windows closed".
    pub fn poll(
        &mut self,
        provider: &SharedProvider,
        factory: &mut dyn OverlayFactory,
        config: &Config,
    ) -> Result<()> {
        let listed = match capture::lock(provider)?.list_windows() {
            Ok(windows) => windows,
            Err(err) => {
                warn!(error = %err, "window listing failed, skipping this poll");
                return Ok(());
            }
        };
        let game_windows: Vec<WindowInfo> = listed
            .into_iter()
            .filter(|info| info.title.contains(&self.marker))
            .collect();

        let current: HashSet<WindowHandle> = game_windows.iter().map(|info| info.handle).collect();
        let gone: Vec<WindowHandle> = self
            .surfaces
            .keys()
            .filter(|handle| !current.contains(handle))
            .copied()
            .collect();
        for handle in gone {
            self.remove_surface(handle)?;
        }

        for info in &game_windows {
            if self.surfaces.contains_key(&info.handle) {
                continue;
            }
            if let Err(err) = self.create_surface(info, provider, factory, config, game_windows.len()) {
                error!(handle = %info.handle, error = %err, "failed to create preview surface");
            }
        }
        Ok(())
    }

    fn create_surface(
        &mut self,
        info: &WindowInfo,
        provider: &SharedProvider,
        factory: &mut dyn OverlayFactory,
        config: &Config,
        client_count: usize,
    ) -> Result<()> {
        let name = display_name(&info.title);
        let position = config.saved_position(&name).unwrap_or_else(|| {
            let n = self.surfaces.len() as i32;
            Position::new(
                positioning::SPAWN_X + n * positioning::SPAWN_STEP,
                positioning::SPAWN_Y + n * positioning::SPAWN_STEP,
            )
        });
        let size = Dimensions {
            width: positioning::INITIAL_WIDTH,
            height: positioning::INITIAL_HEIGHT,
        };
        let overlay = factory.create_overlay(
            &name,
            Rect::new(position.x, position.y, size.width as i32, size.height as i32),
        )?;
        let refresh = spawn_refresh(
            provider.clone(),
            info.handle,
            config.scale_factor(),
            config.refresh_interval(client_count),
            self.events.clone(),
        );
        let mut surface = PreviewSurface::new(
            info.handle,
            name.clone(),
            position,
            size,
            overlay,
            refresh,
        );
        surface.show()?;
        info!(handle = %info.handle, name = %name, ?position, "tracking new client window");
        self.surfaces.insert(info.handle, surface);
        Ok(())
    }

    fn remove_surface(&mut self, handle: WindowHandle) -> Result<()> {
        if let Some(mut surface) = self.surfaces.remove(&handle) {
            surface.stop_refresh();
            info!(%handle, name = %surface.display_name, "client window gone, dropping surface");
        }
        if self.active == Some(handle) {
            self.active = None;
            self.indicator.follow(None)?;
        }
        Ok(())
    }

    /// Record `handle` as the active client and re-anchor the indicator.
    /// Re-entrant safe: an already-active handle still forces the indicator
    /// to reposition, covering moves that happened without a focus change.
    pub fn set_active_client(&mut self, handle: WindowHandle) -> Result<()> {
        if !self.surfaces.contains_key(&handle) {
            debug!(%handle, "ignoring set_active_client for untracked window");
            return Ok(());
        }
        if let Some(prev) = self.active
            && prev != handle
            && let Some(surface) = self.surfaces.get_mut(&prev)
        {
            surface.is_active = false;
        }
        self.active = Some(handle);
        let Some(surface) = self.surfaces.get_mut(&handle) else {
            return Ok(());
        };
        surface.is_active = true;
        let rect = surface.rect();
        self.indicator.follow(Some((handle, rect)))
    }

    pub fn get_active_client(&self) -> Option<WindowHandle> {
        self.active
    }

    /// Display a frame produced by a refresh task. Frames for handles no
    /// longer tracked arrive late from torn-down tasks and are discarded.
    pub fn handle_frame(&mut self, handle: WindowHandle, image: &RgbaImage) -> Result<()> {
        let Some(surface) = self.surfaces.get_mut(&handle) else {
            debug!(%handle, "discarding stale frame for untracked window");
            return Ok(());
        };
        surface.present_frame(image)?;
        let rect = surface.rect();
        if self.active == Some(handle) {
            self.indicator.update_position(rect)?;
        }
        Ok(())
    }

    /// A refresh task reported a terminal capture failure; the surface
    /// self-destructs. The next poll recreates it if the window reappears.
    pub fn handle_capture_failure(&mut self, handle: WindowHandle) -> Result<()> {
        warn!(%handle, "tearing down surface after capture failure");
        self.remove_surface(handle)
    }

    /// Hit-test in root coordinates. Clicks landing on the indicator are
    /// proxied to its target surface.
    pub fn surface_at(&self, x: i32, y: i32) -> Option<WindowHandle> {
        self.surfaces
            .iter()
            .find(|(_, surface)| surface.contains(x, y))
            .map(|(handle, _)| *handle)
            .or_else(|| self.indicator.proxy_target(x, y))
    }

    pub fn begin_drag(&mut self, handle: WindowHandle, x: i32, y: i32) {
        if let Some(surface) = self.surfaces.get_mut(&handle) {
            surface.begin_drag(x, y);
        }
    }

    pub fn drag_to(&mut self, handle: WindowHandle, x: i32, y: i32) -> Result<()> {
        let Some(surface) = self.surfaces.get_mut(&handle) else {
            return Ok(());
        };
        surface.drag_to(x, y)?;
        let rect = surface.rect();
        if self.active == Some(handle) {
            self.indicator.update_position(rect)?;
        }
        Ok(())
    }

    /// Finish a drag: snap against the other live surfaces, then persist
    /// the final position keyed by display name.
    pub fn end_drag(&mut self, handle: WindowHandle, config: &mut Config) -> Result<()> {
        let others: Vec<Rect> = self
            .surfaces
            .iter()
            .filter(|(other, _)| **other != handle)
            .map(|(_, surface)| surface.rect())
            .collect();
        let Some(surface) = self.surfaces.get_mut(&handle) else {
            return Ok(());
        };
        if !surface.is_dragging() {
            return Ok(());
        }
        surface.end_drag(&others, snap::DISTANCE)?;
        let name = surface.display_name.clone();
        let position = surface.position;
        let rect = surface.rect();
        config.set_position(&name, position)?;
        if self.active == Some(handle) {
            self.indicator.update_position(rect)?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn tracked_handles(&self) -> HashSet<WindowHandle> {
        self.surfaces.keys().copied().collect()
    }
}
