use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use image::RgbaImage;
use tracing::{debug, error, info};
use x11rb::connection::Connection;
use x11rb::protocol::shape::{self, ConnectionExt as ShapeExt};
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use crate::capture::{CaptureError, CaptureProvider};
use crate::events::{AppEvent, PointerEvent};
use crate::overlay::{Overlay, OverlayFactory};
use crate::types::{Position, Rect, WindowHandle, WindowInfo};

const WM_CLASS: &[u8] = b"multibox-preview\0multibox-preview\0";

/// Pre-cached X11 atoms to avoid repeated roundtrips.
#[derive(Debug, Clone, Copy)]
struct Atoms {
    net_client_list: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
    net_active_window: Atom,
    net_wm_state: Atom,
    net_wm_state_above: Atom,
    net_wm_state_skip_taskbar: Atom,
    net_wm_state_skip_pager: Atom,
    net_wm_window_opacity: Atom,
}

impl Atoms {
    fn new(conn: &RustConnection) -> Result<Self> {
        Ok(Self {
            net_client_list: intern(conn, b"_NET_CLIENT_LIST")?,
            net_wm_name: intern(conn, b"_NET_WM_NAME")?,
            utf8_string: intern(conn, b"UTF8_STRING")?,
            net_active_window: intern(conn, b"_NET_ACTIVE_WINDOW")?,
            net_wm_state: intern(conn, b"_NET_WM_STATE")?,
            net_wm_state_above: intern(conn, b"_NET_WM_STATE_ABOVE")?,
            net_wm_state_skip_taskbar: intern(conn, b"_NET_WM_STATE_SKIP_TASKBAR")?,
            net_wm_state_skip_pager: intern(conn, b"_NET_WM_STATE_SKIP_PAGER")?,
            net_wm_window_opacity: intern(conn, b"_NET_WM_WINDOW_OPACITY")?,
        })
    }
}

fn intern(conn: &RustConnection, name: &'static [u8]) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name)
        .with_context(|| format!("failed to intern {}", String::from_utf8_lossy(name)))?
        .reply()
        .with_context(|| format!("failed to get reply for {}", String::from_utf8_lossy(name)))?
        .atom)
}

/// One X server connection shared by the provider, the overlay factory, and
/// the event pump.
pub struct X11Backend {
    conn: Arc<RustConnection>,
    screen: Screen,
    atoms: Atoms,
    opacity: u32,
}

impl X11Backend {
    pub fn connect(opacity_percent: u8) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X server")?;
        let screen = conn.setup().roots[screen_num].clone();
        info!(
            screen = screen_num,
            width = screen.width_in_pixels,
            height = screen.height_in_pixels,
            "connected to X server"
        );
        let atoms = Atoms::new(&conn)?;
        Ok(Self {
            conn: Arc::new(conn),
            screen,
            atoms,
            opacity: opacity_to_property(opacity_percent),
        })
    }

    pub fn provider(&self) -> X11Provider {
        X11Provider {
            conn: self.conn.clone(),
            screen: self.screen.clone(),
            atoms: self.atoms,
        }
    }

    pub fn overlay_factory(&self) -> X11OverlayFactory {
        X11OverlayFactory {
            conn: self.conn.clone(),
            screen: self.screen.clone(),
            atoms: self.atoms,
            opacity: self.opacity,
        }
    }

    /// Forward pointer activity on our overlay windows to the coordination
    /// thread. Runs until the connection or the channel goes away.
    pub fn spawn_event_pump(&self, sender: Sender<AppEvent>) -> JoinHandle<()> {
        let conn = self.conn.clone();
        thread::spawn(move || {
            loop {
                let event = match conn.wait_for_event() {
                    Ok(event) => event,
                    Err(err) => {
                        error!(error = %err, "X event pump terminated");
                        return;
                    }
                };
                let mapped = match event {
                    Event::ButtonPress(e) => Some(PointerEvent::Press {
                        button: e.detail,
                        x: e.root_x as i32,
                        y: e.root_y as i32,
                    }),
                    Event::ButtonRelease(e) => Some(PointerEvent::Release {
                        button: e.detail,
                        x: e.root_x as i32,
                        y: e.root_y as i32,
                    }),
                    Event::MotionNotify(e) => Some(PointerEvent::Motion {
                        x: e.root_x as i32,
                        y: e.root_y as i32,
                    }),
                    _ => None,
                };
                if let Some(pointer) = mapped
                    && sender.send(AppEvent::Pointer(pointer)).is_err()
                {
                    return;
                }
            }
        })
    }
}

fn opacity_to_property(percent: u8) -> u32 {
    (percent.min(100) as u64 * u32::MAX as u64 / 100) as u32
}

/// Capture provider backed by the shared X connection. Callers serialize
/// access through the provider mutex.
pub struct X11Provider {
    conn: Arc<RustConnection>,
    screen: Screen,
    atoms: Atoms,
}

impl X11Provider {
    fn window_title(&self, window: Window) -> Result<Option<String>> {
        let prop = self
            .conn
            .get_property(false, window, self.atoms.net_wm_name, self.atoms.utf8_string, 0, 1024)
            .context("failed to query _NET_WM_NAME")?
            .reply()
            .context("failed to read _NET_WM_NAME")?;
        let raw = if prop.value.is_empty() {
            self.conn
                .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::ANY, 0, 1024)
                .context("failed to query WM_NAME")?
                .reply()
                .context("failed to read WM_NAME")?
                .value
        } else {
            prop.value
        };
        if raw.is_empty() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
        }
    }
}

impl CaptureProvider for X11Provider {
    fn list_windows(&mut self) -> Result<Vec<WindowInfo>> {
        let prop = self
            .conn
            .get_property(
                false,
                self.screen.root,
                self.atoms.net_client_list,
                AtomEnum::WINDOW,
                0,
                u32::MAX,
            )
            .context("failed to query _NET_CLIENT_LIST")?
            .reply()
            .context("failed to read _NET_CLIENT_LIST")?;
        let windows = prop
            .value32()
            .ok_or_else(|| anyhow::anyhow!("invalid _NET_CLIENT_LIST reply"))?;

        let mut infos = Vec::new();
        for window in windows {
            // Windows can vanish between the listing and the title query.
            match self.window_title(window) {
                Ok(Some(title)) => infos.push(WindowInfo {
                    handle: WindowHandle(window),
                    title,
                }),
                Ok(None) => {}
                Err(err) => debug!(window, error = %err, "skipping window without readable title"),
            }
        }
        Ok(infos)
    }

    fn capture_window(&mut self, handle: WindowHandle) -> Result<RgbaImage, CaptureError> {
        let geom = self
            .conn
            .get_geometry(handle.0)
            .context("failed to send geometry query")?
            .reply()
            .map_err(|_| CaptureError::WindowGone(handle))?;
        if geom.width == 0 || geom.height == 0 {
            return Err(CaptureError::Degenerate {
                width: geom.width as u32,
                height: geom.height as u32,
            });
        }
        let reply = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                handle.0,
                0,
                0,
                geom.width,
                geom.height,
                !0,
            )
            .context("failed to send get_image request")?
            .reply()
            .map_err(|_| CaptureError::WindowGone(handle))?;

        let expected = geom.width as usize * geom.height as usize * 4;
        if reply.data.len() < expected {
            return Err(CaptureError::Backend(anyhow::anyhow!(
                "short get_image reply: {} bytes for {}x{}",
                reply.data.len(),
                geom.width,
                geom.height
            )));
        }
        // ZPixmap at depth 24 is little-endian BGRx.
        let mut rgba = Vec::with_capacity(expected);
        for pixel in reply.data[..expected].chunks_exact(4) {
            rgba.extend_from_slice(&[pixel[2], pixel[1], pixel[0], 255]);
        }
        RgbaImage::from_raw(geom.width as u32, geom.height as u32, rgba)
            .ok_or_else(|| CaptureError::Backend(anyhow::anyhow!("capture buffer size mismatch")))
    }

    fn focus_and_raise(&mut self, handle: WindowHandle) -> Result<()> {
        self.conn
            .configure_window(
                handle.0,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )
            .with_context(|| format!("failed to raise window {handle}"))?;

        // Source indication 2 = direct user action (pager convention).
        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window: handle.0,
            type_: self.atoms.net_active_window,
            data: ClientMessageData::from([2, x11rb::CURRENT_TIME, 0, 0, 0]),
        };
        self.conn
            .send_event(
                false,
                self.screen.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                event,
            )
            .with_context(|| format!("failed to send _NET_ACTIVE_WINDOW for {handle}"))?;
        self.conn
            .flush()
            .context("failed to flush after focus request")?;
        Ok(())
    }

    fn focused_window_title(&mut self) -> Result<Option<String>> {
        let prop = self
            .conn
            .get_property(
                false,
                self.screen.root,
                self.atoms.net_active_window,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .context("failed to query _NET_ACTIVE_WINDOW")?
            .reply()
            .context("failed to read _NET_ACTIVE_WINDOW")?;
        let Some(window) = prop.value32().and_then(|mut values| values.next()) else {
            return Ok(None);
        };
        if window == x11rb::NONE {
            return Ok(None);
        }
        self.window_title(window)
    }
}

pub struct X11OverlayFactory {
    conn: Arc<RustConnection>,
    screen: Screen,
    atoms: Atoms,
    opacity: u32,
}

impl OverlayFactory for X11OverlayFactory {
    fn create_overlay(&mut self, name: &str, rect: Rect) -> Result<Box<dyn Overlay>> {
        Ok(Box::new(X11Overlay::create(
            self.conn.clone(),
            &self.screen,
            self.atoms,
            self.opacity,
            name,
            rect,
        )?))
    }
}

/// Override-redirect, always-on-top window excluded from the taskbar and
/// pager. Unmanaged by the window manager, so it never steals focus.
pub struct X11Overlay {
    conn: Arc<RustConnection>,
    window: Window,
    gc: Gcontext,
    depth: u8,
    width: u16,
    height: u16,
    shaped: bool,
}

impl X11Overlay {
    fn create(
        conn: Arc<RustConnection>,
        screen: &Screen,
        atoms: Atoms,
        opacity: u32,
        name: &str,
        rect: Rect,
    ) -> Result<Self> {
        let window = conn
            .generate_id()
            .context("failed to generate overlay window id")?;
        let width = clamp_extent(rect.width);
        let height = clamp_extent(rect.height);
        conn.create_window(
            screen.root_depth,
            window,
            screen.root,
            clamp_coord(rect.x),
            clamp_coord(rect.y),
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .override_redirect(1)
                .background_pixel(screen.black_pixel)
                .event_mask(
                    EventMask::BUTTON_PRESS
                        | EventMask::BUTTON_RELEASE
                        | EventMask::POINTER_MOTION,
                ),
        )
        .with_context(|| format!("failed to create overlay window for '{name}'"))?;

        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_window_opacity,
            AtomEnum::CARDINAL,
            &[opacity],
        )
        .with_context(|| format!("failed to set opacity for '{name}'"))?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_state,
            AtomEnum::ATOM,
            &[
                atoms.net_wm_state_above,
                atoms.net_wm_state_skip_taskbar,
                atoms.net_wm_state_skip_pager,
            ],
        )
        .with_context(|| format!("failed to set window state for '{name}'"))?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            name.as_bytes(),
        )
        .with_context(|| format!("failed to set WM_NAME for '{name}'"))?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            WM_CLASS,
        )
        .with_context(|| format!("failed to set WM_CLASS for '{name}'"))?;

        let gc = conn
            .generate_id()
            .context("failed to generate graphics context id")?;
        conn.create_gc(gc, window, &CreateGCAux::new())
            .with_context(|| format!("failed to create graphics context for '{name}'"))?;
        conn.flush().context("failed to flush overlay creation")?;

        Ok(Self {
            conn,
            window,
            gc,
            depth: screen.root_depth,
            width,
            height,
            shaped: false,
        })
    }

    /// Clip the window to the opaque pixels of `image`, one rectangle per
    /// opaque scanline run. Fully opaque images reset to the plain rect.
    fn apply_shape(&mut self, image: &RgbaImage) -> Result<()> {
        let has_transparency = image.pixels().any(|pixel| pixel[3] == 0);
        if !has_transparency {
            if self.shaped {
                self.conn
                    .shape_mask(
                        shape::SO::SET,
                        shape::SK::BOUNDING,
                        self.window,
                        0,
                        0,
                        x11rb::NONE,
                    )
                    .context("failed to reset window shape")?;
                self.shaped = false;
            }
            return Ok(());
        }

        let mut rects = Vec::new();
        for (y, row) in image.rows().enumerate() {
            let mut run_start: Option<u32> = None;
            for (x, pixel) in row.enumerate() {
                match (pixel[3] != 0, run_start) {
                    (true, None) => run_start = Some(x as u32),
                    (false, Some(start)) => {
                        rects.push(Rectangle {
                            x: start as i16,
                            y: y as i16,
                            width: (x as u32 - start) as u16,
                            height: 1,
                        });
                        run_start = None;
                    }
                    _ => {}
                }
            }
            if let Some(start) = run_start {
                rects.push(Rectangle {
                    x: start as i16,
                    y: y as i16,
                    width: (image.width() - start) as u16,
                    height: 1,
                });
            }
        }
        self.conn
            .shape_rectangles(
                shape::SO::SET,
                shape::SK::BOUNDING,
                ClipOrdering::UNSORTED,
                self.window,
                0,
                0,
                &rects,
            )
            .context("failed to set window shape")?;
        self.shaped = true;
        Ok(())
    }
}

impl Overlay for X11Overlay {
    fn show(&mut self) -> Result<()> {
        self.conn
            .map_window(self.window)
            .context("failed to map overlay window")?;
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )
            .context("failed to raise overlay window")?;
        self.conn.flush().context("failed to flush after map")?;
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        self.conn
            .unmap_window(self.window)
            .context("failed to unmap overlay window")?;
        self.conn.flush().context("failed to flush after unmap")?;
        Ok(())
    }

    fn move_to(&mut self, pos: Position) -> Result<()> {
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new().x(pos.x).y(pos.y),
            )
            .context("failed to move overlay window")?;
        self.conn.flush().context("failed to flush after move")?;
        Ok(())
    }

    fn set_geometry(&mut self, rect: Rect) -> Result<()> {
        let width = clamp_extent(rect.width);
        let height = clamp_extent(rect.height);
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new()
                    .x(rect.x)
                    .y(rect.y)
                    .width(width as u32)
                    .height(height as u32),
            )
            .context("failed to set overlay geometry")?;
        self.width = width;
        self.height = height;
        self.conn.flush().context("failed to flush after resize")?;
        Ok(())
    }

    fn present(&mut self, image: &RgbaImage) -> Result<()> {
        let width = u16::try_from(image.width()).context("thumbnail too wide")?;
        let height = u16::try_from(image.height()).context("thumbnail too tall")?;
        if (width, height) != (self.width, self.height) {
            self.conn
                .configure_window(
                    self.window,
                    &ConfigureWindowAux::new()
                        .width(width as u32)
                        .height(height as u32),
                )
                .context("failed to resize overlay to bitmap")?;
            self.width = width;
            self.height = height;
        }

        // Native ZPixmap layout at depth 24 is little-endian BGRx.
        let mut data = Vec::with_capacity(image.len());
        for pixel in image.pixels() {
            data.extend_from_slice(&[pixel[2], pixel[1], pixel[0], 0]);
        }
        self.conn
            .put_image(
                ImageFormat::Z_PIXMAP,
                self.window,
                self.gc,
                width,
                height,
                0,
                0,
                0,
                self.depth,
                &data,
            )
            .context("failed to upload thumbnail image")?;
        self.apply_shape(image)?;
        self.conn.flush().context("failed to flush after present")?;
        Ok(())
    }
}

impl Drop for X11Overlay {
    fn drop(&mut self) {
        if let Err(e) = self.conn.free_gc(self.gc) {
            error!(gc = self.gc, error = %e, "failed to free graphics context");
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            error!(window = self.window, error = %e, "failed to destroy overlay window");
        }
        if let Err(e) = self.conn.flush() {
            error!(error = %e, "failed to flush overlay teardown");
        }
    }
}

fn clamp_coord(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn clamp_extent(v: i32) -> u16 {
    v.clamp(1, u16::MAX as i32) as u16
}
