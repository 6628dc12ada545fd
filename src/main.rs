#![forbid(unsafe_code)]

mod capture;
mod config;
mod constants;
mod cycle;
mod events;
mod hotkeys;
mod indicator;
mod overlay;
mod preview;
mod reconciler;
mod snapping;
mod types;
mod x11;

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use capture::SharedProvider;
use config::Config;
use constants::{indicator as indicator_consts, marker, mouse, poll};
use cycle::CycleCoordinator;
use events::{AppEvent, PointerEvent};
use indicator::ActiveIndicator;
use overlay::OverlayFactory;
use reconciler::Reconciler;
use types::{Rect, WindowHandle};
use x11::X11Backend;

/// Live preview thumbnails and focus cycling for multiboxed game clients.
#[derive(Debug, Parser)]
#[command(name = "multibox-preview", version)]
struct Cli {
    /// Config file location (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Title substring identifying game client windows.
    #[arg(long)]
    marker: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(cli.config.unwrap_or_else(Config::default_path));
    let game_marker = cli
        .marker
        .unwrap_or_else(|| marker::DEFAULT_GAME_MARKER.to_string());
    info!(marker = %game_marker, "starting up");

    let backend = X11Backend::connect(config.settings.thumbnail_opacity)?;
    let provider: SharedProvider = Arc::new(Mutex::new(backend.provider()));
    let mut factory = backend.overlay_factory();

    let indicator_overlay = factory
        .create_overlay("active indicator", Rect::new(0, 0, 1, 1))
        .context("failed to create indicator overlay")?;
    let indicator = ActiveIndicator::new(
        indicator_overlay,
        config.active_border_rgb(),
        indicator_consts::BORDER_WIDTH,
        config.settings.enable_borders,
    );

    let (tx, rx) = mpsc::channel();
    let mut reconciler = Reconciler::new(game_marker.clone(), tx.clone(), indicator);
    let mut cycle = CycleCoordinator::new(config.hotkeys.character_list.clone(), game_marker);

    // Hotkeys are best-effort; everything else works without them.
    let _hotkey_handles = if hotkeys::check_permissions() {
        match hotkeys::spawn_listener(tx.clone()) {
            Ok(handles) => {
                info!("hotkey support enabled (Tab / Shift+Tab)");
                Some(handles)
            }
            Err(e) => {
                error!(error = %e, "failed to start hotkey listener");
                hotkeys::print_permission_error();
                None
            }
        }
    } else {
        hotkeys::print_permission_error();
        None
    };

    let _pump = backend.spawn_event_pump(tx);

    run_loop(
        rx,
        &provider,
        &mut factory,
        &mut config,
        &mut reconciler,
        &mut cycle,
    )
}

/// Single coordination loop: drain app events between fixed-period
/// reconciliation deadlines. All state mutation happens on this thread.
fn run_loop(
    rx: Receiver<AppEvent>,
    provider: &SharedProvider,
    factory: &mut dyn OverlayFactory,
    config: &mut Config,
    reconciler: &mut Reconciler,
    cycle: &mut CycleCoordinator,
) -> Result<()> {
    let period = Duration::from_millis(poll::INTERVAL_MS);
    let mut dragging: Option<WindowHandle> = None;
    let mut next_poll = Instant::now();

    loop {
        if Instant::now() >= next_poll {
            if let Err(e) = reconciler.poll(provider, factory, config) {
                error!(error = %e, "reconciliation pass failed");
            }
            next_poll = Instant::now() + period;
        }

        let timeout = next_poll.saturating_duration_since(Instant::now());
        match rx.recv_timeout(timeout) {
            Ok(event) => {
                if let Err(e) = handle_event(
                    event,
                    provider,
                    config,
                    reconciler,
                    cycle,
                    &mut dragging,
                ) {
                    error!(error = %e, "error handling event");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!("all event producers disconnected")
            }
        }
    }
}

fn handle_event(
    event: AppEvent,
    provider: &SharedProvider,
    config: &mut Config,
    reconciler: &mut Reconciler,
    cycle: &mut CycleCoordinator,
    dragging: &mut Option<WindowHandle>,
) -> Result<()> {
    match event {
        AppEvent::Frame { handle, image } => reconciler.handle_frame(handle, &image),
        AppEvent::CaptureFailed { handle } => reconciler.handle_capture_failure(handle),
        AppEvent::Key(key) => cycle.handle_key(key, provider, reconciler),
        AppEvent::Pointer(pointer) => {
            handle_pointer(pointer, provider, config, reconciler, cycle, dragging)
        }
    }
}

fn handle_pointer(
    pointer: PointerEvent,
    provider: &SharedProvider,
    config: &mut Config,
    reconciler: &mut Reconciler,
    cycle: &mut CycleCoordinator,
    dragging: &mut Option<WindowHandle>,
) -> Result<()> {
    match pointer {
        PointerEvent::Press { button, x, y } => {
            let Some(handle) = reconciler.surface_at(x, y) else {
                return Ok(());
            };
            if button == mouse::BUTTON_DRAG {
                reconciler.begin_drag(handle, x, y);
                *dragging = Some(handle);
            } else if button == mouse::BUTTON_ACTIVATE {
                activate(handle, provider, reconciler, cycle)?;
            }
            Ok(())
        }
        PointerEvent::Motion { x, y } => {
            let Some(handle) = *dragging else {
                return Ok(());
            };
            reconciler.drag_to(handle, x, y)
        }
        PointerEvent::Release { button, .. } => {
            if button != mouse::BUTTON_DRAG {
                return Ok(());
            }
            let Some(handle) = dragging.take() else {
                return Ok(());
            };
            reconciler.end_drag(handle, config)
        }
    }
}

/// Click-to-activate: raise and focus the client, then record it as active.
/// The focus request is best-effort; the indicator still moves so the UI
/// reflects the user's intent.
fn activate(
    handle: WindowHandle,
    provider: &SharedProvider,
    reconciler: &mut Reconciler,
    cycle: &mut CycleCoordinator,
) -> Result<()> {
    if let Err(e) = capture::lock(provider)?.focus_and_raise(handle) {
        warn!(%handle, error = %e, "focus-and-raise failed");
    }
    if reconciler.get_active_client() != Some(handle) {
        reconciler.set_active_client(handle)?;
        cycle.sync_cursor_to(handle, provider)?;
    }
    Ok(())
}
