use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use image::RgbaImage;

use crate::types::{WindowHandle, WindowInfo};

/// Terminal capture failure for a single window. A surface that sees one of
/// these stops its refresh loop and tears itself down; the rest of the
/// system is unaffected.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("window {0} is gone")]
    WindowGone(WindowHandle),
    #[error("capture returned a degenerate {width}x{height} image")]
    Degenerate { width: u32, height: u32 },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Swappable backend that talks to the display server. The underlying
/// connection may not be thread-safe, so every caller goes through the
/// shared mutex ([`SharedProvider`]).
pub trait CaptureProvider: Send {
    /// Enumerate currently open top-level windows with their titles.
    fn list_windows(&mut self) -> Result<Vec<WindowInfo>>;

    /// Capture the current contents of `handle` at native size.
    fn capture_window(&mut self, handle: WindowHandle) -> Result<RgbaImage, CaptureError>;

    /// Ask the window manager to focus and raise `handle`. Best effort;
    /// callers log and swallow failures.
    fn focus_and_raise(&mut self, handle: WindowHandle) -> Result<()>;

    /// Title of the window that currently holds OS input focus, if any.
    /// This is OS focus, not the coordinator's own active-client notion.
    fn focused_window_title(&mut self) -> Result<Option<String>>;
}

pub type SharedProvider = Arc<Mutex<dyn CaptureProvider>>;

/// Serialize access to the provider. Poisoning means a capture task
/// panicked mid-call; surfaced as an error rather than propagating the
/// panic onto the coordination thread.
pub fn lock(provider: &SharedProvider) -> Result<MutexGuard<'_, dyn CaptureProvider + 'static>> {
    provider
        .lock()
        .map_err(|_| anyhow::anyhow!("capture provider lock poisoned"))
}

#[cfg(test)]
pub mod mock {
    use super::*;

    /// In-memory provider for coordinator tests. Records focus requests and
    /// serves a fixed window list.
    #[derive(Default)]
    pub struct MockProvider {
        pub windows: Vec<WindowInfo>,
        pub fail_listing: bool,
        pub focused_title: Option<String>,
        pub focus_requests: Vec<WindowHandle>,
    }

    impl MockProvider {
        pub fn with_windows(windows: Vec<(u32, &str)>) -> Self {
            Self {
                windows: windows
                    .into_iter()
                    .map(|(id, title)| WindowInfo {
                        handle: WindowHandle(id),
                        title: title.to_string(),
                    })
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl CaptureProvider for MockProvider {
        fn list_windows(&mut self) -> Result<Vec<WindowInfo>> {
            if self.fail_listing {
                anyhow::bail!("listing failed");
            }
            Ok(self.windows.clone())
        }

        fn capture_window(&mut self, _handle: WindowHandle) -> Result<RgbaImage, CaptureError> {
            Ok(RgbaImage::new(64, 48))
        }

        fn focus_and_raise(&mut self, handle: WindowHandle) -> Result<()> {
            self.focus_requests.push(handle);
            Ok(())
        }

        fn focused_window_title(&mut self) -> Result<Option<String>> {
            Ok(self.focused_title.clone())
        }
    }
}
