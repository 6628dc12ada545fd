use anyhow::Result;
use tracing::{debug, info, warn};

use crate::capture::{self, SharedProvider};
use crate::events::KeyEvent;
use crate::reconciler::Reconciler;
use crate::types::{display_name, WindowHandle};

/// Drives hotkey cycling through the user's ordered character list. The
/// cursor indexes into the list filtered to currently-open windows and is
/// recomputed fresh on every cycle, because the filtered list's composition
/// can change between cycles.
pub struct CycleCoordinator {
    ordered_names: Vec<String>,
    cursor: isize,
    modifier_held: bool,
    hotkey_held: bool,
    marker: String,
}

impl CycleCoordinator {
    pub fn new(ordered_names: Vec<String>, marker: String) -> Self {
        Self {
            ordered_names,
            cursor: -1,
            modifier_held: false,
            hotkey_held: false,
            marker,
        }
    }

    /// Two-key state machine: the modifier only flips a flag; the trigger
    /// latches on press (so holding it produces exactly one cycle) and
    /// re-arms on release. Cycling only fires while a game window holds OS
    /// input focus.
    pub fn handle_key(
        &mut self,
        key: KeyEvent,
        provider: &SharedProvider,
        reconciler: &mut Reconciler,
    ) -> Result<()> {
        match key {
            KeyEvent::ModifierDown => self.modifier_held = true,
            KeyEvent::ModifierUp => self.modifier_held = false,
            KeyEvent::TriggerUp => self.hotkey_held = false,
            KeyEvent::TriggerDown => {
                if self.hotkey_held {
                    return Ok(());
                }
                self.hotkey_held = true;
                if !self.game_window_focused(provider)? {
                    debug!("cycle hotkey ignored, no game window has OS focus");
                    return Ok(());
                }
                self.cycle(self.modifier_held, provider, reconciler)?;
            }
        }
        Ok(())
    }

    /// OS input focus check, distinct from the reconciler's own
    /// active-client notion.
    fn game_window_focused(&self, provider: &SharedProvider) -> Result<bool> {
        let title = capture::lock(provider)?.focused_window_title()?;
        Ok(title.is_some_and(|t| t.contains(&self.marker)))
    }

    /// Advance through the configured order filtered to open windows, wrap
    /// around at either end, focus the selected client, and record it as
    /// active.
    pub fn cycle(
        &mut self,
        reverse: bool,
        provider: &SharedProvider,
        reconciler: &mut Reconciler,
    ) -> Result<()> {
        let open = self.ordered_open(provider)?;
        if open.is_empty() {
            debug!("cycle requested but no configured character has an open window");
            return Ok(());
        }
        let len = open.len() as isize;
        self.cursor = if self.cursor < 0 {
            if reverse { len - 1 } else { 0 }
        } else if reverse {
            (self.cursor - 1).rem_euclid(len)
        } else {
            (self.cursor + 1).rem_euclid(len)
        };
        let (handle, name) = &open[self.cursor as usize];
        info!(%handle, name = %name, reverse, "cycling focus");
        if let Err(err) = capture::lock(provider)?.focus_and_raise(*handle) {
            warn!(%handle, error = %err, "focus-and-raise failed");
        }
        reconciler.set_active_client(*handle)
    }

    /// Keep manual clicks consistent with subsequent hotkey cycles: point
    /// the cursor at the entry resolving to `handle`, or leave it unchanged
    /// when the handle is not in the filtered list.
    pub fn sync_cursor_to(&mut self, handle: WindowHandle, provider: &SharedProvider) -> Result<()> {
        let open = self.ordered_open(provider)?;
        if let Some(index) = open.iter().position(|(h, _)| *h == handle) {
            self.cursor = index as isize;
        }
        Ok(())
    }

    /// The configured order filtered to names with a currently-open window
    /// (case-sensitive exact match on derived display names). Two open
    /// windows sharing a display name collapse to the first one listed.
    fn ordered_open(&self, provider: &SharedProvider) -> Result<Vec<(WindowHandle, String)>> {
        let windows = capture::lock(provider)?.list_windows()?;
        let open: Vec<(WindowHandle, String)> = windows
            .iter()
            .filter(|info| info.title.contains(&self.marker))
            .map(|info| (info.handle, display_name(&info.title)))
            .collect();
        Ok(self
            .ordered_names
            .iter()
            .filter_map(|name| {
                open.iter()
                    .find(|(_, open_name)| open_name == name)
                    .map(|(handle, _)| (*handle, name.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::capture::mock::MockProvider;
    use crate::config::Config;
    use crate::events::AppEvent;
    use crate::indicator::ActiveIndicator;
    use crate::overlay::mock::MockFactory;
    use crate::overlay::OverlayFactory;
    use crate::types::Rect;

    struct Fixture {
        cycle: CycleCoordinator,
        reconciler: Reconciler,
        provider: Arc<Mutex<MockProvider>>,
        shared: SharedProvider,
        _rx: mpsc::Receiver<AppEvent>,
    }

    fn fixture(order: &[&str], windows: Vec<(u32, &str)>) -> Fixture {
        let provider = Arc::new(Mutex::new(MockProvider::with_windows(windows)));
        provider.lock().unwrap().focused_title = Some("EVE - Alice".to_string());
        let shared: SharedProvider = provider.clone();
        let (tx, rx) = mpsc::channel();
        let mut factory = MockFactory::default();
        let overlay = factory
            .create_overlay("indicator", Rect::new(0, 0, 1, 1))
            .unwrap();
        let indicator = ActiveIndicator::new(overlay, [0, 255, 0], 3, true);
        let mut reconciler = Reconciler::new("EVE - ".to_string(), tx, indicator);
        reconciler
            .poll(&shared, &mut factory, &Config::default())
            .unwrap();
        let cycle = CycleCoordinator::new(
            order.iter().map(|s| s.to_string()).collect(),
            "EVE - ".to_string(),
        );
        Fixture {
            cycle,
            reconciler,
            provider,
            shared,
            _rx: rx,
        }
    }

    fn eve_windows() -> Vec<(u32, &'static str)> {
        vec![(1, "EVE - Alice"), (2, "EVE - Bob"), (3, "EVE - Carol")]
    }

    #[test]
    fn first_forward_cycle_selects_the_first_open_name() {
        let mut fx = fixture(&["Alice", "Bob", "Carol"], eve_windows());
        fx.cycle.cycle(false, &fx.shared, &mut fx.reconciler).unwrap();
        assert_eq!(fx.reconciler.get_active_client(), Some(WindowHandle(1)));
        assert_eq!(
            fx.provider.lock().unwrap().focus_requests,
            vec![WindowHandle(1)]
        );
    }

    #[test]
    fn forward_cycles_wrap_around() {
        let mut fx = fixture(&["Alice", "Bob", "Carol"], eve_windows());
        for expected in [1, 2, 3, 1] {
            fx.cycle.cycle(false, &fx.shared, &mut fx.reconciler).unwrap();
            assert_eq!(
                fx.reconciler.get_active_client(),
                Some(WindowHandle(expected))
            );
        }
    }

    #[test]
    fn reverse_from_the_first_entry_wraps_to_the_last() {
        let mut fx = fixture(&["Alice", "Bob", "Carol"], eve_windows());
        // Land on Alice (index 0), then reverse.
        fx.cycle.cycle(false, &fx.shared, &mut fx.reconciler).unwrap();
        fx.cycle.cycle(true, &fx.shared, &mut fx.reconciler).unwrap();
        assert_eq!(fx.reconciler.get_active_client(), Some(WindowHandle(3)));
    }

    #[test]
    fn first_ever_reverse_cycle_selects_the_last_open_name() {
        let mut fx = fixture(&["Alice", "Bob", "Carol"], eve_windows());
        fx.cycle.cycle(true, &fx.shared, &mut fx.reconciler).unwrap();
        assert_eq!(fx.reconciler.get_active_client(), Some(WindowHandle(3)));
    }

    #[test]
    fn cycling_skips_names_with_no_open_window() {
        let mut fx = fixture(
            &["Alice", "Bob", "Carol"],
            vec![(1, "EVE - Alice"), (3, "EVE - Carol")],
        );
        for expected in [1, 3, 1] {
            fx.cycle.cycle(false, &fx.shared, &mut fx.reconciler).unwrap();
            assert_eq!(
                fx.reconciler.get_active_client(),
                Some(WindowHandle(expected))
            );
        }
        let requests = &fx.provider.lock().unwrap().focus_requests;
        assert!(!requests.contains(&WindowHandle(2)));
    }

    #[test]
    fn cycle_with_no_open_characters_is_a_no_op() {
        let mut fx = fixture(&["Dora"], eve_windows());
        fx.cycle.cycle(false, &fx.shared, &mut fx.reconciler).unwrap();
        assert_eq!(fx.reconciler.get_active_client(), None);
        assert!(fx.provider.lock().unwrap().focus_requests.is_empty());
    }

    #[test]
    fn holding_the_trigger_fires_exactly_once() {
        let mut fx = fixture(&["Alice", "Bob", "Carol"], eve_windows());
        fx.cycle
            .handle_key(KeyEvent::TriggerDown, &fx.shared, &mut fx.reconciler)
            .unwrap();
        // Key repeat while held delivers more presses; all ignored.
        fx.cycle
            .handle_key(KeyEvent::TriggerDown, &fx.shared, &mut fx.reconciler)
            .unwrap();
        fx.cycle
            .handle_key(KeyEvent::TriggerDown, &fx.shared, &mut fx.reconciler)
            .unwrap();
        assert_eq!(fx.provider.lock().unwrap().focus_requests.len(), 1);

        // Release re-arms the trigger.
        fx.cycle
            .handle_key(KeyEvent::TriggerUp, &fx.shared, &mut fx.reconciler)
            .unwrap();
        fx.cycle
            .handle_key(KeyEvent::TriggerDown, &fx.shared, &mut fx.reconciler)
            .unwrap();
        assert_eq!(fx.provider.lock().unwrap().focus_requests.len(), 2);
    }

    #[test]
    fn trigger_does_nothing_without_game_focus() {
        let mut fx = fixture(&["Alice"], eve_windows());
        fx.provider.lock().unwrap().focused_title = Some("Text Editor".to_string());
        fx.cycle
            .handle_key(KeyEvent::TriggerDown, &fx.shared, &mut fx.reconciler)
            .unwrap();
        assert!(fx.provider.lock().unwrap().focus_requests.is_empty());
        assert_eq!(fx.reconciler.get_active_client(), None);
    }

    #[test]
    fn modifier_turns_the_trigger_into_a_reverse_cycle() {
        let mut fx = fixture(&["Alice", "Bob", "Carol"], eve_windows());
        fx.cycle
            .handle_key(KeyEvent::ModifierDown, &fx.shared, &mut fx.reconciler)
            .unwrap();
        fx.cycle
            .handle_key(KeyEvent::TriggerDown, &fx.shared, &mut fx.reconciler)
            .unwrap();
        assert_eq!(fx.reconciler.get_active_client(), Some(WindowHandle(3)));
    }

    #[test]
    fn sync_cursor_keeps_clicks_consistent_with_cycling() {
        let mut fx = fixture(&["Alice", "Bob", "Carol"], eve_windows());
        // Simulate a click on Bob's preview.
        fx.cycle.sync_cursor_to(WindowHandle(2), &fx.shared).unwrap();
        fx.cycle.cycle(false, &fx.shared, &mut fx.reconciler).unwrap();
        assert_eq!(fx.reconciler.get_active_client(), Some(WindowHandle(3)));
    }

    #[test]
    fn sync_cursor_with_unknown_handle_leaves_the_cursor_alone() {
        let mut fx = fixture(&["Alice", "Bob", "Carol"], eve_windows());
        fx.cycle.cycle(false, &fx.shared, &mut fx.reconciler).unwrap();
        fx.cycle.sync_cursor_to(WindowHandle(99), &fx.shared).unwrap();
        fx.cycle.cycle(false, &fx.shared, &mut fx.reconciler).unwrap();
        assert_eq!(fx.reconciler.get_active_client(), Some(WindowHandle(2)));
    }
}
