use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{Key, NamedKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hotkey {
    Quit,
    ToggleGui,
    ToggleVsync,
    QuickSave,
    QuickLoad,
    ReloadShaders,
    ScreenshotLdr,
    ScreenshotHdr,
}

pub(crate) fn hotkey_for(key: &Key) -> Option<Hotkey> {
    match key {
        Key::Named(NamedKey::Escape) => Some(Hotkey::Quit),
        Key::Named(NamedKey::F1) => Some(Hotkey::ToggleGui),
        Key::Named(NamedKey::F2) => Some(Hotkey::ToggleVsync),
        Key::Named(NamedKey::F3) => Some(Hotkey::QuickSave),
        Key::Named(NamedKey::F4) => Some(Hotkey::QuickLoad),
        Key::Named(NamedKey::F5) => Some(Hotkey::ReloadShaders),
        Key::Named(NamedKey::F10) => Some(Hotkey::ScreenshotLdr),
        Key::Named(NamedKey::F12) => Some(Hotkey::ScreenshotHdr),
        _ => None,
    }
}

/// Hotkeys pressed since the last frame. Only the transition to pressed
/// counts; held keys and auto-repeat do not fire again.
#[derive(Debug, Default)]
pub(crate) struct HotkeyQueue {
    pending: Vec<Hotkey>,
}

impl HotkeyQueue {
    pub fn handle_event(&mut self, event: &KeyEvent) {
        if event.state == ElementState::Pressed && !event.repeat {
            self.push(&event.logical_key);
        }
    }

    fn push(&mut self, key: &Key) {
        if let Some(hotkey) = hotkey_for(key) {
            if !self.pending.contains(&hotkey) {
                self.pending.push(hotkey);
            }
        }
    }

    pub fn drain(&mut self) -> Vec<Hotkey> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_function_keys() {
        assert_eq!(hotkey_for(&Key::Named(NamedKey::F2)), Some(Hotkey::ToggleVsync));
        assert_eq!(hotkey_for(&Key::Named(NamedKey::F12)), Some(Hotkey::ScreenshotHdr));
        assert_eq!(hotkey_for(&Key::Named(NamedKey::F11)), None);
        assert_eq!(hotkey_for(&Key::Character("a".into())), None);
    }

    #[test]
    fn repeated_presses_collapse_per_frame() {
        let mut queue = HotkeyQueue::default();
        queue.push(&Key::Named(NamedKey::F10));
        queue.push(&Key::Named(NamedKey::F10));
        queue.push(&Key::Named(NamedKey::F3));
        assert_eq!(queue.drain(), vec![Hotkey::ScreenshotLdr, Hotkey::QuickSave]);
        assert!(queue.drain().is_empty());
    }
}
