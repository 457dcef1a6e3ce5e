/// Hotkey name resolution (config names to key codes)
pub mod keymap;
/// Held-key tracking and the hotkey watcher thread
pub mod watcher;

pub use keymap::KeyCombo;
pub use watcher::{ComboTracker, HotkeyWatcher, KeyNotification, ToggleHandler};
