use anyhow::{anyhow, Result};
use rdev::Key;

use crate::config::HotkeyConfig;

/// A configured modifier, matching either physical variant of the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modifier {
    variants: &'static [Key],
}

impl Modifier {
    /// Whether `key` is one of this modifier's physical variants
    #[must_use]
    pub fn matches(&self, key: Key) -> bool {
        self.variants.contains(&key)
    }
}

/// A fully resolved hotkey combination
#[derive(Debug, Clone)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    pub trigger: Key,
}

/// Resolve configured hotkey names to key codes.
///
/// # Errors
/// Returns error on any unrecognized modifier or key name. Resolution runs
/// at configuration-load time so a bad name fails startup, not a keypress.
pub fn resolve(config: &HotkeyConfig) -> Result<KeyCombo> {
    let mut modifiers = Vec::with_capacity(config.modifiers.len());
    for name in &config.modifiers {
        modifiers.push(parse_modifier(name)?);
    }
    let trigger = parse_key(&config.key)?;
    Ok(KeyCombo { modifiers, trigger })
}

fn parse_modifier(name: &str) -> Result<Modifier> {
    const CONTROL: &[Key] = &[Key::ControlLeft, Key::ControlRight];
    const ALT: &[Key] = &[Key::Alt, Key::AltGr];
    const SHIFT: &[Key] = &[Key::ShiftLeft, Key::ShiftRight];
    const META: &[Key] = &[Key::MetaLeft, Key::MetaRight];

    let variants = match name {
        "Control" | "Ctrl" => CONTROL,
        "Alt" | "Option" => ALT,
        "Shift" => SHIFT,
        "Super" | "Command" | "Meta" => META,
        _ => return Err(anyhow!("unknown modifier: {}", name)),
    };
    Ok(Modifier { variants })
}

fn parse_key(name: &str) -> Result<Key> {
    let key = match name {
        "A" => Key::KeyA,
        "B" => Key::KeyB,
        "C" => Key::KeyC,
        "D" => Key::KeyD,
        "E" => Key::KeyE,
        "F" => Key::KeyF,
        "G" => Key::KeyG,
        "H" => Key::KeyH,
        "I" => Key::KeyI,
        "J" => Key::KeyJ,
        "K" => Key::KeyK,
        "L" => Key::KeyL,
        "M" => Key::KeyM,
        "N" => Key::KeyN,
        "O" => Key::KeyO,
        "P" => Key::KeyP,
        "Q" => Key::KeyQ,
        "R" => Key::KeyR,
        "S" => Key::KeyS,
        "T" => Key::KeyT,
        "U" => Key::KeyU,
        "V" => Key::KeyV,
        "W" => Key::KeyW,
        "X" => Key::KeyX,
        "Y" => Key::KeyY,
        "Z" => Key::KeyZ,
        "0" => Key::Num0,
        "1" => Key::Num1,
        "2" => Key::Num2,
        "3" => Key::Num3,
        "4" => Key::Num4,
        "5" => Key::Num5,
        "6" => Key::Num6,
        "7" => Key::Num7,
        "8" => Key::Num8,
        "9" => Key::Num9,
        "F1" => Key::F1,
        "F2" => Key::F2,
        "F3" => Key::F3,
        "F4" => Key::F4,
        "F5" => Key::F5,
        "F6" => Key::F6,
        "F7" => Key::F7,
        "F8" => Key::F8,
        "F9" => Key::F9,
        "F10" => Key::F10,
        "F11" => Key::F11,
        "F12" => Key::F12,
        "Space" => Key::Space,
        _ => return Err(anyhow!("unsupported key: {}", name)),
    };
    Ok(key)
}
