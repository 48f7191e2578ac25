//! Input synthesis primitives
//!
//! Replay only needs five primitives from the platform: move the pointer,
//! press and release a mouse button, press and release a virtual key.
//! Everything else (interpolation, timing, ordering) lives above this seam.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "Left",
            MouseButton::Right => "Right",
            MouseButton::Middle => "Middle",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform input injection.
///
/// Each call must complete before it returns; replay schedules the next
/// delay only after the primitive is done. Return
/// [`ErrorCode::SynthUnavailable`](crate::ErrorCode::SynthUnavailable) when the
/// backend itself is gone so replay can stop instead of skipping.
pub trait InputSynth: Send + Sync {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()>;
    fn press_button(&self, button: MouseButton) -> Result<()>;
    fn release_button(&self, button: MouseButton) -> Result<()>;
    fn press_key(&self, code: u16) -> Result<()>;
    fn release_key(&self, code: u16) -> Result<()>;
}

/// One synthesized primitive, for logging and for test doubles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Primitive {
    MovePointer { x: i32, y: i32 },
    PressButton { button: MouseButton },
    ReleaseButton { button: MouseButton },
    PressKey { code: u16 },
    ReleaseKey { code: u16 },
}

impl Primitive {
    /// Send this primitive through a synth
    pub fn apply(&self, synth: &dyn InputSynth) -> Result<()> {
        match *self {
            Primitive::MovePointer { x, y } => synth.move_pointer(x, y),
            Primitive::PressButton { button } => synth.press_button(button),
            Primitive::ReleaseButton { button } => synth.release_button(button),
            Primitive::PressKey { code } => synth.press_key(code),
            Primitive::ReleaseKey { code } => synth.release_key(code),
        }
    }
}

/// Dry-run synth: logs every primitive instead of touching the OS
#[derive(Debug, Default)]
pub struct LogSynth;

impl LogSynth {
    fn log(&self, p: Primitive) -> Result<()> {
        tracing::info!(primitive = ?p, "dry-run input");
        Ok(())
    }
}

impl InputSynth for LogSynth {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        self.log(Primitive::MovePointer { x, y })
    }

    fn press_button(&self, button: MouseButton) -> Result<()> {
        self.log(Primitive::PressButton { button })
    }

    fn release_button(&self, button: MouseButton) -> Result<()> {
        self.log(Primitive::ReleaseButton { button })
    }

    fn press_key(&self, code: u16) -> Result<()> {
        self.log(Primitive::PressKey { code })
    }

    fn release_key(&self, code: u16) -> Result<()> {
        self.log(Primitive::ReleaseKey { code })
    }
}

/// Windows virtual key codes
pub mod vk {
    pub const BACKSPACE: u16 = 0x08;
    pub const TAB: u16 = 0x09;
    pub const RETURN: u16 = 0x0D;
    pub const SHIFT: u16 = 0x10;
    pub const CONTROL: u16 = 0x11;
    pub const ALT: u16 = 0x12;
    pub const PAUSE: u16 = 0x13;
    pub const CAPS_LOCK: u16 = 0x14;
    pub const ESCAPE: u16 = 0x1B;
    pub const SPACE: u16 = 0x20;
    pub const PAGE_UP: u16 = 0x21;
    pub const PAGE_DOWN: u16 = 0x22;
    pub const END: u16 = 0x23;
    pub const HOME: u16 = 0x24;
    pub const LEFT: u16 = 0x25;
    pub const UP: u16 = 0x26;
    pub const RIGHT: u16 = 0x27;
    pub const DOWN: u16 = 0x28;
    pub const PRINT_SCREEN: u16 = 0x2C;
    pub const INSERT: u16 = 0x2D;
    pub const DELETE: u16 = 0x2E;

    // Digits 0-9 are 0x30-0x39, letters A-Z are 0x41-0x5A
    pub const KEY_0: u16 = 0x30;
    pub const KEY_9: u16 = 0x39;
    pub const A: u16 = 0x41;
    pub const Z: u16 = 0x5A;

    pub const LWIN: u16 = 0x5B;
    pub const RWIN: u16 = 0x5C;

    // F1-F12 are contiguous
    pub const F1: u16 = 0x70;
    pub const F12: u16 = 0x7B;

    pub const LSHIFT: u16 = 0xA0;
    pub const RSHIFT: u16 = 0xA1;
    pub const LCONTROL: u16 = 0xA2;
    pub const RCONTROL: u16 = 0xA3;
    pub const LALT: u16 = 0xA4;
    pub const RALT: u16 = 0xA5;
}

const NAMED_KEYS: &[(u16, &str)] = &[
    (vk::BACKSPACE, "Backspace"),
    (vk::TAB, "Tab"),
    (vk::RETURN, "Enter"),
    (vk::SHIFT, "Shift"),
    (vk::CONTROL, "Ctrl"),
    (vk::ALT, "Alt"),
    (vk::PAUSE, "Pause"),
    (vk::CAPS_LOCK, "CapsLock"),
    (vk::ESCAPE, "Escape"),
    (vk::SPACE, "Space"),
    (vk::PAGE_UP, "PageUp"),
    (vk::PAGE_DOWN, "PageDown"),
    (vk::END, "End"),
    (vk::HOME, "Home"),
    (vk::LEFT, "ArrowLeft"),
    (vk::UP, "ArrowUp"),
    (vk::RIGHT, "ArrowRight"),
    (vk::DOWN, "ArrowDown"),
    (vk::PRINT_SCREEN, "PrintScreen"),
    (vk::INSERT, "Insert"),
    (vk::DELETE, "Delete"),
    (vk::LWIN, "LWin"),
    (vk::RWIN, "RWin"),
    (vk::LSHIFT, "LShift"),
    (vk::RSHIFT, "RShift"),
    (vk::LCONTROL, "LCtrl"),
    (vk::RCONTROL, "RCtrl"),
    (vk::LALT, "LAlt"),
    (vk::RALT, "RAlt"),
];

const ALIASES: &[(&str, u16)] = &[
    ("return", vk::RETURN),
    ("esc", vk::ESCAPE),
    ("control", vk::CONTROL),
    ("menu", vk::ALT),
    ("back", vk::BACKSPACE),
    ("del", vk::DELETE),
    ("pgup", vk::PAGE_UP),
    ("pgdn", vk::PAGE_DOWN),
    ("win", vk::LWIN),
    ("left", vk::LEFT),
    ("up", vk::UP),
    ("right", vk::RIGHT),
    ("down", vk::DOWN),
];

/// Display name for a virtual key code, e.g. `A`, `7`, `F5`, `Enter`.
/// Codes without a name render as `VK<decimal>` and parse back through [`key_code`].
pub fn key_name(code: u16) -> String {
    match code {
        vk::A..=vk::Z | vk::KEY_0..=vk::KEY_9 => char::from(code as u8).to_string(),
        vk::F1..=vk::F12 => format!("F{}", code - vk::F1 + 1),
        _ => NAMED_KEYS
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, n)| n.to_string())
            .unwrap_or_else(|| format!("VK{}", code)),
    }
}

/// Virtual key code for a display name (case-insensitive)
pub fn key_code(name: &str) -> Option<u16> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let c = c.to_ascii_uppercase();
        if c.is_ascii_alphanumeric() {
            return Some(c as u16);
        }
        return None;
    }

    let lower = name.to_ascii_lowercase();
    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u16>().ok()) {
        if (1..=12).contains(&n) {
            return Some(vk::F1 + n - 1);
        }
    }
    if let Some(n) = lower.strip_prefix("vk").and_then(|n| n.parse::<u16>().ok()) {
        return Some(n);
    }

    NAMED_KEYS
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(c, _)| *c)
        .or_else(|| ALIASES.iter().find(|(a, _)| *a == lower).map(|(_, c)| *c))
}
