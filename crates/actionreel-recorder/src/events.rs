//! Action data model
//!
//! Items serialize to compact JSON; the event type is stored as its raw
//! integer code so files stay compatible with the OS message numbering.

use actionreel_core::MouseButton;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event kinds, numbered after the Windows message codes both capture and
/// replay speak.
///
/// | code     | variant      |
/// |----------|--------------|
/// | `0x0100` | `KeyDown`    |
/// | `0x0101` | `KeyUp`      |
/// | `0x0200` | `MouseMove`  |
/// | `0x0201` | `LeftDown`   |
/// | `0x0202` | `LeftUp`     |
/// | `0x0204` | `RightDown`  |
/// | `0x0205` | `RightUp`    |
/// | `0x0207` | `MiddleDown` |
/// | `0x0208` | `MiddleUp`   |
///
/// Any other code is kept verbatim as `Other` so unknown events survive a
/// load/save round trip; replay logs and skips them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum EventType {
    KeyDown,
    KeyUp,
    MouseMove,
    LeftDown,
    LeftUp,
    RightDown,
    RightUp,
    MiddleDown,
    MiddleUp,
    Other(u32),
}

impl EventType {
    pub const KEY_DOWN: u32 = 0x0100;
    pub const KEY_UP: u32 = 0x0101;
    pub const MOUSE_MOVE: u32 = 0x0200;
    pub const LEFT_DOWN: u32 = 0x0201;
    pub const LEFT_UP: u32 = 0x0202;
    pub const RIGHT_DOWN: u32 = 0x0204;
    pub const RIGHT_UP: u32 = 0x0205;
    pub const MIDDLE_DOWN: u32 = 0x0207;
    pub const MIDDLE_UP: u32 = 0x0208;

    pub fn from_code(code: u32) -> Self {
        match code {
            Self::KEY_DOWN => EventType::KeyDown,
            Self::KEY_UP => EventType::KeyUp,
            Self::MOUSE_MOVE => EventType::MouseMove,
            Self::LEFT_DOWN => EventType::LeftDown,
            Self::LEFT_UP => EventType::LeftUp,
            Self::RIGHT_DOWN => EventType::RightDown,
            Self::RIGHT_UP => EventType::RightUp,
            Self::MIDDLE_DOWN => EventType::MiddleDown,
            Self::MIDDLE_UP => EventType::MiddleUp,
            other => EventType::Other(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            EventType::KeyDown => Self::KEY_DOWN,
            EventType::KeyUp => Self::KEY_UP,
            EventType::MouseMove => Self::MOUSE_MOVE,
            EventType::LeftDown => Self::LEFT_DOWN,
            EventType::LeftUp => Self::LEFT_UP,
            EventType::RightDown => Self::RIGHT_DOWN,
            EventType::RightUp => Self::RIGHT_UP,
            EventType::MiddleDown => Self::MIDDLE_DOWN,
            EventType::MiddleUp => Self::MIDDLE_UP,
            EventType::Other(code) => *code,
        }
    }

    pub fn button(button: MouseButton, down: bool) -> Self {
        match (button, down) {
            (MouseButton::Left, true) => EventType::LeftDown,
            (MouseButton::Left, false) => EventType::LeftUp,
            (MouseButton::Right, true) => EventType::RightDown,
            (MouseButton::Right, false) => EventType::RightUp,
            (MouseButton::Middle, true) => EventType::MiddleDown,
            (MouseButton::Middle, false) => EventType::MiddleUp,
        }
    }

    /// Button and direction (`true` = down) for button events
    pub fn as_button(&self) -> Option<(MouseButton, bool)> {
        Some(match self {
            EventType::LeftDown => (MouseButton::Left, true),
            EventType::LeftUp => (MouseButton::Left, false),
            EventType::RightDown => (MouseButton::Right, true),
            EventType::RightUp => (MouseButton::Right, false),
            EventType::MiddleDown => (MouseButton::Middle, true),
            EventType::MiddleUp => (MouseButton::Middle, false),
            _ => return None,
        })
    }

    /// Any button down or up
    pub fn is_click(&self) -> bool {
        self.as_button().is_some()
    }

    pub fn is_key(&self) -> bool {
        matches!(self, EventType::KeyDown | EventType::KeyUp)
    }

    pub fn is_mouse_move(&self) -> bool {
        matches!(self, EventType::MouseMove)
    }
}

impl From<u32> for EventType {
    fn from(code: u32) -> Self {
        Self::from_code(code)
    }
}

impl From<EventType> for u32 {
    fn from(t: EventType) -> Self {
        t.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// One captured or synthesized input event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub event_type: EventType,
    /// Virtual key code; meaningful for key events only
    #[serde(default)]
    pub key_code: u16,
    /// Absolute screen position; mouse events only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Point>,
    /// Relative motion since the previous mouse event
    #[serde(default)]
    pub delta_x: i32,
    #[serde(default)]
    pub delta_y: i32,
    /// Hold time in ms; a key down with a hold is released by replay itself
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl ActionItem {
    pub fn new(event_type: EventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type,
            key_code: 0,
            coordinates: None,
            delta_x: 0,
            delta_y: 0,
            duration_ms: 0,
            timestamp,
        }
    }

    pub fn mouse_move(x: i32, y: i32, timestamp: DateTime<Utc>) -> Self {
        Self::new(EventType::MouseMove, timestamp).at(x, y)
    }

    pub fn button(button: MouseButton, down: bool, timestamp: DateTime<Utc>) -> Self {
        Self::new(EventType::button(button, down), timestamp)
    }

    pub fn key(key_code: u16, down: bool, timestamp: DateTime<Utc>) -> Self {
        let t = if down { EventType::KeyDown } else { EventType::KeyUp };
        Self {
            key_code,
            ..Self::new(t, timestamp)
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.coordinates = Some(Point::new(x, y));
        self
    }

    pub fn with_delta(mut self, dx: i32, dy: i32) -> Self {
        self.delta_x = dx;
        self.delta_y = dy;
        self
    }

    pub fn held_for(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Execution annotation on a group, e.g. `movement_steps` = `60`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionModifier {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

impl ActionModifier {
    pub fn new(name: impl Into<String>, description: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            priority,
        }
    }
}

/// File carried along with a group; `data_ref` is opaque to this crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub filename: String,
    pub content_type: String,
    pub data_ref: String,
}

/// A named, ordered automation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGroup {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type", default = "default_group_type")]
    pub group_type: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<ActionItem>,
    #[serde(default)]
    pub modifiers: Vec<ActionModifier>,
    #[serde(default)]
    pub attached_files: Vec<AttachedFile>,
    /// Pending sync to a remote collaborator
    #[serde(default)]
    pub is_local: bool,
    /// Soft-delete marker; deleted groups stay on disk
    #[serde(default)]
    pub deleted: bool,
}

fn default_group_type() -> String {
    "Custom Action".to_string()
}

impl ActionGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            group_type: default_group_type(),
            description: String::new(),
            created_at: Utc::now(),
            items: Vec::new(),
            modifiers: Vec::new(),
            attached_files: Vec::new(),
            is_local: true,
            deleted: false,
        }
    }

    pub fn with_items(mut self, items: Vec<ActionItem>) -> Self {
        self.items = items;
        self
    }

    /// Recorded span from first to last item
    pub fn duration(&self) -> chrono::Duration {
        match (self.items.first(), self.items.last()) {
            (Some(a), Some(b)) => b.timestamp - a.timestamp,
            _ => chrono::Duration::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_codes_round_trip_through_table() {
        for code in [0x0100, 0x0101, 0x0200, 0x0201, 0x0202, 0x0204, 0x0205, 0x0207, 0x0208, 0x020A] {
            assert_eq!(EventType::from_code(code).code(), code);
        }
        assert_eq!(EventType::from_code(0x0201), EventType::LeftDown);
        assert_eq!(EventType::from_code(0x020A), EventType::Other(0x020A));
    }

    #[test]
    fn event_type_serializes_as_integer() {
        let item = ActionItem::button(MouseButton::Right, false, Utc::now()).at(3, 4);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["event_type"], 0x0205);
        let back: ActionItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn group_defaults_fill_missing_fields() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "name": "legacy",
            "created_at": "2024-05-01T10:00:00Z",
        });
        let g: ActionGroup = serde_json::from_value(json).unwrap();
        assert_eq!(g.group_type, "Custom Action");
        assert!(g.items.is_empty());
        assert!(!g.deleted);
    }
}
