//! Display summary: collapse runs of similar consecutive items
//!
//! Read-only. The entries carry clones of the items they cover for
//! inspection, the group's own item list stays canonical.

use crate::events::{ActionItem, Point};
use crate::text::describe;
use actionreel_core::key_name;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupKind {
    #[serde(rename = "Mouse Movements")]
    MouseMovements,
    #[serde(rename = "Key Repetition")]
    KeyRepetition,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::MouseMovements => "Mouse Movements",
            GroupKind::KeyRepetition => "Key Repetition",
        }
    }
}

/// One row of the summarized view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayEntry {
    /// Position of the first covered item in the group
    pub index: usize,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_type: Option<GroupKind>,
    pub group_count: usize,
    pub first_timestamp: DateTime<Utc>,
    /// Span from first to last covered item
    pub duration_ms: i64,
    /// Net pointer travel across a movement group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub displacement: Option<Point>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ActionItem>,
}

impl DisplayEntry {
    pub fn is_group(&self) -> bool {
        self.group_type.is_some()
    }

    fn single(index: usize, item: &ActionItem) -> Self {
        Self {
            index,
            description: describe(item),
            group_type: None,
            group_count: 1,
            first_timestamp: item.timestamp,
            duration_ms: 0,
            displacement: None,
            items: Vec::new(),
        }
    }

    fn group(index: usize, kind: GroupKind, run: &[ActionItem]) -> Self {
        let (first, last) = (&run[0], &run[run.len() - 1]);
        let description = match kind {
            GroupKind::MouseMovements => format!("Mouse Movement Path ({} steps)", run.len()),
            GroupKind::KeyRepetition => {
                format!("Repeated Key {} ({} times)", key_name(first.key_code), run.len())
            }
        };
        let displacement = match (kind, first.coordinates, last.coordinates) {
            (GroupKind::MouseMovements, Some(a), Some(b)) => Some(Point::new(
                b.x.saturating_sub(a.x),
                b.y.saturating_sub(a.y),
            )),
            _ => None,
        };

        Self {
            index,
            description,
            group_type: Some(kind),
            group_count: run.len(),
            first_timestamp: first.timestamp,
            duration_ms: (last.timestamp - first.timestamp).num_milliseconds(),
            displacement,
            items: run.to_vec(),
        }
    }
}

/// Collapse runs of moves and same-key events. Runs of one stay ordinary entries.
pub fn summarize(items: &[ActionItem]) -> Vec<DisplayEntry> {
    let mut entries = Vec::new();
    let mut i = 0;

    while i < items.len() {
        let item = &items[i];
        let kind = if item.event_type.is_mouse_move() {
            Some(GroupKind::MouseMovements)
        } else if item.event_type.is_key() {
            Some(GroupKind::KeyRepetition)
        } else {
            None
        };

        let run_len = match kind {
            Some(GroupKind::MouseMovements) => items[i..]
                .iter()
                .take_while(|n| n.event_type.is_mouse_move())
                .count(),
            Some(GroupKind::KeyRepetition) => items[i..]
                .iter()
                .take_while(|n| n.event_type.is_key() && n.key_code == item.key_code)
                .count(),
            None => 1,
        };

        match kind {
            Some(kind) if run_len > 1 => {
                entries.push(DisplayEntry::group(i, kind, &items[i..i + run_len]))
            }
            _ => entries.push(DisplayEntry::single(i, item)),
        }
        i += run_len.max(1);
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionreel_core::MouseButton;
    use chrono::{Duration, TimeZone};

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn moves_then_click_make_two_entries() {
        let mut items: Vec<_> = (0..15)
            .map(|i| ActionItem::mouse_move(10 + i * 3, 20 + i, ts(i as i64 * 16)))
            .collect();
        items.push(ActionItem::button(MouseButton::Left, true, ts(300)).at(52, 34));
        let before = items.clone();

        let entries = summarize(&items);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].group_type, Some(GroupKind::MouseMovements));
        assert_eq!(entries[0].group_count, 15);
        assert_eq!(entries[0].items.len(), 15);
        assert_eq!(entries[0].duration_ms, 14 * 16);
        assert_eq!(entries[0].displacement, Some(Point::new(42, 14)));
        assert_eq!(entries[0].description, "Mouse Movement Path (15 steps)");
        assert!(!entries[1].is_group());
        assert_eq!(entries[1].index, 15);
        assert_eq!(entries[1].description, "Left Click at X:52, Y:34");
        assert_eq!(items, before);
    }

    #[test]
    fn same_key_run_collapses() {
        let items = vec![
            ActionItem::key(0x41, true, ts(0)),
            ActionItem::key(0x41, false, ts(40)),
            ActionItem::key(0x41, true, ts(90)),
            ActionItem::key(0x42, true, ts(120)),
        ];
        let entries = summarize(&items);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].group_type, Some(GroupKind::KeyRepetition));
        assert_eq!(entries[0].group_count, 3);
        assert_eq!(entries[0].description, "Repeated Key A (3 times)");
        assert_eq!(entries[0].displacement, None);
        assert_eq!(entries[1].group_count, 1);
        assert_eq!(entries[1].index, 3);
    }

    #[test]
    fn isolated_items_stay_single() {
        let items = vec![
            ActionItem::mouse_move(1, 1, ts(0)),
            ActionItem::button(MouseButton::Right, true, ts(10)),
            ActionItem::button(MouseButton::Right, true, ts(20)),
            ActionItem::key(0x0D, true, ts(30)),
            ActionItem::mouse_move(2, 2, ts(40)),
        ];
        let entries = summarize(&items);
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| !e.is_group() && e.items.is_empty()));
        assert!(summarize(&[]).is_empty());
    }

    #[test]
    fn group_kind_serializes_as_label() {
        let json = serde_json::to_value(GroupKind::KeyRepetition).unwrap();
        assert_eq!(json, "Key Repetition");
        assert_eq!(GroupKind::MouseMovements.as_str(), "Mouse Movements");
    }

    #[test]
    fn displacement_saturates_on_extreme_coordinates() {
        let items = vec![
            ActionItem::mouse_move(i32::MIN, i32::MAX, ts(0)),
            ActionItem::mouse_move(i32::MAX, i32::MIN, ts(10)),
        ];
        let entries = summarize(&items);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].displacement, Some(Point::new(i32::MAX, i32::MIN)));
    }
}
