//! Editable text form of an action group
//!
//! One item per line:
//!
//! ```text
//! Description: Left Click at X:100, Y:200 | Key:  | Code: 0 | MouseButton: Left Down | Timestamp: 2024-03-01T12:00:00.000000Z
//! ```
//!
//! Parsing is lenient. Each line is read as labeled fields split on `" | "`,
//! then as labels scattered anywhere in the line, then as a bare phrase
//! (`Mouse Move to X:500, Y:300`, `Key A Down (Code: 65)`). Lines that still
//! say nothing recognizable are skipped with a reason instead of failing the
//! whole edit.

use crate::events::{ActionGroup, ActionItem, EventType, Point};
use actionreel_core::{key_code, key_name, MouseButton};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

const DESCRIPTION: &str = "Description:";
const KEY: &str = "Key:";
const CODE: &str = "Code:";
const MOUSE_BUTTON: &str = "MouseButton:";
const TIMESTAMP: &str = "Timestamp:";

const LABELS: [&str; 5] = [DESCRIPTION, KEY, CODE, MOUSE_BUTTON, TIMESTAMP];

const EXPLICIT_TYPE: &str = "Action Type:";

/// Naive formats tried after RFC 3339, in order. Naive times are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%Y-%m-%d %H:%M",
];

/// Edits that shrink a group this large are checked by [`loses_data`]
const GUARD_MIN_ORIGINAL: usize = 50;
const GUARD_MIN_PARSED: usize = 10;

// ============================================================================
// Serialize
// ============================================================================

/// Human description of an item, also the free-text form the parser accepts
pub fn describe(item: &ActionItem) -> String {
    let at = item
        .coordinates
        .map(|p| format!(" at X:{}, Y:{}", p.x, p.y))
        .unwrap_or_default();

    match item.event_type {
        EventType::MouseMove => match item.coordinates {
            Some(p) => format!("Mouse Move to X:{}, Y:{}", p.x, p.y),
            None => "Mouse Move".to_string(),
        },
        EventType::KeyDown | EventType::KeyUp => {
            let dir = if item.event_type == EventType::KeyDown { "Down" } else { "Up" };
            format!("Key {} {} (Code: {})", key_name(item.key_code), dir, item.key_code)
        }
        other => match other.as_button() {
            Some((button, true)) => format!("{} Click{}", button, at),
            Some((button, false)) => format!("{} Click Up{}", button, at),
            None => format!("{}{}{}", EXPLICIT_TYPE, other.code(), at),
        },
    }
}

/// One canonical line for an item
pub fn serialize_item(item: &ActionItem) -> String {
    let key = if item.event_type.is_key() {
        key_name(item.key_code)
    } else {
        String::new()
    };
    let button = item
        .event_type
        .as_button()
        .map(|(b, down)| format!("{} {}", b, if down { "Down" } else { "Up" }))
        .unwrap_or_default();

    format!(
        "{} {} | {} {} | {} {} | {} {} | {} {}",
        DESCRIPTION,
        describe(item),
        KEY,
        key,
        CODE,
        item.key_code,
        MOUSE_BUTTON,
        button,
        TIMESTAMP,
        item.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
    )
}

pub fn serialize(items: &[ActionItem]) -> String {
    items.iter().map(serialize_item).collect::<Vec<_>>().join("\n")
}

// ============================================================================
// Parse
// ============================================================================

/// A line the parser could not turn into an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based
    pub line_no: usize,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub items: Vec<ActionItem>,
    pub skipped: Vec<SkippedLine>,
}

/// Which reading of a line produced its fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Canonical,
    Labeled,
    FreeText,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Fields {
    description: String,
    key: String,
    code: Option<u16>,
    button: String,
    timestamp: String,
}

impl Fields {
    fn set(&mut self, label: &str, value: &str) {
        let value = value.trim().trim_end_matches('|').trim();
        match label {
            DESCRIPTION => self.description = value.to_string(),
            KEY => self.key = value.to_string(),
            CODE => self.code = value.parse().ok(),
            MOUSE_BUTTON => self.button = value.to_string(),
            TIMESTAMP => self.timestamp = value.to_string(),
            _ => {}
        }
    }
}

/// Parse a whole text block. Blank lines are ignored.
pub fn parse(text: &str) -> ParseOutcome {
    let mut out = ParseOutcome::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(item) => out.items.push(item),
            Err(reason) => {
                warn!(line_no = idx + 1, %reason, "skipping unparseable line");
                out.skipped.push(SkippedLine {
                    line_no: idx + 1,
                    text: line.to_string(),
                    reason,
                });
            }
        }
    }

    out
}

/// Parse one non-empty line. `Err` carries the reason it was skipped.
pub fn parse_line(line: &str) -> Result<ActionItem, String> {
    let (tier, fields) = read_fields(line);
    debug!(?tier, line, "parsing line");

    let event_type = infer_event_type(&fields)?;
    let timestamp = resolve_timestamp(&fields.timestamp);
    let mut item = ActionItem::new(event_type, timestamp);

    if event_type.is_key() {
        // Inference already checked both are present
        item.key_code = resolve_key(&fields).map(|(_, code)| code).unwrap_or_default();
    } else {
        item.coordinates = extract_coordinates(&fields.description);
        if let EventType::Other(_) = event_type {
            item.key_code = fields.code.unwrap_or_default();
        }
    }

    Ok(item)
}

fn read_fields(line: &str) -> (Tier, Fields) {
    if line.contains(" | ") {
        let mut fields = Fields::default();
        let mut found = false;
        for part in line.split('|') {
            let part = part.trim();
            if let Some(label) = LABELS.iter().find(|l| part.starts_with(*l)) {
                fields.set(label, &part[label.len()..]);
                found = true;
            }
        }
        if found {
            return (Tier::Canonical, fields);
        }
    }

    let positions = label_positions(line);
    if !positions.is_empty() {
        let mut fields = Fields::default();
        for (i, (pos, label)) in positions.iter().enumerate() {
            let start = pos + label.len();
            let end = positions.get(i + 1).map_or(line.len(), |(next, _)| *next);
            fields.set(label, &line[start..end]);
        }
        return (Tier::Labeled, fields);
    }

    (
        Tier::FreeText,
        Fields {
            description: line.to_string(),
            ..Fields::default()
        },
    )
}

/// First occurrence of each label that starts a field, sorted by position.
/// A label counts only at the line start or after whitespace or `|`, which
/// keeps the `(Code: 65)` inside a key description from being read as a field.
fn label_positions(line: &str) -> Vec<(usize, &'static str)> {
    let mut found: Vec<(usize, &'static str)> = LABELS
        .iter()
        .filter_map(|label| {
            line.match_indices(label)
                .map(|(pos, _)| pos)
                .find(|&pos| {
                    line[..pos]
                        .chars()
                        .next_back()
                        .map_or(true, |c| c.is_whitespace() || c == '|')
                })
                .map(|pos| (pos, *label))
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found
}

fn infer_event_type(fields: &Fields) -> Result<EventType, String> {
    let desc = fields.description.as_str();

    if let Some(pos) = desc.find(EXPLICIT_TYPE) {
        let rest = desc[pos + EXPLICIT_TYPE.len()..].trim_start();
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        return digits
            .parse::<u32>()
            .map(EventType::from_code)
            .map_err(|_| format!("invalid explicit action type in {:?}", desc));
    }

    if desc.contains("Mouse Move") {
        return Ok(EventType::MouseMove);
    }

    if !fields.button.is_empty() || desc.contains("Click") {
        let button = button_in(&fields.button)
            .or_else(|| button_in(desc))
            .unwrap_or(MouseButton::Left);
        let down = direction_in(&fields.button)
            .or_else(|| direction_in(desc))
            .unwrap_or(true);
        return Ok(EventType::button(button, down));
    }

    match resolve_key(fields) {
        Some(_) => Ok(if direction_in(desc) == Some(false) {
            EventType::KeyUp
        } else {
            EventType::KeyDown
        }),
        None if !key_name_of(fields).is_empty() => {
            Err(format!("key {:?} has no usable code", key_name_of(fields)))
        }
        None => Err("no mouse or key action recognized".to_string()),
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
}

fn button_in(text: &str) -> Option<MouseButton> {
    words(text).find_map(|w| match w {
        "Left" | "left" => Some(MouseButton::Left),
        "Right" | "right" => Some(MouseButton::Right),
        "Middle" | "middle" => Some(MouseButton::Middle),
        _ => None,
    })
}

/// `Some(true)` for down, `Some(false)` for up; the last mention wins
fn direction_in(text: &str) -> Option<bool> {
    words(text)
        .filter_map(|w| match w {
            "Down" | "down" => Some(true),
            "Up" | "up" => Some(false),
            _ => None,
        })
        .last()
}

fn key_name_of(fields: &Fields) -> &str {
    if !fields.key.is_empty() {
        return fields.key.as_str();
    }
    fields
        .description
        .find("Key ")
        .map(|pos| &fields.description[pos + 4..])
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("")
}

/// Key name and code, if the fields name a key with a positive code
fn resolve_key(fields: &Fields) -> Option<(&str, u16)> {
    let name = key_name_of(fields);
    if name.is_empty() {
        return None;
    }
    let code = fields
        .code
        .filter(|c| *c > 0)
        .or_else(|| code_in(&fields.description))
        .or_else(|| key_code(name))?;
    (code > 0).then_some((name, code))
}

fn code_in(text: &str) -> Option<u16> {
    let pos = text.find(CODE)?;
    let digits: String = text[pos + CODE.len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Coordinates from `X:<n>` and `Y:<n>` anywhere in the text. Missing or
/// malformed numbers yield `None`.
pub fn extract_coordinates(text: &str) -> Option<Point> {
    Some(Point::new(extract_x(text)?, extract_y(text)?))
}

fn extract_x(text: &str) -> Option<i32> {
    let start = text.find("X:")? + 2;
    let rest = text[start..].trim_start();
    let end = rest
        .find(|c: char| matches!(c, ',' | ' ' | ')'))
        .unwrap_or(rest.len());
    rest[..end].trim().parse().ok()
}

fn extract_y(text: &str) -> Option<i32> {
    let start = text.find("Y:")? + 2;
    let rest = text[start..].trim_start();
    let end = rest
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(rest.len(), |(i, _)| i);
    rest[..end].parse().ok()
}

/// Parse a timestamp in any of the accepted formats
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }

    // General fallbacks
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn resolve_timestamp(text: &str) -> DateTime<Utc> {
    parse_timestamp(text).unwrap_or_else(|| {
        if !text.trim().is_empty() {
            warn!(timestamp = text, "unreadable timestamp, using current time");
        }
        Utc::now()
    })
}

// ============================================================================
// Guarded edit
// ============================================================================

/// True when replacing `original` items with `parsed` items looks like an
/// accidental wipe rather than an edit.
pub fn loses_data(original: usize, parsed: usize) -> bool {
    original > GUARD_MIN_ORIGINAL && parsed < GUARD_MIN_PARSED && parsed * 2 < original
}

/// Result of applying edited text to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    Applied {
        count: usize,
        skipped: Vec<SkippedLine>,
    },
    /// The group was left untouched
    Rejected {
        original: usize,
        parsed: usize,
        skipped: Vec<SkippedLine>,
    },
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }

    pub fn skipped(&self) -> &[SkippedLine] {
        match self {
            EditOutcome::Applied { skipped, .. } | EditOutcome::Rejected { skipped, .. } => skipped,
        }
    }
}

impl ActionGroup {
    pub fn to_text(&self) -> String {
        serialize(&self.items)
    }

    /// Replace the items with the parsed text unless that would lose most of
    /// a long recording.
    pub fn apply_text_edit(&mut self, text: &str) -> EditOutcome {
        let ParseOutcome { items, skipped } = parse(text);
        let original = self.items.len();
        let parsed = items.len();

        if loses_data(original, parsed) {
            warn!(group = %self.name, original, parsed, "edit rejected, keeping original items");
            return EditOutcome::Rejected {
                original,
                parsed,
                skipped,
            };
        }

        info!(group = %self.name, original, parsed, skipped = skipped.len(), "edit applied");
        self.items = items;
        self.is_local = true;
        EditOutcome::Applied {
            count: parsed,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn sample() -> Vec<ActionItem> {
        vec![
            ActionItem::mouse_move(500, 300, ts(0)).with_delta(4, -2),
            ActionItem::button(MouseButton::Left, true, ts(120)).at(500, 300),
            ActionItem::button(MouseButton::Left, false, ts(180)).at(500, 300),
            ActionItem::button(MouseButton::Right, true, ts(400)),
            ActionItem::key(0x41, true, ts(650)),
            ActionItem::key(0x41, false, ts(700)),
            ActionItem::key(0x0D, true, ts(900)),
            ActionItem::new(EventType::Other(0x020A), ts(950)).at(-20, 15),
        ]
    }

    #[test]
    fn canonical_text_round_trips() {
        let items = sample();
        let text = serialize(&items);
        assert_eq!(text.lines().count(), items.len());

        let out = parse(&text);
        assert!(out.skipped.is_empty(), "{:?}", out.skipped);
        assert_eq!(out.items.len(), items.len());
        for (a, b) in items.iter().zip(&out.items) {
            assert_eq!(a.event_type, b.event_type);
            assert_eq!(a.key_code, b.key_code);
            assert_eq!(a.coordinates, b.coordinates);
            assert_eq!(a.timestamp, b.timestamp);
        }
    }

    #[test]
    fn canonical_line_layout() {
        let line = serialize_item(&ActionItem::key(0x41, true, ts(0)));
        assert_eq!(
            line,
            "Description: Key A Down (Code: 65) | Key: A | Code: 65 | MouseButton:  | Timestamp: 2024-03-01T12:00:00.000000Z"
        );
    }

    #[test]
    fn free_text_click_defaults_to_down() {
        let item = parse_line("Left Click at X:100, Y:200").unwrap();
        assert_eq!(item.event_type, EventType::LeftDown);
        assert_eq!(item.coordinates, Some(Point::new(100, 200)));
    }

    #[test]
    fn free_text_moves_and_keys() {
        let mv = parse_line("Mouse Move to X:500, Y:300").unwrap();
        assert_eq!(mv.event_type, EventType::MouseMove);
        assert_eq!(mv.coordinates, Some(Point::new(500, 300)));

        let key = parse_line("Key A Down (Code: 65)").unwrap();
        assert_eq!(key.event_type, EventType::KeyDown);
        assert_eq!(key.key_code, 65);

        let up = parse_line("Key Enter Up").unwrap();
        assert_eq!(up.event_type, EventType::KeyUp);
        assert_eq!(up.key_code, 0x0D);

        let right = parse_line("Right Click Up at X:-5, Y:-7").unwrap();
        assert_eq!(right.event_type, EventType::RightUp);
        assert_eq!(right.coordinates, Some(Point::new(-5, -7)));
    }

    #[test]
    fn reordered_labels_without_separators() {
        let item = parse_line(
            "Timestamp: 2024-03-01T12:00:01Z Description: Mouse Move to X:5, Y:6 Key: Code: 0",
        )
        .unwrap();
        assert_eq!(item.event_type, EventType::MouseMove);
        assert_eq!(item.coordinates, Some(Point::new(5, 6)));
        assert_eq!(item.timestamp, ts(1000));

        let key = parse_line(
            "Code: 66 Description: Key B Up (Code: 66) Key: B Timestamp: 2024-03-01T12:00:00Z",
        )
        .unwrap();
        assert_eq!(key.event_type, EventType::KeyUp);
        assert_eq!(key.key_code, 66);
    }

    #[test]
    fn code_inside_description_is_not_a_field() {
        let (tier, fields) = read_fields("Key A Down (Code: 65)");
        assert_eq!(tier, Tier::FreeText);
        assert_eq!(fields.code, None);
    }

    #[test]
    fn malformed_coordinates_become_none() {
        assert_eq!(extract_coordinates("Mouse Move to X:abc, Y:10"), None);
        assert_eq!(extract_coordinates("Mouse Move to X:10"), None);
        let item = parse_line("Mouse Move to X:abc, Y:10").unwrap();
        assert_eq!(item.coordinates, None);
    }

    #[test]
    fn accepted_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap();
        for text in [
            "2024-03-01T14:05:09Z",
            "2024-03-01T14:05:09.0000000Z",
            "2024-03-01T16:05:09+02:00",
            "03/01/2024 14:05:09",
            "03/01/2024 02:05:09 PM",
            "2024-03-01 14:05:09",
        ] {
            assert_eq!(parse_timestamp(text), Some(expected), "{}", text);
        }
        assert_eq!(parse_timestamp("not a time"), None);
    }

    #[test]
    fn unreadable_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let item = parse_line(
            "Description: Mouse Move to X:1, Y:2 | Key:  | Code: 0 | MouseButton:  | Timestamp: yesterday-ish",
        )
        .unwrap();
        assert!(item.timestamp >= before);
    }

    #[test]
    fn unrecognized_lines_are_skipped_with_reason() {
        let out = parse("Mouse Move to X:1, Y:2\n\nhello world\nKey Bogus Down\n");
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.skipped.len(), 2);
        assert_eq!(out.skipped[0].line_no, 3);
        assert_eq!(out.skipped[0].text, "hello world");
        assert!(out.skipped[1].reason.contains("Bogus"));
    }

    #[test]
    fn guard_rejects_drastic_shrink() {
        let items: Vec<_> = (0..100)
            .map(|i| ActionItem::mouse_move(i, i, ts(i as i64 * 10)))
            .collect();
        let mut group = ActionGroup::new("long").with_items(items.clone());

        let outcome = group.apply_text_edit(&serialize(&items[..3]));
        assert_eq!(
            outcome,
            EditOutcome::Rejected {
                original: 100,
                parsed: 3,
                skipped: vec![]
            }
        );
        assert_eq!(group.items, items);
    }

    #[test]
    fn guard_allows_small_groups_and_moderate_edits() {
        assert!(!loses_data(50, 0));
        assert!(!loses_data(100, 10));
        assert!(!loses_data(12, 1));
        assert!(loses_data(51, 9));

        let mut group = ActionGroup::new("short").with_items(sample());
        group.is_local = false;
        let outcome = group.apply_text_edit("Left Click at X:1, Y:1");
        assert!(outcome.is_applied());
        assert_eq!(group.items.len(), 1);
        assert!(group.is_local);
    }
}
