//! The set of known action groups and their persistence boundaries
//!
//! Groups are loaded once when the library opens and written back only when
//! a session ends: a recording stops, an edit is applied, a group is deleted
//! or restored. Deletion only sets the flag.

use crate::error::{RecorderError, RecorderResult};
use crate::events::ActionGroup;
use crate::recorder::{Recording, RecordingHandle};
use crate::storage::GroupStore;
use crate::text::EditOutcome;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct Library {
    store: Arc<dyn GroupStore>,
    groups: Vec<ActionGroup>,
    degraded: bool,
}

impl Library {
    /// Load every group. A store that can't be read leaves the library
    /// empty and in memory only; saves are still attempted.
    pub fn open(store: Arc<dyn GroupStore>) -> Self {
        match store.load_groups() {
            Ok(groups) => {
                info!(groups = groups.len(), "library loaded");
                Self {
                    store,
                    groups,
                    degraded: false,
                }
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(error = %reason, "group store unreadable, continuing in memory");
                Self {
                    store,
                    groups: Vec::new(),
                    degraded: true,
                }
            }
        }
    }

    /// True when the store could not be loaded
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Every group, deleted ones included
    pub fn groups(&self) -> &[ActionGroup] {
        &self.groups
    }

    pub fn active(&self) -> impl Iterator<Item = &ActionGroup> {
        self.groups.iter().filter(|g| !g.deleted)
    }

    pub fn deleted(&self) -> impl Iterator<Item = &ActionGroup> {
        self.groups.iter().filter(|g| g.deleted)
    }

    pub fn find(&self, name: &str) -> Option<&ActionGroup> {
        self.active().find(|g| g.name == name)
    }

    pub fn get(&self, id: &Uuid) -> Option<&ActionGroup> {
        self.groups.iter().find(|g| g.id == *id)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut ActionGroup> {
        self.groups.iter_mut().find(|g| !g.deleted && g.name == name)
    }

    /// Fold a finished recording into the library without saving. Items are
    /// appended to the active group of the same name, or start a new group.
    /// Empty recordings change nothing.
    pub fn merge_recording(&mut self, recording: Recording) -> Option<Uuid> {
        if recording.items.is_empty() {
            info!(name = %recording.name, "empty recording discarded");
            return None;
        }

        let count = recording.items.len();
        if let Some(group) = self.find_mut(&recording.name) {
            group.items.extend(recording.items);
            group.is_local = true;
            info!(group = %group.name, added = count, total = group.items.len(), "recording merged");
            return Some(group.id);
        }

        let group = ActionGroup::new(recording.name).with_items(recording.items);
        info!(group = %group.name, items = count, "new group recorded");
        let id = group.id;
        self.groups.push(group);
        Some(id)
    }

    /// Stop a running session, merge what it captured and save
    pub fn finish_recording(&mut self, handle: RecordingHandle) -> RecorderResult<Option<Uuid>> {
        let recording = handle.stop()?;
        let id = self.merge_recording(recording);
        if id.is_some() {
            self.save();
        }
        Ok(id)
    }

    /// Apply edited text to a group. A rejected edit leaves the group as it
    /// was and is reported as an error; skipped lines are only logged.
    pub fn apply_edit(&mut self, name: &str, text: &str) -> RecorderResult<EditOutcome> {
        let group = self
            .find_mut(name)
            .ok_or_else(|| RecorderError::GroupNotFound(name.to_string()))?;

        match group.apply_text_edit(text) {
            EditOutcome::Rejected {
                original, parsed, ..
            } => Err(RecorderError::EditRejected { original, parsed }),
            applied => {
                self.save();
                Ok(applied)
            }
        }
    }

    /// Soft delete: the group stays in the store flagged as deleted
    pub fn delete(&mut self, name: &str) -> RecorderResult<Uuid> {
        let group = self
            .find_mut(name)
            .ok_or_else(|| RecorderError::GroupNotFound(name.to_string()))?;
        group.deleted = true;
        let id = group.id;
        info!(group = name, "group deleted");
        self.save();
        Ok(id)
    }

    /// Undo a soft delete, most recently created first
    pub fn restore(&mut self, name: &str) -> RecorderResult<Uuid> {
        if self.find(name).is_some() {
            return Err(RecorderError::NameTaken(name.to_string()));
        }
        let group = self
            .groups
            .iter_mut()
            .filter(|g| g.deleted && g.name == name)
            .max_by_key(|g| g.created_at)
            .ok_or_else(|| RecorderError::GroupNotFound(name.to_string()))?;
        group.deleted = false;
        let id = group.id;
        info!(group = name, "group restored");
        self.save();
        Ok(id)
    }

    /// Write every group. Failure is logged and the in-memory state kept.
    pub fn save(&self) -> bool {
        match self.store.save_groups(&self.groups) {
            Ok(()) => true,
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(error = %reason, "saving groups failed, changes kept in memory");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ActionItem;
    use crate::recorder::Recorder;
    use crate::storage::MemoryStore;
    use chrono::Utc;

    fn items(n: usize) -> Vec<ActionItem> {
        (0..n)
            .map(|i| ActionItem::mouse_move(i as i32 * 5, 0, Utc::now()).with_delta(5, 0))
            .collect()
    }

    fn recording(name: &str, n: usize) -> Recording {
        Recording {
            name: name.to_string(),
            items: items(n),
            dropped: 0,
        }
    }

    fn library_with(groups: Vec<ActionGroup>) -> (Arc<MemoryStore>, Library) {
        let store = Arc::new(MemoryStore::with_groups(groups));
        let library = Library::open(store.clone());
        (store, library)
    }

    #[test]
    fn recording_merges_into_same_name() {
        let mut existing = ActionGroup::new("login").with_items(items(2));
        existing.is_local = false;
        let (store, mut library) = library_with(vec![existing.clone()]);

        let id = library.merge_recording(recording("login", 3));
        assert_eq!(id, Some(existing.id));
        assert_eq!(library.groups().len(), 1);
        let group = library.find("login").unwrap();
        assert_eq!(group.items.len(), 5);
        assert!(group.is_local);

        let other = library.merge_recording(recording("logout", 1)).unwrap();
        assert_eq!(library.groups().len(), 2);
        assert_eq!(library.get(&other).unwrap().name, "logout");
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn empty_recording_creates_nothing() {
        let (_, mut library) = library_with(vec![]);
        assert_eq!(library.merge_recording(recording("nothing", 0)), None);
        assert!(library.groups().is_empty());
    }

    #[test]
    fn finishing_a_session_saves_once() {
        let (store, mut library) = library_with(vec![]);
        let (sink, handle) = Recorder::new().start("session").unwrap();
        for item in items(4) {
            sink.push(item).unwrap();
        }
        drop(sink);

        let id = library.finish_recording(handle).unwrap().unwrap();
        assert_eq!(library.get(&id).unwrap().items.len(), 4);
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot()[0].name, "session");
    }

    #[test]
    fn rejected_edit_keeps_group_and_skips_save() {
        let group = ActionGroup::new("long").with_items(items(100));
        let original = group.items.clone();
        let (store, mut library) = library_with(vec![group]);

        let text = "Mouse Move to X:1, Y:1\nMouse Move to X:2, Y:2\nLeft Click at X:2, Y:2";
        let err = library.apply_edit("long", text).unwrap_err();
        assert!(matches!(
            err,
            RecorderError::EditRejected {
                original: 100,
                parsed: 3
            }
        ));
        assert_eq!(library.find("long").unwrap().items, original);
        assert_eq!(store.save_count(), 0);

        let core: actionreel_core::Error = err.into();
        assert_eq!(core.code, actionreel_core::ErrorCode::ParseRejected);
    }

    #[test]
    fn applied_edit_is_saved() {
        let (store, mut library) = library_with(vec![ActionGroup::new("short").with_items(items(3))]);
        let outcome = library
            .apply_edit("short", "Key A Down (Code: 65)\nnonsense")
            .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(outcome.skipped().len(), 1);
        assert_eq!(store.snapshot()[0].items.len(), 1);

        assert!(matches!(
            library.apply_edit("missing", ""),
            Err(RecorderError::GroupNotFound(_))
        ));
    }

    #[test]
    fn delete_is_soft_and_restorable() {
        let (store, mut library) = library_with(vec![ActionGroup::new("macro").with_items(items(2))]);

        let id = library.delete("macro").unwrap();
        assert!(library.find("macro").is_none());
        assert_eq!(library.deleted().count(), 1);
        assert_eq!(store.snapshot().len(), 1);
        assert!(store.snapshot()[0].deleted);

        // A new recording under the old name starts a fresh group
        let fresh = library.merge_recording(recording("macro", 1)).unwrap();
        assert_ne!(fresh, id);
        assert!(matches!(library.restore("macro"), Err(RecorderError::NameTaken(_))));

        library.delete("macro").unwrap();
        assert_eq!(library.restore("macro").unwrap(), fresh);
        assert_eq!(library.active().count(), 1);
    }

    #[test]
    fn unreadable_store_degrades_to_memory() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let mut library = Library::open(store.clone());
        assert!(library.is_degraded());

        library.merge_recording(recording("kept", 2));
        assert!(!library.save());
        assert_eq!(library.find("kept").unwrap().items.len(), 2);
    }
}
