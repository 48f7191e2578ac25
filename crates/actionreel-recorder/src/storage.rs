//! Group storage - JSON lines, one file per group
//!
//! First line of a file is the group header, each following line one item.
//! Saves rewrite through a temp file and a rename; nothing is ever removed,
//! deleted groups are only flagged.

use crate::events::{ActionGroup, ActionItem, ActionModifier, AttachedFile};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

/// Persistence collaborator. Called only at session boundaries.
pub trait GroupStore: Send + Sync {
    fn load_groups(&self) -> Result<Vec<ActionGroup>>;
    fn save_groups(&self, groups: &[ActionGroup]) -> Result<()>;
}

/// First line of a group file
#[derive(Debug, Serialize, Deserialize)]
struct GroupHeader {
    id: Uuid,
    name: String,
    #[serde(rename = "type")]
    group_type: String,
    #[serde(default)]
    description: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    modifiers: Vec<ActionModifier>,
    #[serde(default)]
    attached_files: Vec<AttachedFile>,
    #[serde(default)]
    is_local: bool,
    #[serde(default)]
    deleted: bool,
    items: usize,
}

impl GroupHeader {
    fn of(group: &ActionGroup) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            group_type: group.group_type.clone(),
            description: group.description.clone(),
            created_at: group.created_at,
            modifiers: group.modifiers.clone(),
            attached_files: group.attached_files.clone(),
            is_local: group.is_local,
            deleted: group.deleted,
            items: group.items.len(),
        }
    }

    fn into_group(self, items: Vec<ActionItem>) -> ActionGroup {
        ActionGroup {
            id: self.id,
            name: self.name,
            group_type: self.group_type,
            description: self.description,
            created_at: self.created_at,
            items,
            modifiers: self.modifiers,
            attached_files: self.attached_files,
            is_local: self.is_local,
            deleted: self.deleted,
        }
    }
}

pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Store under `<data dir>/groups`
    pub fn open_default() -> Result<Self> {
        let data = actionreel_core::setup::default_data_dir()?;
        Self::with_dir(data.join("groups"))
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating group directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.jsonl", id))
    }

    /// Write one group atomically
    pub fn save_group(&self, group: &ActionGroup) -> Result<PathBuf> {
        let path = self.file_for(&group.id);
        let tmp = path.with_extension("jsonl.tmp");

        {
            let file = File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            let mut w = BufWriter::new(file);

            // First line: header
            serde_json::to_writer(&mut w, &GroupHeader::of(group))?;
            writeln!(w)?;

            // Remaining lines: items
            for item in &group.items {
                serde_json::to_writer(&mut w, item)?;
                writeln!(w)?;
            }
            w.flush()?;
        }

        fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;
        debug!(group = %group.name, path = %path.display(), items = group.items.len(), "group saved");
        Ok(path)
    }

    pub fn load_group(&self, path: &Path) -> Result<ActionGroup> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        // First line: header
        let header_line = lines.next().context("empty group file")??;
        let header: GroupHeader =
            serde_json::from_str(&header_line).context("unreadable group header")?;

        // Remaining lines: items
        let mut items = Vec::with_capacity(header.items);
        for (n, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let item: ActionItem = serde_json::from_str(&line)
                .with_context(|| format!("item on line {}", n + 2))?;
            items.push(item);
        }

        if items.len() != header.items {
            bail!(
                "truncated group file: header lists {} items, found {}",
                header.items,
                items.len()
            );
        }
        Ok(header.into_group(items))
    }

    /// Group files in the store, sorted by name
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl GroupStore for JsonlStore {
    /// Unreadable files are logged and left out; they stay on disk untouched.
    fn load_groups(&self) -> Result<Vec<ActionGroup>> {
        let mut groups = Vec::new();
        for path in self.list()? {
            match self.load_group(&path) {
                Ok(group) => groups.push(group),
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(path = %path.display(), error = %reason, "skipping group file");
                }
            }
        }
        groups.sort_by_key(|g| g.created_at);
        Ok(groups)
    }

    fn save_groups(&self, groups: &[ActionGroup]) -> Result<()> {
        for group in groups {
            self.save_group(group)?;
        }
        Ok(())
    }
}

/// Volatile store, also the fallback when the disk store can't be opened
#[derive(Default)]
pub struct MemoryStore {
    groups: Mutex<Vec<ActionGroup>>,
    fail: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(groups: Vec<ActionGroup>) -> Self {
        Self {
            groups: Mutex::new(groups),
            ..Self::default()
        }
    }

    /// Make every following load and save fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<ActionGroup> {
        self.groups.lock().clone()
    }
}

impl GroupStore for MemoryStore {
    fn load_groups(&self) -> Result<Vec<ActionGroup>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(self.groups.lock().clone())
    }

    fn save_groups(&self, groups: &[ActionGroup]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        *self.groups.lock() = groups.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use actionreel_core::MouseButton;

    fn sample(name: &str) -> ActionGroup {
        let now = Utc::now();
        let mut group = ActionGroup::new(name).with_items(vec![
            ActionItem::mouse_move(10, 20, now).with_delta(2, 1),
            ActionItem::button(MouseButton::Left, true, now).at(10, 20),
            ActionItem::key(0x41, true, now).held_for(120),
            ActionItem::new(EventType::Other(0x020A), now),
        ]);
        group.modifiers.push(ActionModifier::new("movement_steps", "60", 1));
        group
    }

    #[test]
    fn groups_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::with_dir(dir.path()).unwrap();
        let a = sample("login");
        let mut b = sample("logout");
        b.deleted = true;

        store.save_groups(&[a.clone(), b.clone()]).unwrap();
        let mut loaded = store.load_groups().unwrap();
        loaded.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(loaded, vec![a, b]);
    }

    #[test]
    fn file_layout_is_header_then_items() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::with_dir(dir.path()).unwrap();
        let group = sample("layout");
        let path = store.save_group(&group).unwrap();

        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + group.items.len());
        let header: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(header["name"], "layout");
        assert_eq!(header["items"], 4);
        assert_eq!(header["type"], "Custom Action");
    }

    #[test]
    fn resaving_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::with_dir(dir.path()).unwrap();
        let mut group = sample("edit");
        store.save_group(&group).unwrap();
        group.items.truncate(1);
        store.save_group(&group).unwrap();

        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.load_groups().unwrap()[0].items.len(), 1);
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn broken_files_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::with_dir(dir.path()).unwrap();
        store.save_group(&sample("good")).unwrap();
        fs::write(dir.path().join("junk.jsonl"), "not json\n").unwrap();

        let group = sample("cut");
        let path = store.save_group(&group).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let first_two: Vec<&str> = text.lines().take(2).collect();
        fs::write(&path, first_two.join("\n")).unwrap();

        let loaded = store.load_groups().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "good");
        assert!(dir.path().join("junk.jsonl").exists());
    }

    #[test]
    fn memory_store_can_fail() {
        let store = MemoryStore::new();
        store.save_groups(&[sample("a")]).unwrap();
        assert_eq!(store.save_count(), 1);
        store.set_failing(true);
        assert!(store.save_groups(&[]).is_err());
        assert!(store.load_groups().is_err());
        assert_eq!(store.snapshot().len(), 1);
    }
}
