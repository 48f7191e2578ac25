//! actionreel-recorder - record, edit and replay keyboard/mouse action groups
//!
//! Captured events go through a dedup buffer into named groups. Groups
//! round-trip through an editable line-per-item text form, collapse into a
//! summarized view for display, and replay with their recorded timing.

pub mod error;
pub mod events;
pub mod library;
pub mod recorder;
pub mod replay;
pub mod storage;
pub mod summary;
pub mod text;

pub use error::{RecorderError, RecorderResult};
pub use events::*;
pub use library::Library;
pub use recorder::{
    CaptureSink, DedupBuffer, Feedback, PushError, Receiver, Recorder, RecorderConfig, Recording,
    RecordingHandle, Sender,
};
pub use replay::{ReplayConfig, ReplayController, ReplayHandle, ReplayReport, ReplayState, Replayer};
pub use storage::{GroupStore, JsonlStore, MemoryStore};
pub use summary::{summarize, DisplayEntry, GroupKind};
pub use text::{EditOutcome, ParseOutcome, SkippedLine};

pub mod prelude {
    pub use crate::events::*;
    pub use crate::library::Library;
    pub use crate::recorder::{CaptureSink, Recorder, RecorderConfig, RecordingHandle};
    pub use crate::replay::{ReplayConfig, ReplayController, ReplayReport, ReplayState};
    pub use crate::storage::{GroupStore, JsonlStore};
    pub use crate::summary::summarize;
    pub use crate::text::EditOutcome;
}
