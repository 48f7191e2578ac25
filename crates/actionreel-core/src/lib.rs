//! actionreel-core - input synthesis and shared plumbing
//!
//! Structured errors, the [`InputSynth`] seam replay drives, virtual-key
//! names, and the run-once [`Setup`] service.
//!
//! ## Platform Support
//!
//! - **Windows**: SendInput backend
//! - **macOS / Linux**: dry-run only for now

pub mod error;
pub mod input;
pub mod platform;
pub mod setup;

pub use error::{Error, ErrorCode, Result};
pub use input::{key_code, key_name, InputSynth, LogSynth, MouseButton, Primitive};
pub use setup::{Setup, SetupState};

pub mod prelude {
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::input::{InputSynth, LogSynth, MouseButton, Primitive};
    pub use crate::setup::Setup;
}

/// The OS input backend for this platform
pub fn system_input() -> Result<Box<dyn InputSynth>> {
    platform::current::system_input()
}
