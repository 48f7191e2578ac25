//! Linux platform implementation
//!
//! No input backend yet. XTest or uinput would slot in behind `InputSynth`.

use crate::input::InputSynth;
use crate::{Error, ErrorCode, Result};

pub fn system_input() -> Result<Box<dyn InputSynth>> {
    Err(Error::new(
        ErrorCode::NotImplemented,
        "Linux input synthesis not available; use --dry-run",
    ))
}
