//! Windows platform implementation
//!
//! SendInput for keys and buttons, SetCursorPos for absolute pointer moves.

mod input;

pub use input::WindowsInput;

use crate::input::InputSynth;
use crate::Result;

pub fn system_input() -> Result<Box<dyn InputSynth>> {
    Ok(Box::new(WindowsInput::new()))
}
