//! Windows input injection
//!
//! Uses SendInput for keyboard and mouse button events.

use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN,
    MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEINPUT,
    MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::SetCursorPos;

use crate::input::{InputSynth, MouseButton};
use crate::{Error, ErrorCode, Result};

/// SendInput-backed synth. Stateless; the OS owns pointer position.
#[derive(Debug, Default)]
pub struct WindowsInput;

impl WindowsInput {
    pub fn new() -> Self {
        Self
    }
}

impl InputSynth for WindowsInput {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        unsafe {
            SetCursorPos(x, y).map_err(|e| {
                Error::new(ErrorCode::ActionFailed, format!("Failed to move mouse: {:?}", e))
            })?;
        }
        Ok(())
    }

    fn press_button(&self, button: MouseButton) -> Result<()> {
        send_inputs(&[make_mouse_input(button_flags(button).0)])
    }

    fn release_button(&self, button: MouseButton) -> Result<()> {
        send_inputs(&[make_mouse_input(button_flags(button).1)])
    }

    fn press_key(&self, code: u16) -> Result<()> {
        send_inputs(&[make_key_input(code, false)])
    }

    fn release_key(&self, code: u16) -> Result<()> {
        send_inputs(&[make_key_input(code, true)])
    }
}

fn button_flags(button: MouseButton) -> (MOUSE_EVENT_FLAGS, MOUSE_EVENT_FLAGS) {
    match button {
        MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
        MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
        MouseButton::Middle => (MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP),
    }
}

fn make_mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn make_key_input(vk: u16, key_up: bool) -> INPUT {
    let flags = if key_up { KEYEVENTF_KEYUP } else { KEYBD_EVENT_FLAGS(0) };

    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send_inputs(inputs: &[INPUT]) -> Result<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };

    // Zero means the input desktop rejected us (UIPI, locked session); retrying won't help.
    if sent == 0 {
        return Err(Error::synth_unavailable(format!(
            "SendInput blocked: {}",
            windows::core::Error::from_win32()
        )));
    }
    if sent as usize != inputs.len() {
        return Err(Error::new(
            ErrorCode::ActionFailed,
            format!("SendInput failed: sent {} of {} inputs", sent, inputs.len()),
        ));
    }

    Ok(())
}
