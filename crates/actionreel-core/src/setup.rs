//! Run-once process setup
//!
//! The first successful [`Setup::ensure`] resolves and creates the data
//! directory and runs the caller's first-run hook (logging installation in
//! the CLI). Every later call returns the cached state and does nothing else,
//! so it is safe to call from each entry point.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::{Error, Result};

pub const HOME_ENV: &str = "ACTIONREEL_HOME";

#[derive(Debug, Clone)]
pub struct SetupState {
    pub data_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct Setup {
    state: OnceLock<SetupState>,
}

static GLOBAL: Setup = Setup::new();

impl Setup {
    pub const fn new() -> Self {
        Self {
            state: OnceLock::new(),
        }
    }

    /// Process-wide instance
    pub fn global() -> &'static Setup {
        &GLOBAL
    }

    pub fn is_done(&self) -> bool {
        self.state.get().is_some()
    }

    pub fn state(&self) -> Option<&SetupState> {
        self.state.get()
    }

    /// Idempotent. `dir` overrides the default data directory on the first call only.
    pub fn ensure(&self, dir: Option<&Path>, on_first: impl FnOnce()) -> Result<&SetupState> {
        if let Some(state) = self.state.get() {
            return Ok(state);
        }

        let data_dir = match dir {
            Some(d) => d.to_path_buf(),
            None => default_data_dir()?,
        };
        std::fs::create_dir_all(&data_dir)?;

        // A racing caller may have won; only the winner runs the hook.
        if self.state.set(SetupState { data_dir }).is_ok() {
            on_first();
            tracing::debug!("setup complete");
        }
        self.state
            .get()
            .ok_or_else(|| Error::storage("setup state missing after initialization"))
    }
}

/// `$ACTIONREEL_HOME`, else `$HOME/.actionreel`
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| Error::storage("neither HOME nor USERPROFILE is set"))?;
    Ok(PathBuf::from(home).join(".actionreel"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn hook_runs_once() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("data");
        let setup = Setup::new();
        let calls = Cell::new(0);

        let first = setup.ensure(Some(&dir), || calls.set(calls.get() + 1)).unwrap();
        assert_eq!(first.data_dir, dir);
        assert!(dir.is_dir());

        let other = tmp.path().join("ignored");
        let second = setup.ensure(Some(&other), || calls.set(calls.get() + 1)).unwrap();
        assert_eq!(second.data_dir, dir);
        assert!(!other.exists());
        assert_eq!(calls.get(), 1);
        assert!(setup.is_done());
    }
}
