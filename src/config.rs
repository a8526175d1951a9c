//! Library settings.
//!
//! Settings are layered: built-in defaults, then an optional JSON file
//! (`$ERADIATE_DIR/eradiate.json` unless a path is given), then the
//! `ERADIATE_DIR` and `ERADIATE_MODE` environment variables.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::absorption::ErrorHandlingConfiguration;
use crate::data::PathResolver;
use crate::error::{Error, Result};
use crate::mode::Mode;

pub const SETTINGS_FILE: &str = "eradiate.json";

/// Amount of progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    None,
    #[default]
    SpectralLoop,
    Kernel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directories searched for data files, in order.
    pub data_dir: Vec<PathBuf>,
    pub absorption_error_handling: ErrorHandlingConfiguration,
    pub mode: Mode,
    pub progress: Progress,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Defaults, overridden by the settings file (explicit or found in
    /// `$ERADIATE_DIR`), overridden by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => env("ERADIATE_DIR")
                .map(|dir| Path::new(&dir).join(SETTINGS_FILE))
                .filter(|p| p.is_file()),
        };
        let mut settings = match file {
            Some(f) => {
                log::info!("loading settings from {}", f.display());
                Self::from_file(&f)?
            }
            None => Self::default(),
        };
        settings.apply_env(env)?;
        Ok(settings)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = env("ERADIATE_DIR") {
            let data = Path::new(&dir).join("resources").join("data");
            if !self.data_dir.contains(&data) {
                self.data_dir.push(data);
            }
        }
        if let Some(mode) = env("ERADIATE_MODE") {
            self.mode = mode.parse()?;
        }
        Ok(())
    }

    pub fn path_resolver(&self) -> PathResolver {
        PathResolver::new(self.data_dir.clone())
    }
}

/// Process-wide settings, loaded on first access. Falls back to defaults
/// (with a warning) if loading fails.
pub fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(|| {
        Settings::load(None).unwrap_or_else(|e| {
            log::warn!("using default settings: {e}");
            Settings::default()
        })
    })
}
