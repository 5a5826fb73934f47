use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::capture::CaptureConfig;
use crate::events::ClearModifier;

const APP_DIR: &str = "diffview";
const APP_CONFIG_FILE: &str = "config.json";

/// Highest framerate requested from the grabber
pub const MAX_FRAMERATE: u32 = 240;

/// Viewer settings from `config.json`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub framerate: u32,
    pub show_cursor: bool,
    /// Client area relative to the captured resolution
    pub scale: f64,
    pub clear_modifier: ClearModifier,
    /// Where snapshots are written as PNG files
    pub output_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        Self {
            framerate: capture.framerate,
            show_cursor: capture.show_cursor,
            scale: 1.0,
            clear_modifier: ClearModifier::default(),
            output_dir: None,
        }
    }
}

impl ViewerConfig {
    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            framerate: self.framerate.max(1),
            show_cursor: self.show_cursor,
        }
    }

    /// Load an explicitly requested file. Errors are fatal here.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config.validated())
    }

    /// Load the per-user config, falling back to defaults on any problem.
    pub fn load_default() -> Self {
        let (xdg_config_home, home) = config_env_dirs();
        Self::load_default_with(xdg_config_home.as_deref(), home.as_deref())
    }

    fn load_default_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> Self {
        let Some(path) = config_path(xdg_config_home, home) else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to load config.json; using defaults");
            Self::default()
        })
    }

    /// Replace out-of-range values with usable ones.
    pub(crate) fn validated(mut self) -> Self {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            tracing::warn!(scale = self.scale, "invalid scale; using 1.0");
            self.scale = 1.0;
        }
        if self.framerate == 0 {
            tracing::warn!("framerate must be positive; using default");
            self.framerate = CaptureConfig::default().framerate;
        } else if self.framerate > MAX_FRAMERATE {
            tracing::warn!(
                framerate = self.framerate,
                max = MAX_FRAMERATE,
                "framerate too high; clamping"
            );
            self.framerate = MAX_FRAMERATE;
        }
        self
    }
}

fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn config_path(xdg_config_home: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    let root = match xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        Some(xdg) => xdg.to_path_buf(),
        None => home?.join(".config"),
    };
    Some(root.join(APP_DIR).join(APP_CONFIG_FILE))
}
