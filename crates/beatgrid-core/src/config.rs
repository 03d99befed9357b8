use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    diagnostics::{DEFAULT_LOG_FILTER, DEFAULT_TRACE_FILE_PREFIX},
    export::DEFAULT_EXPORT_FILE_NAME,
    model::{DEFAULT_BPM, DEFAULT_SAMPLE_RATE, DEFAULT_VOLUME},
    renderer::{DEFAULT_BLOCK_SIZE, DEFAULT_RENDER_LOOPS, LiveOptions, RenderOptions},
    transport::DEFAULT_LOOK_AHEAD_SECONDS,
};

pub const CONFIG_FILE_NAME: &str = "beatgrid.config.toml";
pub const CONFIG_PATH_ENV: &str = "BEATGRID_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub project: ProjectConfig,
    pub audio: AudioConfig,
    pub export: ExportConfig,
    pub diagnostics: DiagnosticsConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub default_bpm: f64,
    pub default_volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub look_ahead_seconds: f64,
    /// Fixes the noise stream; unset seeds from the clock.
    pub noise_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub loops: u32,
    pub tail_seconds: f64,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub log_to_stdout: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
    pub export_dir: PathBuf,
    pub project_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            default_bpm: DEFAULT_BPM,
            default_volume: DEFAULT_VOLUME,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            look_ahead_seconds: DEFAULT_LOOK_AHEAD_SECONDS,
            noise_seed: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            loops: DEFAULT_RENDER_LOOPS,
            tail_seconds: 0.0,
            file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: DEFAULT_TRACE_FILE_PREFIX.to_string(),
            log_to_stdout: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            export_dir: PathBuf::from("data/exports"),
            project_dir: PathBuf::from("data/projects"),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::from_path(&config_path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid config TOML")
    }

    /// Like [`EngineConfig::load`], but a missing file means defaults. A file
    /// that exists and fails to parse is still an error.
    pub fn load_or_default() -> Result<Self> {
        match discover_config_path() {
            Ok(path) => Self::from_path(&path),
            Err(error) => {
                debug!(%error, "no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    #[must_use]
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            sample_rate: self.audio.sample_rate,
            loops: self.export.loops.max(1),
            tail_seconds: self.export.tail_seconds.max(0.0),
        }
    }

    #[must_use]
    pub fn live_options(&self) -> LiveOptions {
        LiveOptions {
            block_size: self.audio.block_size.max(1),
            look_ahead: self.audio.look_ahead_seconds.max(0.0),
        }
    }

    #[must_use]
    pub fn export_path(&self) -> PathBuf {
        self.paths.export_dir.join(&self.export.file_name)
    }
}

pub fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}
