//! Configuration management for animplayer
//!
//! This module handles loading and managing playback configuration
//! from config files and environment variables.

use crate::player::{DELAY_WINDOW, INITIAL_DELAY_MS, MAX_DELAY_MS};
use crate::utils::error::{AnimError, IntoAnimError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback pipeline configuration
    pub playback: PlaybackConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Playback pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// When the previously displayed buffer goes back to the pool
    pub release_policy: ReleasePolicy,

    /// Rewind the decoder before the first loop iteration too
    pub reset_before_first_loop: bool,

    /// Fill the canvas with the animation's background color before each frame
    pub draw_background: bool,

    /// Queue delay compensation
    pub delay: DelayConfig,

    /// Buffers kept by the bundled pool
    pub pool_capacity: usize,
}

/// Queue delay estimator parameters, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Seed sample
    pub initial_ms: u32,

    /// Upper clamp for samples and for the estimate
    pub max_ms: u32,

    /// Number of samples in the sliding window
    pub window: usize,
}

/// Release policy for the buffer that was on screen before the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleasePolicy {
    /// Release right after the replacement frame has been drawn
    Immediate,

    /// Release on the next render callback, once the surface is done with it
    Deferred,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            release_policy: ReleasePolicy::Deferred,
            reset_before_first_loop: true,
            draw_background: true,
            delay: DelayConfig::default(),
            pool_capacity: 3,
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            initial_ms: INITIAL_DELAY_MS,
            max_ms: MAX_DELAY_MS,
            window: DELAY_WINDOW,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl FromStr for ReleasePolicy {
    type Err = AnimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(ReleasePolicy::Immediate),
            "deferred" => Ok(ReleasePolicy::Deferred),
            other => Err(AnimError::Config(format!("Unknown release policy '{}'", other))),
        }
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/animplayer/config.toml on Linux)
    /// 3. User config file (~/.config/animplayer/config.toml on Linux)
    /// 4. Environment variables (ANIMPLAYER_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config = Self::read_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::read_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml)?;

        Ok(())
    }

    /// Missing keys fall back to their defaults
    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).config_err("Failed to parse config file")
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(policy) = std::env::var("ANIMPLAYER_RELEASE_POLICY") {
            self.playback.release_policy = policy.parse()?;
        }

        if let Ok(reset) = std::env::var("ANIMPLAYER_RESET_BEFORE_FIRST_LOOP") {
            self.playback.reset_before_first_loop = reset
                .parse()
                .config_err("Invalid ANIMPLAYER_RESET_BEFORE_FIRST_LOOP")?;
        }

        if let Ok(max) = std::env::var("ANIMPLAYER_MAX_DELAY_MS") {
            self.playback.delay.max_ms = max.parse().config_err("Invalid ANIMPLAYER_MAX_DELAY_MS")?;
        }

        if let Ok(log_level) = std::env::var("ANIMPLAYER_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let delay = &self.playback.delay;
        if delay.window == 0 {
            return Err(AnimError::Config("Delay window must hold at least one sample".to_string()));
        }

        if delay.max_ms > MAX_DELAY_MS {
            return Err(AnimError::Config(format!(
                "Max delay {}ms exceeds the {}ms ceiling",
                delay.max_ms, MAX_DELAY_MS
            )));
        }

        if delay.initial_ms > delay.max_ms {
            return Err(AnimError::Config(format!(
                "Initial delay {}ms exceeds max delay {}ms",
                delay.initial_ms, delay.max_ms
            )));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(AnimError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/animplayer/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("animplayer").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/animplayer/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("animplayer").join("config.toml"))
    }
}
