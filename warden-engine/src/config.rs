use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Sliding-window admission control settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_commands: u32,
    pub per_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_commands: 5,
            per_seconds: 60,
        }
    }
}

/// Warn-count escalation thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoActionConfig {
    pub enabled: bool,
    /// Warn count that triggers an automatic permanent ban.
    pub auto_ban_warns: u32,
    /// Warn count that triggers an automatic temporary mute.
    pub auto_mute_warns: u32,
    /// Length of the automatic mute, in seconds.
    pub auto_mute_seconds: u64,
}

impl Default for AutoActionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_ban_warns: 5,
            auto_mute_warns: 3,
            auto_mute_seconds: 3_600,
        }
    }
}

/// Typed engine configuration with explicit defaults for every field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Role ids that satisfy the Staff permission level.
    pub staff_roles: Vec<u64>,
    /// Role ids that satisfy both the Staff and Admin permission levels.
    pub admin_roles: Vec<u64>,
    pub rate_limit: RateLimitConfig,
    pub auto_actions: AutoActionConfig,
    /// DM subjects about sanctions they receive (best effort).
    pub dm_users: bool,
    /// Include the running warn total in warn notifications.
    pub show_warn_count: bool,
    /// Interval of the safety sweep that lifts expired sanctions missed by
    /// their timers.
    pub sweep_interval_seconds: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            staff_roles: Vec::new(),
            admin_roles: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            auto_actions: AutoActionConfig::default(),
            dm_users: true,
            show_warn_count: true,
            sweep_interval_seconds: 300,
        }
    }
}

impl ModerationConfig {
    /// Load the config file, creating it with defaults when missing.
    ///
    /// Missing keys are filled from defaults (serde `default`), numeric
    /// fields are clamped to sane minima, and the repaired result is
    /// written back so the on-disk file converges. A file that fails to
    /// parse entirely is left untouched and defaults are used for this run.
    pub fn load_or_create(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            match config.save(path) {
                Ok(()) => info!(path = %path.display(), "created default moderation config"),
                Err(err) => warn!(path = %path.display(), %err, "failed to write default config"),
            }
            return config;
        }

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read config, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&raw) {
            Ok(config) => {
                let repaired = config.clamped();
                if let Ok(canonical) = serde_json::to_string_pretty(&repaired)
                    && canonical != raw.trim_end()
                {
                    match fs::write(path, canonical + "\n") {
                        Ok(()) => info!(path = %path.display(), "repaired moderation config"),
                        Err(err) => warn!(path = %path.display(), %err, "failed to write repaired config"),
                    }
                }
                repaired
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "config is not valid JSON, using defaults (file left untouched)");
                Self::default()
            }
        }
    }

    /// Serialize to pretty JSON at `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let canonical = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, canonical + "\n")
    }

    fn clamped(mut self) -> Self {
        self.rate_limit.max_commands = self.rate_limit.max_commands.max(1);
        self.rate_limit.per_seconds = self.rate_limit.per_seconds.max(1);
        self.auto_actions.auto_ban_warns = self.auto_actions.auto_ban_warns.max(1);
        self.auto_actions.auto_mute_warns = self.auto_actions.auto_mute_warns.max(1);
        self.auto_actions.auto_mute_seconds = self.auto_actions.auto_mute_seconds.max(1);
        self.sweep_interval_seconds = self.sweep_interval_seconds.max(1);
        self
    }
}
