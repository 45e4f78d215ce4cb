/*
 * aurb - A small Arch User Repository client.
 * Copyright (C) 2025  aurb contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Configuration management with validation and defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for aurb
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of concurrent AUR lookups
    pub concurrency: usize,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Enable colored output
    pub color: bool,

    /// AUR endpoints
    pub aur: AurConfig,

    /// Local pacman layout
    pub pacman: PacmanConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 8,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            color: true,
            aur: AurConfig::default(),
            pacman: PacmanConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// AUR-specific configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AurConfig {
    /// AUR RPC base URL
    pub rpc_url: String,

    /// Snapshot tarball URL; `{name}` is replaced with the package base
    pub snapshot_url: String,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for AurConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://aur.archlinux.org/rpc/".to_string(),
            snapshot_url: "https://aur.archlinux.org/cgit/aur.git/snapshot/{name}.tar.gz"
                .to_string(),
            user_agent: concat!("aurb/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Where pacman keeps its databases and how to hand packages over to it
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacmanConfig {
    /// Sync database root holding one `<repo>.db` per repository
    pub sync_dir: PathBuf,

    /// Official repositories that take precedence over the AUR
    pub repos: Vec<String>,

    /// Local package database (installed packages)
    pub local_dir: PathBuf,

    /// Command used to install a package from the official repositories
    pub install_command: Vec<String>,
}

impl Default for PacmanConfig {
    fn default() -> Self {
        Self {
            sync_dir: PathBuf::from("/var/lib/pacman/sync"),
            repos: vec!["core".to_string(), "extra".to_string(), "multilib".to_string()],
            local_dir: PathBuf::from("/var/lib/pacman/local"),
            install_command: vec!["sudo".to_string(), "pacman".to_string(), "-S".to_string()],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (empty = no file logging)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. /etc/aurb/aurb.toml (system-wide)
    /// 2. ~/.config/aurb/config.toml (user)
    /// 3. Environment variables (AURB_*)
    ///
    /// Files that cannot be used are skipped and described in the returned
    /// list, to be reported once logging is up.
    pub fn load() -> (Self, Vec<String>) {
        let mut paths = vec![PathBuf::from("/etc/aurb/aurb.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("aurb").join("config.toml"));
        }

        let (config, problems) = Self::from_files(&paths);
        (config.apply_env_overrides(), problems)
    }

    /// Layer the given files over the defaults, later files winning key by key
    fn from_files(paths: &[PathBuf]) -> (Self, Vec<String>) {
        let mut layered = toml::Table::new();
        let mut problems = Vec::new();

        for path in paths {
            match Self::read_table(path) {
                Ok(Some(table)) => merge_tables(&mut layered, table),
                Ok(None) => {}
                Err(problem) => problems.push(problem),
            }
        }

        match toml::Value::Table(layered).try_into::<Config>() {
            Ok(config) => (config, problems),
            Err(e) => {
                problems.push(format!("ignoring merged configuration: {}", e));
                (Config::default(), problems)
            }
        }
    }

    /// Read one file as a table. A table that does not describe a valid
    /// `Config` on its own is rejected as a whole.
    fn read_table(path: &Path) -> Result<Option<toml::Table>, String> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
        let table: toml::Table = toml::from_str(&content)
            .map_err(|e| format!("ignoring invalid config {}: {}", path.display(), e))?;

        toml::Value::Table(table.clone())
            .try_into::<Config>()
            .map_err(|e| format!("ignoring invalid config {}: {}", path.display(), e))?;

        Ok(Some(table))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("AURB_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                self.concurrency = n;
            }
        }

        if let Ok(val) = std::env::var("AURB_TIMEOUT") {
            if let Ok(n) = val.parse() {
                self.request_timeout_secs = n;
            }
        }

        if let Ok(val) = std::env::var("AURB_RPC_URL") {
            self.aur.rpc_url = val;
        }

        if let Ok(val) = std::env::var("AURB_LOG_LEVEL") {
            self.logging.level = val;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be at least 1".to_string());
        }
        if self.concurrency > 64 {
            return Err("concurrency must be at most 64".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be at least 1".to_string());
        }
        if let Err(e) = url::Url::parse(&self.aur.rpc_url) {
            return Err(format!("invalid aur.rpc_url '{}': {}", self.aur.rpc_url, e));
        }
        if !self.aur.snapshot_url.contains("{name}") {
            return Err("aur.snapshot_url must contain a {name} placeholder".to_string());
        }
        if self.pacman.install_command.is_empty() {
            return Err("pacman.install_command must not be empty".to_string());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Recursively overlay `overlay` onto `base`. Nested tables merge, any other
/// value replaces what was there.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                } else {
                    base.insert(key, toml::Value::Table(incoming));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}
