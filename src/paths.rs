//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   config and logs in the executable's directory.
//! - **Installed mode** (default): data lives under the platform data
//!   directory, in `MSU Link/`.
//!
//! The receiver discovery record ignores the mode and always lives in the
//! platform data directory, so every process on the machine agrees on it.

use std::path::PathBuf;
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "MSU Link";

/// File name of the receiver discovery record
const DISCOVERY_FILE_NAME: &str = "receiver.endpoint";

/// Application paths for config, discovery, and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the receiver discovery record
    pub discovery_file: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// In debug builds a `config.yaml` in the working directory wins, so
    /// `cargo run` from the project root picks up the local config.
    ///
    /// Called before logging is initialized.
    pub fn detect() -> Self {
        let exe_dir = exe_dir();

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let cwd_config = cwd.join("config.yaml");
            if cwd_config.exists() {
                eprintln!(
                    "[paths] Running in DEV mode (config.yaml found in cwd: {})",
                    cwd.display()
                );
                return Self {
                    config: cwd_config,
                    discovery_file: Self::discovery_file(),
                    logs_dir: cwd.join("logs"),
                    is_portable: true,
                };
            }
        }

        if exe_dir.join(".portable").exists() {
            Self {
                config: exe_dir.join("config.yaml"),
                discovery_file: Self::discovery_file(),
                logs_dir: exe_dir.join("logs"),
                is_portable: true,
            }
        } else {
            let app_data = data_dir();
            Self {
                config: app_data.join("config.yaml"),
                discovery_file: Self::discovery_file(),
                logs_dir: app_data.join("logs"),
                is_portable: false,
            }
        }
    }

    /// Well-known location of the receiver discovery record
    pub fn discovery_file() -> PathBuf {
        data_dir().join(DISCOVERY_FILE_NAME)
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the log directory exists.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir)?;
        }
        Ok(())
    }
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Per-user application data directory, falling back to the executable's
fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            eprintln!("[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir");
            exe_dir()
        })
        .join(APP_NAME)
}
