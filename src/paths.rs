//! Application path management.
//!
//! A `config.yaml` in the current working directory wins (handy with
//! `cargo run`). Otherwise the per-user config directory is used, for
//! example `~/.config/ble-midi-bridge` on Linux or `%APPDATA%\ble-midi-bridge`
//! on Windows.

use std::path::{Path, PathBuf};

/// Directory name used under the platform config directory
const APP_NAME: &str = "ble-midi-bridge";

const CONFIG_FILE: &str = "config.yaml";

/// Application paths
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Whether the config was picked up from the working directory
    pub is_local: bool,
}

impl AppPaths {
    /// Detect the config location.
    ///
    /// Note: this runs before logging is initialized, so diagnostics go to
    /// stderr in debug builds.
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let user_dir = dirs::config_dir().map(|dir| dir.join(APP_NAME));

        let paths = Self::resolve(&cwd, user_dir.as_deref());

        #[cfg(debug_assertions)]
        eprintln!(
            "[paths] Using config {} ({})",
            paths.config.display(),
            if paths.is_local { "working directory" } else { "user config dir" }
        );

        paths
    }

    fn resolve(cwd: &Path, user_dir: Option<&Path>) -> Self {
        let local = cwd.join(CONFIG_FILE);
        if local.exists() {
            return Self {
                config: local,
                is_local: true,
            };
        }

        match user_dir {
            Some(dir) => Self {
                config: dir.join(CONFIG_FILE),
                is_local: false,
            },
            // No per-user directory on this platform; keep it next to us
            None => Self {
                config: local,
                is_local: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_config_wins() {
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join(CONFIG_FILE), "{}").unwrap();

        let paths = AppPaths::resolve(cwd.path(), Some(Path::new("/home/user/.config/x")));

        assert!(paths.is_local);
        assert_eq!(paths.config, cwd.path().join(CONFIG_FILE));
    }

    #[test]
    fn test_user_dir_fallback() {
        let cwd = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let user_dir = user.path().join(APP_NAME);

        let paths = AppPaths::resolve(cwd.path(), Some(&user_dir));

        assert!(!paths.is_local);
        assert_eq!(paths.config, user_dir.join(CONFIG_FILE));
    }
}
