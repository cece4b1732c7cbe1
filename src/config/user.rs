//! User configuration loading for sabun.
//!
//! User config location: $XDG_CONFIG_HOME/sabun/sabun.toml
//! Fallback: the platform config directory (`~/.config/sabun/sabun.toml` on Linux)

use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use super::settings::SettingsFile;

#[derive(Debug, Error)]
pub enum UserConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub type UserConfigResult<T> = Result<T, UserConfigError>;

/// Returns the path to the user configuration file.
///
/// The path is determined by:
/// 1. If $XDG_CONFIG_HOME is set: $XDG_CONFIG_HOME/sabun/sabun.toml
/// 2. Otherwise: the platform config directory
///
/// Returns None if no config directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    Some(config_dir.join("sabun").join("sabun.toml"))
}

/// Load the user configuration. A missing file is not an error.
pub fn load_user_config() -> UserConfigResult<Option<SettingsFile>> {
    let Some(path) = user_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path).map_err(|source| UserConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| UserConfigError::Parse { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn with_xdg_config_home<R>(value: &std::path::Path, f: impl FnOnce() -> R) -> R {
        let original = env::var_os("XDG_CONFIG_HOME");
        // SAFETY: serialized by #[serial(xdg_env)]
        unsafe {
            env::set_var("XDG_CONFIG_HOME", value);
        }
        let result = f();
        // SAFETY: restoring original env state
        unsafe {
            match original {
                Some(val) => env::set_var("XDG_CONFIG_HOME", val),
                None => env::remove_var("XDG_CONFIG_HOME"),
            }
        }
        result
    }

    #[test]
    #[serial(xdg_env)]
    fn test_user_config_path_uses_xdg_config_home_when_set() {
        let path = with_xdg_config_home(std::path::Path::new("/custom/config"), user_config_path);
        assert_eq!(
            path,
            Some(PathBuf::from("/custom/config/sabun/sabun.toml")),
            "should use XDG_CONFIG_HOME/sabun/sabun.toml"
        );
    }

    #[test]
    #[serial(xdg_env)]
    fn test_load_user_config_reads_and_reports_parse_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sabun")).unwrap();

        let missing = with_xdg_config_home(dir.path(), load_user_config).unwrap();
        assert!(missing.is_none());

        fs::write(dir.path().join("sabun/sabun.toml"), "maxDiffLines = 42\n").unwrap();
        let loaded = with_xdg_config_home(dir.path(), load_user_config).unwrap();
        assert_eq!(loaded.and_then(|file| file.max_diff_lines), Some(42));

        fs::write(dir.path().join("sabun/sabun.toml"), "maxDiffLines = \"many\"\n").unwrap();
        let err = with_xdg_config_home(dir.path(), load_user_config).unwrap_err();
        assert!(matches!(err, UserConfigError::Parse { .. }));
    }
}
