//! Path utilities for warden configuration and logs.

use std::path::{Path, PathBuf};

/// Configuration filename inside the config directory.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Get the config directory for warden.
///
/// - Linux: `~/.config/warden`
/// - macOS: `~/Library/Application Support/warden`
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("warden"))
        .unwrap_or_else(|| PathBuf::from(".warden"))
}

/// Get the default path of the warden config file.
pub fn get_config_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILENAME)
}

/// Expands a leading `~` in a path to the user's home directory.
///
/// This handles the common case where shell tilde expansion doesn't occur,
/// such as when using `--config=~/warden.toml` instead of `--config ~/warden.toml`.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use warden::paths::expand_tilde;
///
/// let path = PathBuf::from("/tmp/foo");
/// assert_eq!(expand_tilde(&path), path);
/// ```
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if let Ok(stripped) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_config_dir_returns_valid_path() {
        let dir = get_config_dir();
        let name = dir.file_name().unwrap().to_str().unwrap();
        assert!(name == "warden" || name == ".warden");
    }

    #[test]
    fn test_config_path_is_in_config_dir() {
        let path = get_config_path();
        assert!(path.starts_with(get_config_dir()));
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "config.toml");
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let path = PathBuf::from("~/warden/config.toml");
        let expanded = expand_tilde(&path);
        assert!(!expanded.to_str().unwrap().starts_with("~"));
        assert!(expanded.to_str().unwrap().ends_with("warden/config.toml"));
    }

    #[test]
    fn test_expand_tilde_absolute_path_unchanged() {
        let path = PathBuf::from("/etc/warden.toml");
        assert_eq!(expand_tilde(&path), path);
    }
}
