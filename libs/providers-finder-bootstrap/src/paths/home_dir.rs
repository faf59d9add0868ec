use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Default directory name under the user's home (or `%APPDATA%`).
pub const DEFAULT_SUBDIR: &str = ".providers-finder";

/// Errors for resolving the home directory
#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("HOME environment variable is not set")]
    HomeMissing,
    #[error("APPDATA environment variable is not set")]
    AppDataMissing,
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn user_home() -> Result<PathBuf, HomeDirError> {
    #[cfg(target_os = "windows")]
    let home = env::var("USERPROFILE").or_else(|_| env::var("HOME"));
    #[cfg(not(target_os = "windows"))]
    let home = env::var("HOME");

    home.map(PathBuf::from).map_err(|_| HomeDirError::HomeMissing)
}

/// Expand a leading `~` (`~`, `~/x`, and `~\x` on Windows) to the user's home.
pub fn expand_tilde(raw: &str) -> Result<PathBuf, HomeDirError> {
    if raw == "~" {
        return user_home();
    }
    let rest = raw.strip_prefix("~/");
    #[cfg(target_os = "windows")]
    let rest = rest.or_else(|| raw.strip_prefix("~\\"));

    match rest {
        Some(rest) => Ok(user_home()?.join(rest)),
        None => Ok(PathBuf::from(raw)),
    }
}

fn platform_default(default_subdir: &str) -> Result<PathBuf, HomeDirError> {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").map_err(|_| HomeDirError::AppDataMissing)?;
        Ok(Path::new(&appdata).join(default_subdir))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Ok(user_home()?.join(default_subdir))
    }
}

/// Normalize and resolve the home directory path.
///
/// - `config_home` given: `~` is expanded and the result must be absolute.
/// - otherwise: `$HOME/<default_subdir>` (`%APPDATA%\<default_subdir>` on Windows).
///
/// If `create` is true, the directory is created if missing.
pub fn resolve_home_dir(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = match config_home {
        Some(raw) => {
            let expanded = expand_tilde(&raw)?;
            if !expanded.is_absolute() {
                return Err(HomeDirError::AbsoluteRequired(
                    expanded.to_string_lossy().into(),
                ));
            }
            expanded
        }
        None => platform_default(default_subdir)?,
    };

    if create {
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}

/// Resolve a configured path against `base` after `~` expansion.
/// Absolute paths are returned unchanged.
pub fn resolve_under(base: &Path, raw: &str) -> Result<PathBuf, HomeDirError> {
    let expanded = expand_tilde(raw)?;
    Ok(if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    })
}
