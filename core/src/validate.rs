//! Pre-spawn validation. Everything here runs synchronously before any
//! child process exists; failures surface as exit code 2.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]{1,128}$").unwrap())
}

/// Session ids are backend-assigned correlation tokens; anything outside a
/// conservative shape is rejected before it can reach an argv.
pub fn session_id(id: &str) -> Result<(), ConfigError> {
    if ident_re().is_match(id) {
        Ok(())
    } else {
        Err(ConfigError::InvalidSessionId(id.to_string()))
    }
}

pub fn agent_name(name: &str) -> Result<(), ConfigError> {
    if ident_re().is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidAgentName(name.to_string()))
    }
}

/// The workdir positional must be a real directory, and `-` is reserved as
/// the stdin marker for the task positional.
pub fn work_dir(raw: &str) -> Result<PathBuf, ConfigError> {
    if raw == "-" {
        return Err(ConfigError::WorkdirIsStdinMarker);
    }
    let path = PathBuf::from(raw);
    if !path.is_dir() {
        return Err(ConfigError::WorkdirNotADirectory(raw.to_string()));
    }
    Ok(path)
}

pub fn timeout_secs(secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(ConfigError::NonPositiveTimeout);
    }
    Ok(())
}

pub fn prompt_file(path: &Path) -> Result<(), ConfigError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(ConfigError::UnreadablePromptFile {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file"),
        }),
        Err(e) => Err(ConfigError::UnreadablePromptFile {
            path: path.display().to_string(),
            source: e,
        }),
    }
}
