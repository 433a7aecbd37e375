//! Default store-root resolution. `VECSTREAM_DB_PATH` always wins; absent
//! that, the default is OS-specific rather than a hardcoded path.

use std::path::PathBuf;

const ENV_VAR: &str = "VECSTREAM_DB_PATH";

/// Resolves the default collection-manager root: `$VECSTREAM_DB_PATH` if
/// set, otherwise `%APPDATA%/VecStream/store` on Windows and
/// `~/.vecstream/store` elsewhere.
pub fn default_db_path() -> PathBuf {
    if let Ok(p) = std::env::var(ENV_VAR) {
        if !p.is_empty() {
            return PathBuf::from(p);
        }
    }
    if cfg!(target_os = "windows") {
        if let Some(appdata) = dirs::data_dir() {
            return appdata.join("VecStream").join("store");
        }
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".vecstream").join("store");
    }
    PathBuf::from(".vecstream/store")
}
