//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use pricewatch::{PriceResult, Settings};

/// Resolve the settings file path, if any exists.
///
/// Order: explicit flag, `PRICEWATCH_CONFIG`, `./.pricewatch/settings.json`,
/// `~/.pricewatch/settings.json`.
pub fn resolve_settings_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("PRICEWATCH_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let cwd_settings = PathBuf::from(".pricewatch/settings.json");
    if cwd_settings.exists() {
        return Some(cwd_settings);
    }

    let home_settings = Settings::default().data_dir.join("settings.json");
    home_settings.exists().then_some(home_settings)
}

/// Settings from the resolved file (or defaults), then environment overrides.
pub fn load_settings(explicit: Option<&Path>) -> PriceResult<Settings> {
    let path = resolve_settings_path(explicit);
    if let Some(p) = &path {
        tracing::debug!(path = %p.display(), "loading settings");
    }
    Settings::resolve(path.as_deref())
}
