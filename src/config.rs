//! Data structures and helper methods around influencing the configuration of the
//! application. Mirrors the shape of the configuration surface in §6 of the spec.

use ini::Ini;
use std::path::Path;
use tracing::info;

/// The default 15-entry cursor color palette (§4.7). Chosen to be readable on both light
/// and dark backgrounds; callers may override via `cursor.palette` in the config file.
pub const DEFAULT_PALETTE: [&str; 15] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe", "#008080", "#e6beff", "#9a6324", "#fffac8", "#800000",
];

#[derive(Debug, Clone)]
pub struct Config {
    /// Size of the per-room `recent` retention buffer (§3, §5). Default 1024.
    pub recent_retention: usize,
    /// Grace period (seconds) an empty room stays alive before teardown (§5). Default 30.
    pub room_grace_seconds: u64,
    /// Timeout (milliseconds) for authorization lookups on join (§5). Default 5000.
    pub authorization_timeout_ms: u64,
    /// Whether `getDiff` pre-computes summary stats (§6). Default true.
    pub diff_enabled: bool,
    /// Cursor color palette; must have exactly 15 entries (§4.7).
    pub cursor_palette: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recent_retention: 1024,
            room_grace_seconds: 30,
            authorization_timeout_ms: 5000,
            diff_enabled: true,
            cursor_palette: DEFAULT_PALETTE.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl Config {
    /// Loads configuration from an ini file, falling back to defaults for any section or
    /// key that is absent. Mirrors the teacher's `AppConfig::from_config_file` load style:
    /// parse eagerly, fail loudly on a malformed value rather than silently keeping a
    /// default.
    #[must_use]
    pub fn from_config_file(config_file: &Path) -> Self {
        let defaults = Self::default();
        if !config_file.exists() {
            return defaults;
        }

        let conf = Ini::load_from_file(config_file)
            .expect("Could not access config file, even though it exists");
        let general = conf.general_section();

        let recent_retention = general
            .get("recent.retention")
            .map(|v| {
                v.parse()
                    .expect("Failed to parse config parameter `recent.retention` as usize")
            })
            .unwrap_or(defaults.recent_retention);

        let room_grace_seconds = general
            .get("room.graceSeconds")
            .map(|v| {
                v.parse()
                    .expect("Failed to parse config parameter `room.graceSeconds` as u64")
            })
            .unwrap_or(defaults.room_grace_seconds);

        let authorization_timeout_ms = general
            .get("authorization.timeoutMs")
            .map(|v| {
                v.parse()
                    .expect("Failed to parse config parameter `authorization.timeoutMs` as u64")
            })
            .unwrap_or(defaults.authorization_timeout_ms);

        let diff_enabled = general
            .get("diff.enabled")
            .map(|v| {
                v.parse()
                    .expect("Failed to parse config parameter `diff.enabled` as bool")
            })
            .unwrap_or(defaults.diff_enabled);

        let cursor_palette = general
            .get("cursor.palette")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or(defaults.cursor_palette);

        assert!(
            cursor_palette.len() == 15,
            "cursor.palette must contain exactly 15 entries, got {}",
            cursor_palette.len()
        );

        info!(?config_file, "Loaded configuration");

        Self {
            recent_retention,
            room_grace_seconds,
            authorization_timeout_ms,
            diff_enabled,
            cursor_palette,
        }
    }
}
