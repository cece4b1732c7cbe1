//! Layered configuration.
//!
//! Settings are merged from four layers, later layers overriding earlier ones:
//! programmed defaults < user config < project `sabun.toml` < explicit override.
//! Loading never fails; problems are reported as [`SettingsEvent`]s and the
//! offending layer is skipped.

pub mod settings;
pub mod user;

pub use settings::{DEFAULT_VALIDATION_DELAY_MS, SettingsFile, TrackerSettings};
pub use user::{UserConfigError, UserConfigResult, load_user_config, user_config_path};

use std::fs;
use std::path::Path;

const LOG_TARGET: &str = "sabun::config";

/// File name of the project configuration.
pub const PROJECT_CONFIG_FILE: &str = "sabun.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsEventKind {
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsEvent {
    pub kind: SettingsEventKind,
    pub message: String,
}

impl SettingsEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Warning,
            message: message.into(),
        }
    }

    /// Forward the event to the logger.
    pub fn log(&self) {
        match self.kind {
            SettingsEventKind::Info => log::info!(target: LOG_TARGET, "{}", self.message),
            SettingsEventKind::Warning => log::warn!(target: LOG_TARGET, "{}", self.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct SettingsLoadOutcome {
    pub settings: TrackerSettings,
    pub events: Vec<SettingsEvent>,
}

/// Merge two layers; fields set in `overlay` win.
pub fn merge_settings(base: Option<SettingsFile>, overlay: Option<SettingsFile>) -> Option<SettingsFile> {
    match (base, overlay) {
        (None, None) => None,
        (Some(base), None) => Some(base),
        (None, Some(overlay)) => Some(overlay),
        (Some(base), Some(overlay)) => Some(SettingsFile {
            detect_whitespace_changes: overlay
                .detect_whitespace_changes
                .or(base.detect_whitespace_changes),
            merge_whitespace_separated: overlay
                .merge_whitespace_separated
                .or(base.merge_whitespace_separated),
            max_diff_lines: overlay.max_diff_lines.or(base.max_diff_lines),
            validation_delay_ms: overlay.validation_delay_ms.or(base.validation_delay_ms),
        }),
    }
}

/// Merge layers from lowest to highest precedence.
pub fn merge_all(configs: &[Option<SettingsFile>]) -> Option<SettingsFile> {
    configs
        .iter()
        .cloned()
        .fold(None, |merged, layer| merge_settings(merged, layer))
}

/// Load and merge every configuration layer.
pub fn load_settings(
    root_path: Option<&Path>,
    override_settings: Option<SettingsFile>,
) -> SettingsLoadOutcome {
    let mut events = Vec::new();

    let user_config = load_user_config_with_events(&mut events);
    let project_settings = load_project_settings(root_path, &mut events);

    let merged = merge_all(&[user_config, project_settings, override_settings]);
    let settings = merged.map(TrackerSettings::from).unwrap_or_default();

    if settings.max_diff_lines == 0 {
        events.push(SettingsEvent::warning(
            "maxDiffLines = 0 suspends tracking for every document",
        ));
    }

    SettingsLoadOutcome { settings, events }
}

fn load_user_config_with_events(events: &mut Vec<SettingsEvent>) -> Option<SettingsFile> {
    match load_user_config() {
        Ok(Some(settings)) => {
            events.push(SettingsEvent::info("Loaded user config"));
            Some(settings)
        }
        Ok(None) => None,
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to load user config: {}",
                err
            )));
            None
        }
    }
}

fn load_project_settings(
    root_path: Option<&Path>,
    events: &mut Vec<SettingsEvent>,
) -> Option<SettingsFile> {
    let config_path = root_path?.join(PROJECT_CONFIG_FILE);
    if !config_path.exists() {
        return None;
    }

    events.push(SettingsEvent::info(format!(
        "Found config file: {}",
        config_path.display()
    )));

    match fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<SettingsFile>(&contents) {
            Ok(settings) => {
                events.push(SettingsEvent::info(format!(
                    "Successfully loaded {PROJECT_CONFIG_FILE}"
                )));
                Some(settings)
            }
            Err(err) => {
                events.push(SettingsEvent::warning(format!(
                    "Failed to parse {PROJECT_CONFIG_FILE}: {}",
                    err
                )));
                None
            }
        },
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to read {PROJECT_CONFIG_FILE}: {}",
                err
            )));
            None
        }
    }
}
