use serde::{Deserialize, Serialize};

use crate::diff::DEFAULT_MAX_DIFF_LINES;

pub const DEFAULT_VALIDATION_DELAY_MS: u64 = 300;

/// One layer of configuration as written in `sabun.toml`.
///
/// Every field is optional so that layers can be merged; unset fields fall
/// through to the next lower layer and finally to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsFile {
    /// Flag modifications that only differ in whitespace.
    pub detect_whitespace_changes: Option<bool>,
    /// Merge ranges separated only by blank lines while updating incrementally.
    pub merge_whitespace_separated: Option<bool>,
    /// Largest total number of lines (both sides) handed to the diff engine.
    pub max_diff_lines: Option<usize>,
    /// Debounce delay for background validation.
    pub validation_delay_ms: Option<u64>,
}

/// Resolved settings used by a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerSettings {
    pub detect_whitespace_changes: bool,
    pub merge_whitespace_separated: bool,
    pub max_diff_lines: usize,
    pub validation_delay_ms: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            detect_whitespace_changes: true,
            merge_whitespace_separated: true,
            max_diff_lines: DEFAULT_MAX_DIFF_LINES,
            validation_delay_ms: DEFAULT_VALIDATION_DELAY_MS,
        }
    }
}

impl From<SettingsFile> for TrackerSettings {
    fn from(file: SettingsFile) -> Self {
        let defaults = Self::default();
        Self {
            detect_whitespace_changes: file
                .detect_whitespace_changes
                .unwrap_or(defaults.detect_whitespace_changes),
            merge_whitespace_separated: file
                .merge_whitespace_separated
                .unwrap_or(defaults.merge_whitespace_separated),
            max_diff_lines: file.max_diff_lines.unwrap_or(defaults.max_diff_lines),
            validation_delay_ms: file
                .validation_delay_ms
                .unwrap_or(defaults.validation_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camel_case_keys() {
        let file: SettingsFile = toml::from_str(
            r#"
            detectWhitespaceChanges = false
            maxDiffLines = 1000
            "#,
        )
        .unwrap();
        assert_eq!(file.detect_whitespace_changes, Some(false));
        assert_eq!(file.max_diff_lines, Some(1000));
        assert_eq!(file.merge_whitespace_separated, None);
    }

    #[test]
    fn test_unset_fields_fall_back_to_defaults() {
        let settings = TrackerSettings::from(SettingsFile {
            validation_delay_ms: Some(10),
            ..Default::default()
        });
        assert_eq!(settings.validation_delay_ms, 10);
        assert!(settings.detect_whitespace_changes);
        assert_eq!(settings.max_diff_lines, DEFAULT_MAX_DIFF_LINES);
    }
}
