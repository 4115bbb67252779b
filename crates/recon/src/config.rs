use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub files: FilesConfig,
    #[serde(default)]
    pub tags: TagConfig,
    #[serde(default)]
    pub rules: RuleConfig,
}

fn default_name() -> String {
    "opening hours sync".into()
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Input and output paths. Relative paths are resolved by the caller
/// against the directory holding the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// External dataset, `reference|name|hours` per line.
    pub external: String,
    /// Last-synced baseline, same line format. Missing on the first run.
    pub baseline: String,
    /// References whose conflicts are force-resolved. Optional.
    #[serde(default)]
    pub overrides: Option<String>,
    /// OSM XML map snapshot.
    pub snapshot: String,
    /// Annotated change file written for the upload step.
    pub changes: String,
    /// JSON run report. Optional.
    #[serde(default)]
    pub report: Option<String>,
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TagConfig {
    #[serde(default = "default_reference_tag")]
    pub reference: String,
    #[serde(default = "default_hours_tag")]
    pub hours: String,
    #[serde(default = "default_covid_tag")]
    pub covid_hours: String,
    /// Free-text reason stamped on every edited element; the batching step groups by it.
    #[serde(default = "default_reason_tag")]
    pub reason: String,
}

fn default_reference_tag() -> String {
    "ref".into()
}

fn default_hours_tag() -> String {
    "opening_hours".into()
}

fn default_covid_tag() -> String {
    "opening_hours:covid19".into()
}

fn default_reason_tag() -> String {
    "fixme:hours_sync".into()
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            reference: default_reference_tag(),
            hours: default_hours_tag(),
            covid_hours: default_covid_tag(),
            reason: default_reason_tag(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Sentinel the external dataset uses for hours it could not produce.
    #[serde(default = "default_error_marker")]
    pub error_marker: String,
    /// COVID-era hours on elements modified on or after this date are left alone.
    #[serde(default = "default_covid_cutoff")]
    pub covid_cutoff: NaiveDate,
}

fn default_error_marker() -> String {
    "ERROR".into()
}

fn default_covid_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 5, 1).expect("valid calendar date")
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            error_marker: default_error_marker(),
            covid_cutoff: default_covid_cutoff(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SyncConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: SyncConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let required = [
            ("files.external", &self.files.external),
            ("files.baseline", &self.files.baseline),
            ("files.snapshot", &self.files.snapshot),
            ("files.changes", &self.files.changes),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!("{key} must not be empty")));
            }
        }

        let tags = [
            ("tags.reference", &self.tags.reference),
            ("tags.hours", &self.tags.hours),
            ("tags.covid_hours", &self.tags.covid_hours),
            ("tags.reason", &self.tags.reason),
        ];
        for (i, (key, value)) in tags.iter().enumerate() {
            if value.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!("{key} must not be empty")));
            }
            if let Some((other, _)) = tags[..i].iter().find(|(_, v)| v == value) {
                return Err(ReconError::ConfigValidation(format!(
                    "{key} and {other} both use tag '{value}'"
                )));
            }
        }

        if self.rules.error_marker.is_empty() {
            return Err(ReconError::ConfigValidation(
                "rules.error_marker must not be empty".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
