use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One `reference|display_name|hours` line from the external dataset or the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoursRecord {
    pub reference: String,
    pub display_name: String,
    pub hours: String,
}

impl HoursRecord {
    pub fn new(
        reference: impl Into<String>,
        display_name: impl Into<String>,
        hours: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            display_name: display_name.into(),
            hours: hours.into(),
        }
    }

    /// Records carrying the error sentinel are inert: never written, never persisted.
    pub fn is_error(&self, marker: &str) -> bool {
        self.hours.contains(marker)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    Way,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Way => write!(f, "way"),
        }
    }
}

/// A map object claiming an office reference. Owned by the map store; the
/// engine only reads it.
#[derive(Debug, Clone)]
pub struct MapEntity {
    pub reference: String,
    pub kind: EntityKind,
    pub id: i64,
    pub current_hours: Option<String>,
    pub covid_hours: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl MapEntity {
    /// `node/123` style label used in logs and reports.
    pub fn label(&self) -> String {
        format!("{}/{}", self.kind, self.id)
    }
}

/// Last-synced hours per reference, i.e. what the external source said the
/// previous time we pushed. Sorted by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    entries: BTreeMap<String, HoursRecord>,
}

impl Baseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reference: &str) -> Option<&HoursRecord> {
        self.entries.get(reference)
    }

    pub fn hours(&self, reference: &str) -> Option<&str> {
        self.entries.get(reference).map(|r| r.hours.as_str())
    }

    /// Insert or overwrite the entry for `record.reference`.
    pub fn insert(&mut self, record: HoursRecord) {
        self.entries.insert(record.reference.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in reference order.
    pub fn iter(&self) -> impl Iterator<Item = &HoursRecord> {
        self.entries.values()
    }
}

impl FromIterator<HoursRecord> for Baseline {
    fn from_iter<I: IntoIterator<Item = HoursRecord>>(iter: I) -> Self {
        let mut baseline = Self::new();
        for record in iter {
            baseline.insert(record);
        }
        baseline
    }
}

/// References whose conflicts resolve in favour of the external value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSet {
    references: BTreeSet<String>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.references.contains(reference)
    }

    pub fn insert(&mut self, reference: impl Into<String>) -> bool {
        self.references.insert(reference.into())
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for OverrideSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for reference in iter {
            set.insert(reference);
        }
        set
    }
}

/// Read-only lookup tables for one run.
pub struct SyncInput<'a> {
    pub external: &'a BTreeMap<String, HoursRecord>,
    pub entities: &'a [MapEntity],
    pub baseline: &'a Baseline,
    pub overrides: &'a OverrideSet,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Map has no hours; external value added.
    #[serde(rename = "no_osm_value")]
    NoOSMValue,
    /// Map has no hours but recent COVID-era hours; left alone.
    RecentCovidHoursKept,
    /// External value is the map value plus `; PH off`.
    #[serde(rename = "missing_ph_off")]
    MissingPHOff,
    /// External value extends the map value with `; PH off` and special days.
    #[serde(rename = "missing_ph_off_and_special_days")]
    MissingPHOffAndSpecialDays,
    /// Only past special days were dropped from the external value.
    OnlyStaleSpecialDaysRemoved,
    /// Reference is on the override list.
    Forced,
    /// Map unchanged since last sync; external change wins.
    BaselineMatchReplace,
    /// External source unchanged since last sync; map was edited by hand.
    BaselineMatchNoChange,
    /// Both sides moved, or no baseline to tell. Needs a human.
    HumanConflictSkip,
    Agree,
    NotInExternalSource,
    ParseFailed,
}

impl Decision {
    /// Edit reason stamped on the element, or `None` for decisions that never write.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::NoOSMValue => Some("add opening hours"),
            Self::MissingPHOff => Some("add PH off"),
            Self::MissingPHOffAndSpecialDays => Some("add PH off and special days"),
            Self::Forced => Some("forced opening hours update"),
            Self::BaselineMatchReplace => Some("update opening hours"),
            Self::RecentCovidHoursKept
            | Self::OnlyStaleSpecialDaysRemoved
            | Self::BaselineMatchNoChange
            | Self::HumanConflictSkip
            | Self::Agree
            | Self::NotInExternalSource
            | Self::ParseFailed => None,
        }
    }

    pub fn writes(&self) -> bool {
        self.reason().is_some()
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoOSMValue => "no_osm_value",
            Self::RecentCovidHoursKept => "recent_covid_hours_kept",
            Self::MissingPHOff => "missing_ph_off",
            Self::MissingPHOffAndSpecialDays => "missing_ph_off_and_special_days",
            Self::OnlyStaleSpecialDaysRemoved => "only_stale_special_days_removed",
            Self::Forced => "forced",
            Self::BaselineMatchReplace => "baseline_match_replace",
            Self::BaselineMatchNoChange => "baseline_match_no_change",
            Self::HumanConflictSkip => "human_conflict_skip",
            Self::Agree => "agree",
            Self::NotInExternalSource => "not_in_external_source",
            Self::ParseFailed => "parse_failed",
        };
        write!(f, "{name}")
    }
}

/// The outcome of [`crate::engine::decide`] for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    /// New hours value; `Some` exactly when the decision writes.
    pub write: Option<String>,
    /// Fail-closed staleness problem worth surfacing, if any.
    pub issue: Option<Issue>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A requested change to one map element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingEdit {
    pub reference: String,
    pub kind: EntityKind,
    pub id: i64,
    pub hours: String,
    pub reason: String,
    /// Drop the COVID-era hours tag alongside (fresh value replaces it).
    pub remove_covid_hours: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub reference: String,
    pub element: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_hours: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_hours: Option<String>,
    pub write: bool,
}

/// Non-fatal, per-reference problem. Logged and reported, never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    MalformedRecord {
        source: String,
        line: usize,
        content: String,
    },
    ParseFailure {
        reference: String,
    },
    DuplicateReference {
        reference: String,
        elements: Vec<String>,
    },
    DateParseFailure {
        reference: String,
        token: String,
    },
    UnhandledExpressionShape {
        reference: String,
        token: String,
    },
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedRecord { source, line, content } => {
                write!(f, "{source}:{line}: malformed record '{content}'")
            }
            Self::ParseFailure { reference } => {
                write!(f, "{reference}: external hours marked as unparseable")
            }
            Self::DuplicateReference { reference, elements } => {
                write!(f, "{reference}: claimed by {}", elements.join(", "))
            }
            Self::DateParseFailure { reference, token } => {
                write!(f, "{reference}: cannot parse special day '{token}'")
            }
            Self::UnhandledExpressionShape { reference, token } => {
                write!(f, "{reference}: unhandled special day shape '{token}'")
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub entities: usize,
    pub writes: usize,
    pub agreements: usize,
    pub conflicts: usize,
    pub duplicates: usize,
    pub issues: usize,
    pub unmatched_external: usize,
    pub decision_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub now: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub meta: SyncMeta,
    pub summary: SyncSummary,
    pub decisions: Vec<DecisionRecord>,
    pub edits: Vec<PendingEdit>,
    pub issues: Vec<Issue>,
    pub unmatched_external: Vec<String>,
}
