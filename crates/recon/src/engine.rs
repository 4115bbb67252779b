use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{RuleConfig, SyncConfig};
use crate::model::{
    Baseline, Decision, DecisionRecord, HoursRecord, Issue, MapEntity, OverrideSet, PendingEdit,
    SyncInput, SyncMeta, SyncResult, Verdict,
};
use crate::staleness::{self, StalenessError};
use crate::summary::compute_summary;

/// COVID-era value meaning "normal hours apply"; never protected.
const COVID_OPEN: &str = "open";

/// Reconcile every map entity against the external dataset.
///
/// Duplicate references are reported first, then each entity is decided on
/// its own, in snapshot order. Nothing here is fatal: per-reference problems
/// end up in `issues`.
pub fn run(config: &SyncConfig, input: &SyncInput, now: DateTime<Utc>) -> SyncResult {
    let mut issues = Vec::new();

    let duplicates = find_duplicates(input.entities);
    for (reference, elements) in &duplicates {
        let claimed_by = elements.join(", ");
        for element in elements {
            error!(
                reference = %reference,
                element = %element,
                claimed_by = %claimed_by,
                "reference claimed by more than one map element"
            );
        }
        issues.push(Issue::DuplicateReference {
            reference: reference.clone(),
            elements: elements.clone(),
        });
    }

    let mut decisions = Vec::with_capacity(input.entities.len());
    let mut edits = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for entity in input.entities {
        seen.insert(entity.reference.as_str());

        let Some(record) = input.external.get(&entity.reference) else {
            debug!(
                reference = %entity.reference,
                element = %entity.label(),
                "not in external dataset"
            );
            decisions.push(DecisionRecord {
                reference: entity.reference.clone(),
                element: entity.label(),
                display_name: None,
                decision: Decision::NotInExternalSource,
                old_hours: entity.current_hours.clone(),
                new_hours: None,
                write: false,
            });
            continue;
        };

        let verdict = decide(
            record,
            entity,
            input.baseline,
            input.overrides,
            &config.rules,
            now,
        );
        let has_baseline = input.baseline.get(&record.reference).is_some();
        log_verdict(record, entity, &verdict, has_baseline);

        if let Some(issue) = verdict.issue.clone() {
            issues.push(issue);
        }

        if let (Some(hours), Some(reason)) = (&verdict.write, verdict.decision.reason()) {
            edits.push(PendingEdit {
                reference: entity.reference.clone(),
                kind: entity.kind,
                id: entity.id,
                hours: hours.clone(),
                reason: reason.to_string(),
                remove_covid_hours: verdict.decision == Decision::NoOSMValue
                    && entity.covid_hours.is_some(),
            });
        }

        decisions.push(DecisionRecord {
            reference: entity.reference.clone(),
            element: entity.label(),
            display_name: Some(record.display_name.clone()),
            decision: verdict.decision,
            old_hours: entity.current_hours.clone(),
            new_hours: Some(record.hours.clone()),
            write: verdict.write.is_some(),
        });
    }

    let unmatched_external: Vec<String> = input
        .external
        .keys()
        .filter(|r| !seen.contains(r.as_str()))
        .cloned()
        .collect();
    for reference in &unmatched_external {
        debug!(reference = %reference, "external reference has no map element");
    }

    let summary = compute_summary(&decisions, &issues, duplicates.len(), unmatched_external.len());

    SyncResult {
        meta: SyncMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: Utc::now().to_rfc3339(),
            now: now.to_rfc3339(),
        },
        summary,
        decisions,
        edits,
        issues,
        unmatched_external,
    }
}

/// Decide what to do with one map entity given the external record for its reference.
pub fn decide(
    record: &HoursRecord,
    entity: &MapEntity,
    baseline: &Baseline,
    overrides: &OverrideSet,
    rules: &RuleConfig,
    now: DateTime<Utc>,
) -> Verdict {
    let reference = record.reference.as_str();

    if record.is_error(&rules.error_marker) {
        return Verdict {
            decision: Decision::ParseFailed,
            write: None,
            issue: Some(Issue::ParseFailure {
                reference: reference.to_string(),
            }),
        };
    }

    let new = record.hours.as_str();

    let Some(old) = entity.current_hours.as_deref() else {
        let protected = entity
            .covid_hours
            .as_deref()
            .is_some_and(|covid| covid != COVID_OPEN)
            && modified_since(entity, rules)
            && !overrides.contains(reference);
        if protected {
            return no_write(Decision::RecentCovidHoursKept, None);
        }
        return write(Decision::NoOSMValue, new);
    };

    let with_ph_off = format!("{old}; PH off");
    if new == with_ph_off {
        return write(Decision::MissingPHOff, new);
    }
    if new.starts_with(&with_ph_off) {
        return write(Decision::MissingPHOffAndSpecialDays, new);
    }
    if old == new {
        return no_write(Decision::Agree, None);
    }

    let mut issue = None;
    match staleness::assess(old, new, now.date_naive(), &rules.error_marker) {
        Ok(s) if s.is_stale() => return no_write(Decision::OnlyStaleSpecialDaysRemoved, None),
        Ok(_) => {}
        Err(e) => issue = Some(staleness_issue(reference, e)),
    }

    if overrides.contains(reference) {
        return Verdict {
            issue,
            ..write(Decision::Forced, new)
        };
    }

    match baseline.hours(reference) {
        Some(last) if last == old => Verdict {
            issue,
            ..write(Decision::BaselineMatchReplace, new)
        },
        Some(last) if last == new => no_write(Decision::BaselineMatchNoChange, issue),
        // Either both sides moved since the last sync, or there is no sync to compare with.
        _ => no_write(Decision::HumanConflictSkip, issue),
    }
}

fn write(decision: Decision, hours: &str) -> Verdict {
    Verdict {
        decision,
        write: Some(hours.to_string()),
        issue: None,
    }
}

fn no_write(decision: Decision, issue: Option<Issue>) -> Verdict {
    Verdict {
        decision,
        write: None,
        issue,
    }
}

fn modified_since(entity: &MapEntity, rules: &RuleConfig) -> bool {
    entity
        .last_modified
        .is_some_and(|ts| ts.date_naive() >= rules.covid_cutoff)
}

fn staleness_issue(reference: &str, err: StalenessError) -> Issue {
    match err {
        StalenessError::DateParse(token) => Issue::DateParseFailure {
            reference: reference.to_string(),
            token,
        },
        StalenessError::UnhandledShape(token) => Issue::UnhandledExpressionShape {
            reference: reference.to_string(),
            token,
        },
    }
}

/// References claimed by more than one entity, with every claiming element.
fn find_duplicates(entities: &[MapEntity]) -> BTreeMap<String, Vec<String>> {
    let mut by_reference: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for entity in entities {
        by_reference
            .entry(entity.reference.as_str())
            .or_default()
            .push(entity.label());
    }
    by_reference
        .into_iter()
        .filter(|(_, elements)| elements.len() > 1)
        .map(|(reference, elements)| (reference.to_string(), elements))
        .collect()
}

fn log_verdict(record: &HoursRecord, entity: &MapEntity, verdict: &Verdict, has_baseline: bool) {
    let reference = record.reference.as_str();
    let element = entity.label();
    let decision = verdict.decision;
    let old = entity.current_hours.as_deref().unwrap_or("");
    let new = record.hours.as_str();

    match decision {
        Decision::ParseFailed => {
            warn!(reference, element = %element, %decision, "external hours unparseable, skipped");
        }
        Decision::HumanConflictSkip if has_baseline => {
            warn!(reference, element = %element, %decision, old, new, "map and external hours both changed, needs review");
        }
        Decision::HumanConflictSkip => {
            warn!(reference, element = %element, %decision, old, new, "no saved baseline to compare, left untouched for review");
        }
        Decision::RecentCovidHoursKept => {
            info!(
                reference,
                element = %element,
                %decision,
                covid_hours = entity.covid_hours.as_deref().unwrap_or(""),
                "recent COVID hours left in place"
            );
        }
        d if d.writes() => {
            info!(reference, element = %element, %decision, old, new, "hours will be updated");
        }
        _ => {
            debug!(reference, element = %element, %decision, "no change");
        }
    }

    if let Some(issue) = &verdict.issue {
        if !matches!(issue, Issue::ParseFailure { .. }) {
            debug!(reference, %issue, "staleness check failed closed");
        }
    }
}
