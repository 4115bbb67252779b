use std::collections::BTreeMap;

use crate::model::{Decision, DecisionRecord, Issue, SyncSummary};

/// Compute summary statistics from per-entity decisions.
pub fn compute_summary(
    decisions: &[DecisionRecord],
    issues: &[Issue],
    duplicates: usize,
    unmatched_external: usize,
) -> SyncSummary {
    let mut decision_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut writes = 0;
    let mut agreements = 0;
    let mut conflicts = 0;

    for d in decisions {
        *decision_counts.entry(d.decision.to_string()).or_insert(0) += 1;

        if d.write {
            writes += 1;
        }
        match d.decision {
            Decision::Agree | Decision::OnlyStaleSpecialDaysRemoved => agreements += 1,
            Decision::HumanConflictSkip => conflicts += 1,
            _ => {}
        }
    }

    SyncSummary {
        entities: decisions.len(),
        writes,
        agreements,
        conflicts,
        duplicates,
        issues: issues.len(),
        unmatched_external,
        decision_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(decision: Decision) -> DecisionRecord {
        DecisionRecord {
            reference: "r".into(),
            element: "node/1".into(),
            display_name: None,
            decision,
            old_hours: None,
            new_hours: None,
            write: decision.writes(),
        }
    }

    #[test]
    fn summary_counts() {
        let decisions = vec![
            record(Decision::Agree),
            record(Decision::OnlyStaleSpecialDaysRemoved),
            record(Decision::NoOSMValue),
            record(Decision::Forced),
            record(Decision::HumanConflictSkip),
            record(Decision::Agree),
        ];
        let issues = vec![Issue::ParseFailure {
            reference: "x".into(),
        }];
        let summary = compute_summary(&decisions, &issues, 1, 3);
        assert_eq!(summary.entities, 6);
        assert_eq!(summary.writes, 2);
        assert_eq!(summary.agreements, 3);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.issues, 1);
        assert_eq!(summary.unmatched_external, 3);
        assert_eq!(summary.decision_counts["agree"], 2);
        assert_eq!(summary.decision_counts["no_osm_value"], 1);
        assert!(!summary.decision_counts.contains_key("parse_failed"));
    }
}
