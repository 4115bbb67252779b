//! Special-day staleness - is the only difference between two hours
//! expressions that some past-dated special days were dropped?
//!
//! Expressions look like `Mo-Fr 09:00-17:30; Sa 09:00-12:30; PH off; 2020 Dec 24 09:00-12:00; 2020 Dec 31 off`.
//! Everything up to and including `PH off` is the recurring schedule and must be
//! identical. The tail is a list of one-off entries; the new tail must equal the
//! old tail with a run of entries cut out, and every cut entry must be dated
//! on or before today. Anything the checker cannot parse fails closed.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

const PH_OFF: &str = "PH off";
const CLAUSE_SEP: &str = "; ";
const LIST_SEP: char = ',';

/// Why a pair of expressions is (or is not) a stale removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Only the listed past dates were removed.
    Stale { removed: Vec<NaiveDate> },
    /// Schedules differ in a way this checker does not explain.
    Diverged,
    /// A removed special day is still upcoming.
    FutureRemoval { date: NaiveDate },
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// Fail-closed problems with a removed entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StalenessError {
    #[error("cannot parse special day '{0}'")]
    DateParse(String),
    #[error("unhandled special day shape '{0}'")]
    UnhandledShape(String),
}

/// `true` when `new` differs from `old` only by dropping special days dated
/// on or before `today`. Errors inside the check count as "not stale".
pub fn is_stale_removal(old: &str, new: &str, today: NaiveDate, error_marker: &str) -> bool {
    match assess(old, new, today, error_marker) {
        Ok(staleness) => staleness.is_stale(),
        Err(e) => {
            tracing::debug!(error = %e, "staleness check failed closed");
            false
        }
    }
}

/// Detailed form of [`is_stale_removal`].
pub fn assess(
    old: &str,
    new: &str,
    today: NaiveDate,
    error_marker: &str,
) -> Result<Staleness, StalenessError> {
    if old.contains(error_marker) || new.contains(error_marker) {
        return Ok(Staleness::Diverged);
    }

    let (Some((old_schedule, old_tail)), Some((new_schedule, new_tail))) =
        (split_schedule(old), split_schedule(new))
    else {
        return Ok(Staleness::Diverged);
    };
    if old_schedule != new_schedule {
        return Ok(Staleness::Diverged);
    }

    let old_clauses = clauses(old_tail);
    let new_clauses = clauses(new_tail);

    // Drop leading clauses both sides share verbatim.
    let shared = old_clauses
        .iter()
        .zip(&new_clauses)
        .take_while(|(a, b)| a == b)
        .count();
    let old_rest = pieces(&old_clauses[shared..]);
    let new_rest = pieces(&new_clauses[shared..]);

    if !old_rest.ends_with(&new_rest) {
        return Ok(Staleness::Diverged);
    }
    let removed = &old_rest[..old_rest.len() - new_rest.len()];

    let mut dates = Vec::new();
    for piece in removed {
        if let Piece::Entry(text) = piece {
            dates.push(parse_special_day(text)?);
        }
    }

    if let Some(date) = dates.iter().find(|d| **d > today) {
        return Ok(Staleness::FutureRemoval { date: *date });
    }
    Ok(Staleness::Stale { removed: dates })
}

/// Split at the end of the first `PH off`: (recurring schedule, special-day tail).
fn split_schedule(expr: &str) -> Option<(&str, &str)> {
    expr.find(PH_OFF).map(|at| expr.split_at(at + PH_OFF.len()))
}

fn clauses(tail: &str) -> Vec<&str> {
    let tail = tail.trim_start_matches(|c: char| c == ';' || c == LIST_SEP || c.is_whitespace());
    if tail.is_empty() {
        Vec::new()
    } else {
        tail.split(CLAUSE_SEP).collect()
    }
}

/// One lexical unit of a special-day tail. Separators are kept and entries
/// are not trimmed, so a sequence comparison matches exactly what a string
/// comparison would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Entry(&'a str),
    ClauseBreak,
    ListBreak,
}

fn pieces<'a>(clauses: &[&'a str]) -> Vec<Piece<'a>> {
    let mut out = Vec::new();
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            out.push(Piece::ClauseBreak);
        }
        for (j, entry) in clause.split(LIST_SEP).enumerate() {
            if j > 0 {
                out.push(Piece::ListBreak);
            }
            out.push(Piece::Entry(entry));
        }
    }
    out
}

fn time_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A colon preceded by exactly two digits starts a time range.
    RE.get_or_init(|| Regex::new(r"(^|[^0-9])[0-9]{2}:.*$").expect("static regex"))
}

fn day_range() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]{2})-[0-9]{2}$").expect("static regex"))
}

/// Normalise one removed entry (`2020 Dec 31 07:30-12:00`, `2020 Dec 25 off`,
/// `2021 Feb 08-12`) down to a calendar date.
fn parse_special_day(entry: &str) -> Result<NaiveDate, StalenessError> {
    let mut token = time_suffix().replace(entry, "$1").trim().to_string();
    if let Some(stripped) = token.strip_suffix("off") {
        token = stripped.trim_end().to_string();
    }
    token = day_range().replace(&token, "$1").into_owned();

    if token.contains(':') {
        return Err(StalenessError::UnhandledShape(entry.to_string()));
    }
    NaiveDate::parse_from_str(&token, "%Y %b %d")
        .map_err(|_| StalenessError::DateParse(entry.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "ERROR";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn removed_past_date_is_stale() {
        let old = "Mo-Fr 09:00-12:00; PH off; 2020 Dec 31,2021 Jan 05 09:00-12:00";
        let new = "Mo-Fr 09:00-12:00; PH off; 2021 Jan 05 09:00-12:00";
        let verdict = assess(old, new, date("2021-06-01"), MARKER).unwrap();
        assert_eq!(
            verdict,
            Staleness::Stale {
                removed: vec![date("2020-12-31")]
            }
        );
        assert!(is_stale_removal(old, new, date("2021-06-01"), MARKER));
    }

    #[test]
    fn removed_future_date_is_not_stale() {
        let old = "Mo-Fr 09:00-12:00; PH off; 2020 Dec 31,2021 Jan 05 09:00-12:00";
        let new = "Mo-Fr 09:00-12:00; PH off; 2021 Jan 05 09:00-12:00";
        let verdict = assess(old, new, date("2020-12-01"), MARKER).unwrap();
        assert_eq!(
            verdict,
            Staleness::FutureRemoval {
                date: date("2020-12-31")
            }
        );
        assert!(!is_stale_removal(old, new, date("2020-12-01"), MARKER));
    }

    #[test]
    fn removal_dated_today_counts_as_past() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2021 Mar 01 off";
        let new = "Mo-Fr 09:00-17:00; PH off";
        assert!(is_stale_removal(old, new, date("2021-03-01"), MARKER));
        assert!(!is_stale_removal(old, new, date("2021-02-28"), MARKER));
    }

    #[test]
    fn all_special_days_removed() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24 09:00-12:00; 2020 Dec 31 off";
        let new = "Mo-Fr 09:00-17:00; PH off";
        let verdict = assess(old, new, date("2021-01-10"), MARKER).unwrap();
        assert_eq!(
            verdict,
            Staleness::Stale {
                removed: vec![date("2020-12-24"), date("2020-12-31")]
            }
        );
    }

    #[test]
    fn shared_leading_clause_is_skipped() {
        // 2020 Dec 24 is upcoming but present on both sides, so only Dec 26 counts.
        let old = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24 09:00-12:00; 2020 Dec 26 off; 2021 Jan 02 off";
        let new = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24 09:00-12:00; 2021 Jan 02 off";
        assert!(is_stale_removal(old, new, date("2020-12-27"), MARKER));
        assert!(!is_stale_removal(old, new, date("2020-12-20"), MARKER));
    }

    #[test]
    fn day_range_uses_first_day() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2021 Feb 08-12 off; 2021 Mar 01 off";
        let new = "Mo-Fr 09:00-17:00; PH off; 2021 Mar 01 off";
        let verdict = assess(old, new, date("2021-02-09"), MARKER).unwrap();
        assert_eq!(
            verdict,
            Staleness::Stale {
                removed: vec![date("2021-02-08")]
            }
        );
    }

    #[test]
    fn recurring_schedule_change_diverges() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 31 off";
        let new = "Mo-Fr 09:00-17:30; PH off";
        assert_eq!(
            assess(old, new, date("2021-06-01"), MARKER).unwrap(),
            Staleness::Diverged
        );
    }

    #[test]
    fn missing_ph_off_diverges() {
        let old = "Mo-Fr 09:00-17:00; 2020 Dec 31 off";
        let new = "Mo-Fr 09:00-17:00";
        assert!(!is_stale_removal(old, new, date("2021-06-01"), MARKER));
        assert!(!is_stale_removal(new, old, date("2021-06-01"), MARKER));
    }

    #[test]
    fn added_special_day_diverges() {
        let old = "Mo-Fr 09:00-17:00; PH off";
        let new = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 31 off";
        assert_eq!(
            assess(old, new, date("2021-06-01"), MARKER).unwrap(),
            Staleness::Diverged
        );
    }

    #[test]
    fn separator_change_alone_diverges() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24,2020 Dec 31 off";
        let new = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24; 2020 Dec 31 off";
        assert_eq!(
            assess(old, new, date("2021-06-01"), MARKER).unwrap(),
            Staleness::Diverged
        );
    }

    #[test]
    fn whitespace_change_around_comma_diverges() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24 off,2020 Dec 31 off";
        let new = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24 off, 2020 Dec 31 off";
        assert_eq!(
            assess(old, new, date("2021-06-01"), MARKER).unwrap(),
            Staleness::Diverged
        );
        assert!(!is_stale_removal(old, new, date("2021-06-01"), MARKER));
    }

    #[test]
    fn spaced_list_entry_does_not_match_bare_clause() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24 off, 2021 Jan 02 off";
        let new = "Mo-Fr 09:00-17:00; PH off; 2021 Jan 02 off";
        assert_eq!(
            assess(old, new, date("2021-06-01"), MARKER).unwrap(),
            Staleness::Diverged
        );
    }

    #[test]
    fn error_marker_never_stale() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 31 off";
        let new = "ERROR";
        assert!(!is_stale_removal(old, new, date("2021-06-01"), MARKER));
    }

    #[test]
    fn unparseable_removed_date_fails_closed() {
        let old = "Mo-Fr 09:00-17:00; PH off; Dec 25 off; 2021 Jan 02 off";
        let new = "Mo-Fr 09:00-17:00; PH off; 2021 Jan 02 off";
        let err = assess(old, new, date("2021-06-01"), MARKER).unwrap_err();
        assert_eq!(err, StalenessError::DateParse("Dec 25 off".into()));
        assert!(!is_stale_removal(old, new, date("2021-06-01"), MARKER));
    }

    #[test]
    fn surviving_colon_fails_closed() {
        let old = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 24 9:00-12:00; 2021 Jan 02 off";
        let new = "Mo-Fr 09:00-17:00; PH off; 2021 Jan 02 off";
        let err = assess(old, new, date("2021-06-01"), MARKER).unwrap_err();
        assert!(matches!(err, StalenessError::UnhandledShape(_)));
    }

    #[test]
    fn identical_tails_are_stale_with_nothing_removed() {
        let expr = "Mo-Fr 09:00-17:00; PH off; 2020 Dec 31 off";
        assert_eq!(
            assess(expr, expr, date("2020-01-01"), MARKER).unwrap(),
            Staleness::Stale { removed: vec![] }
        );
    }

    #[test]
    fn normalise_entries() {
        assert_eq!(parse_special_day("2020 Dec 31 07:30-12:00").unwrap(), date("2020-12-31"));
        assert_eq!(parse_special_day("2020 Dec 25 off").unwrap(), date("2020-12-25"));
        assert_eq!(parse_special_day("2021 Feb 08-12").unwrap(), date("2021-02-08"));
        assert_eq!(parse_special_day("2021 Feb 08-12 off").unwrap(), date("2021-02-08"));
        assert!(parse_special_day("13:00-15:00").is_err());
    }
}
