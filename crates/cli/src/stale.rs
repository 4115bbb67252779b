//! `posthours check-stale` - run the special-day staleness checker by hand.

use chrono::{NaiveDate, Utc};

use posthours_recon::staleness::{assess, Staleness};

use crate::exit_codes::{EXIT_ERROR, EXIT_NOT_STALE};
use crate::CliError;

pub fn cmd_check_stale(
    old: String,
    new: String,
    now: Option<NaiveDate>,
    error_marker: String,
    json_output: bool,
) -> Result<(), CliError> {
    let today = now.unwrap_or_else(|| Utc::now().date_naive());
    let verdict = assess(&old, &new, today, &error_marker);
    let stale = matches!(verdict, Ok(Staleness::Stale { .. }));

    let (label, detail) = match &verdict {
        Ok(Staleness::Stale { removed }) => (
            "stale",
            removed
                .iter()
                .map(|d| d.format("%Y %b %d").to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Ok(Staleness::Diverged) => ("diverged", String::new()),
        Ok(Staleness::FutureRemoval { date }) => {
            ("future_removal", date.format("%Y %b %d").to_string())
        }
        Err(e) => ("unchecked", e.to_string()),
    };

    if json_output {
        let out = serde_json::json!({
            "stale": stale,
            "verdict": label,
            "detail": detail,
            "today": today.to_string(),
        });
        let s = serde_json::to_string_pretty(&out)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{s}");
    } else if detail.is_empty() {
        println!("{label}");
    } else {
        println!("{label}: {detail}");
    }

    if stale {
        Ok(())
    } else {
        Err(CliError::silent(EXIT_NOT_STALE))
    }
}
