// Saved baseline: the external hours as of the last successful sync.

use std::path::Path;

use posthours_recon::model::{Baseline, Issue};

use crate::records::{format_records, read_records};
use crate::{write_atomic, Result};

/// Load the baseline file. A missing file is a first run and yields an empty
/// baseline.
pub fn load_baseline(path: &Path) -> Result<(Baseline, Vec<Issue>)> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no saved baseline, starting empty");
        return Ok((Baseline::new(), Vec::new()));
    }
    let (records, issues) = read_records(path)?;
    Ok((records.into_values().collect(), issues))
}

/// Persist the baseline, sorted by reference, replacing `path` atomically.
pub fn save_baseline(path: &Path, baseline: &Baseline) -> Result<()> {
    write_atomic(path, format_records(baseline.iter()).as_bytes())?;
    tracing::info!(path = %path.display(), entries = baseline.len(), "saved baseline");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use posthours_recon::model::HoursRecord;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty_baseline() {
        let dir = tempdir().unwrap();
        let (baseline, issues) = load_baseline(&dir.path().join("saved_hours.txt")).unwrap();
        assert!(baseline.is_empty());
        assert!(issues.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved_hours.txt");
        let baseline: Baseline = [
            HoursRecord::new("PO2", "Station Road", "Mo-Sa 08:00-18:00; PH off"),
            HoursRecord::new("PO1", "High Street", "Mo-Fr 09:00-17:00"),
        ]
        .into_iter()
        .collect();

        save_baseline(&path, &baseline).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("PO1|"));

        let (loaded, issues) = load_baseline(&path).unwrap();
        assert!(issues.is_empty());
        assert_eq!(loaded, baseline);
    }

    #[test]
    fn save_overwrites_previous() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved_hours.txt");
        std::fs::write(&path, "OLD|x|Mo 09:00-10:00\n").unwrap();

        let baseline: Baseline = [HoursRecord::new("NEW", "y", "Tu 09:00-10:00")].into_iter().collect();
        save_baseline(&path, &baseline).unwrap();

        let (loaded, _) = load_baseline(&path).unwrap();
        assert!(loaded.get("OLD").is_none());
        assert_eq!(loaded.hours("NEW"), Some("Tu 09:00-10:00"));
    }
}
