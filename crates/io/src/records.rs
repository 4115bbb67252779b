// Pipe-delimited hours files: `reference|display_name|hours`, one per line.
//
// Used for both the external dataset and the saved baseline.

use std::collections::BTreeMap;
use std::path::Path;

use posthours_recon::model::{HoursRecord, Issue};

use crate::{read_to_string, write_atomic, Result};

/// Parse hours records from `text`. `source` names the input in issues.
///
/// Fields are trimmed. Only the first two `|` split, so an hours value may
/// itself contain `|`. Blank lines are skipped. A line with fewer than three
/// fields or an empty reference is reported as malformed and skipped. When a
/// reference repeats, the later line wins.
pub fn parse_records(source: &str, text: &str) -> (BTreeMap<String, HoursRecord>, Vec<Issue>) {
    let mut records = BTreeMap::new();
    let mut issues = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.splitn(3, '|').map(str::trim).collect();
        let (reference, display_name, hours) = match fields.as_slice() {
            [r, n, h] if !r.is_empty() => (*r, *n, *h),
            _ => {
                tracing::warn!(source, line = line_no, content = line, "malformed record skipped");
                issues.push(Issue::MalformedRecord {
                    source: source.to_string(),
                    line: line_no,
                    content: line.to_string(),
                });
                continue;
            }
        };

        let record = HoursRecord::new(reference, display_name, hours);
        if records.insert(reference.to_string(), record).is_some() {
            tracing::warn!(source, line = line_no, reference, "repeated reference, later line wins");
        }
    }

    tracing::debug!(source, records = records.len(), malformed = issues.len(), "parsed hours records");
    (records, issues)
}

/// Read and parse a hours file.
pub fn read_records(path: &Path) -> Result<(BTreeMap<String, HoursRecord>, Vec<Issue>)> {
    let text = read_to_string(path)?;
    Ok(parse_records(&path.display().to_string(), &text))
}

/// Render records one per line, in iteration order.
pub fn format_records<'a>(records: impl IntoIterator<Item = &'a HoursRecord>) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str(&r.reference);
        out.push('|');
        out.push_str(&r.display_name);
        out.push('|');
        out.push_str(&r.hours);
        out.push('\n');
    }
    out
}

/// Write records sorted by reference, replacing `path` atomically.
pub fn write_records(path: &Path, records: &BTreeMap<String, HoursRecord>) -> Result<()> {
    write_atomic(path, format_records(records.values()).as_bytes())?;
    tracing::info!(path = %path.display(), records = records.len(), "wrote hours file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_trimmed_fields() {
        let (records, issues) = parse_records(
            "hours.txt",
            " PO1 | High Street | Mo-Fr 09:00-17:30; PH off \n",
        );
        assert!(issues.is_empty());
        let r = &records["PO1"];
        assert_eq!(r.display_name, "High Street");
        assert_eq!(r.hours, "Mo-Fr 09:00-17:30; PH off");
    }

    #[test]
    fn hours_may_contain_pipes() {
        let (records, _) = parse_records("hours.txt", "PO1|Name|Mo 09:00-10:00|odd");
        assert_eq!(records["PO1"].hours, "Mo 09:00-10:00|odd");
    }

    #[test]
    fn blank_lines_ignored_malformed_reported() {
        let text = "PO1|A|Mo 09:00-10:00\n\n   \nPO2 only\n|nameless|Tu 09:00-10:00\nPO3|C|We 09:00-10:00\n";
        let (records, issues) = parse_records("hours.txt", text);

        assert_eq!(records.keys().collect::<Vec<_>>(), vec!["PO1", "PO3"]);
        assert_eq!(issues.len(), 2);
        assert_eq!(
            issues[0],
            Issue::MalformedRecord {
                source: "hours.txt".into(),
                line: 4,
                content: "PO2 only".into(),
            }
        );
        assert!(matches!(&issues[1], Issue::MalformedRecord { line: 5, .. }));
    }

    #[test]
    fn repeated_reference_keeps_last() {
        let (records, issues) = parse_records("hours.txt", "PO1|A|Mo 09:00-10:00\nPO1|A|Tu 09:00-10:00\n");
        assert!(issues.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records["PO1"].hours, "Tu 09:00-10:00");
    }

    #[test]
    fn crlf_line_endings() {
        let (records, issues) = parse_records("hours.txt", "PO1|A|Mo 09:00-10:00\r\nPO2|B|ERROR\r\n");
        assert!(issues.is_empty());
        assert_eq!(records["PO1"].hours, "Mo 09:00-10:00");
        assert_eq!(records["PO2"].hours, "ERROR");
    }

    #[test]
    fn write_sorted_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hours.txt");

        let mut records = BTreeMap::new();
        for (r, n, h) in [("B2", "Bee", "Sa 09:00-12:00"), ("A1", "Ay", "Mo-Fr 09:00-17:00; PH off")] {
            records.insert(r.to_string(), HoursRecord::new(r, n, h));
        }
        write_records(&path, &records).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "A1|Ay|Mo-Fr 09:00-17:00; PH off\nB2|Bee|Sa 09:00-12:00\n");

        let (back, issues) = read_records(&path).unwrap();
        assert!(issues.is_empty());
        assert_eq!(back, records);
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = read_records(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, crate::IoError::Read { .. }));
    }
}
