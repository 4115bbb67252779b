//! `posthours merge` - combine hours files, later inputs winning.

use std::collections::BTreeMap;
use std::path::PathBuf;

use posthours_io::records::{read_records, write_records};
use posthours_recon::model::HoursRecord;

use crate::exit_codes::{EXIT_INPUT, EXIT_OUTPUT};
use crate::CliError;

pub fn cmd_merge(inputs: Vec<PathBuf>, output: PathBuf) -> Result<(), CliError> {
    if inputs.contains(&output) {
        return Err(CliError::usage(format!(
            "output {} is also an input",
            output.display()
        ))
        .with_hint("write the merge to a new file"));
    }

    let mut merged: BTreeMap<String, HoursRecord> = BTreeMap::new();
    let mut malformed = 0;
    for path in &inputs {
        let (records, issues) =
            read_records(path).map_err(|e| CliError::new(EXIT_INPUT, e.to_string()))?;
        malformed += issues.len();
        let overridden = records.keys().filter(|r| merged.contains_key(*r)).count();
        tracing::debug!(path = %path.display(), records = records.len(), overridden, "merging");
        merged.extend(records);
    }

    write_records(&output, &merged).map_err(|e| CliError::new(EXIT_OUTPUT, e.to_string()))?;

    eprintln!(
        "merged {} records from {} files into {}",
        merged.len(),
        inputs.len(),
        output.display()
    );
    if malformed > 0 {
        eprintln!("skipped {malformed} malformed lines");
    }
    Ok(())
}
