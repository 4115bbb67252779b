// Override list: references whose external hours always win.

use std::path::Path;

use posthours_recon::model::OverrideSet;

use crate::{read_to_string, Result};

/// One reference per line. Blank lines and `#` comments are skipped.
pub fn parse_overrides(text: &str) -> OverrideSet {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

/// Load the override list. A missing file means no overrides.
pub fn load_overrides(path: &Path) -> Result<OverrideSet> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no override list");
        return Ok(OverrideSet::new());
    }
    let set = parse_overrides(&read_to_string(path)?);
    tracing::debug!(path = %path.display(), overrides = set.len(), "loaded override list");
    Ok(set)
}
