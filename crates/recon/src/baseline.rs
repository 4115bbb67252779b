//! Baseline updater - folds this run's external values into the memory of
//! "what the external source said last time".

use std::collections::BTreeMap;

use crate::model::{Baseline, HoursRecord};

/// Build the next baseline.
///
/// Every external reference takes its external record as received, error
/// marker included, independent of whether the map write happens. References
/// gone from the external dataset drop out. The previous baseline plays no
/// part.
pub fn update_baseline(external: &BTreeMap<String, HoursRecord>) -> Baseline {
    external.values().cloned().collect()
}
