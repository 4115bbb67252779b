//! `posthours-recon` - Opening-hours reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded records and map entities, returns
//! one decision per map entity plus the edits to apply. No CLI or IO dependencies.

pub mod baseline;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod staleness;
pub mod summary;

pub use baseline::update_baseline;
pub use config::SyncConfig;
pub use engine::{decide, run};
pub use error::ReconError;
pub use model::{
    Baseline, Decision, EntityKind, HoursRecord, Issue, MapEntity, OverrideSet, PendingEdit,
    SyncInput, SyncResult,
};
pub use staleness::is_stale_removal;
