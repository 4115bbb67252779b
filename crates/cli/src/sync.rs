//! `posthours sync` / `posthours validate` - config-driven three-way sync.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

use posthours_io::baseline::{load_baseline, save_baseline};
use posthours_io::osm::OsmDocument;
use posthours_io::overrides::load_overrides;
use posthours_io::records::read_records;
use posthours_io::{write_atomic, IoError};
use posthours_recon::model::{OverrideSet, SyncInput, SyncResult};
use posthours_recon::{run, update_baseline, SyncConfig};

use crate::exit_codes::{
    EXIT_CONFLICTS, EXIT_DUPLICATES, EXIT_ERROR, EXIT_INPUT, EXIT_INVALID_CONFIG, EXIT_OUTPUT,
};
use crate::CliError;

fn sync_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError::new(code, msg)
}

fn input_err(e: IoError) -> CliError {
    sync_err(EXIT_INPUT, e.to_string())
}

fn output_err(e: IoError) -> CliError {
    sync_err(EXIT_OUTPUT, e.to_string())
}

/// Read and validate the config. Returns it with the directory that relative
/// file paths resolve against.
fn load_config(config_path: &Path) -> Result<(SyncConfig, PathBuf), CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        sync_err(EXIT_INPUT, format!("cannot read config {}: {e}", config_path.display()))
    })?;
    let config = SyncConfig::from_toml(&config_str)
        .map_err(|e| sync_err(EXIT_INVALID_CONFIG, e.to_string()))?;

    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((config, base_dir))
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let (config, _) = load_config(&config_path)?;
    eprintln!(
        "config OK: \"{}\" (ref tag {}, hours tag {}, overrides: {})",
        config.name,
        config.tags.reference,
        config.tags.hours,
        config.files.overrides.as_deref().unwrap_or("none"),
    );
    Ok(())
}

pub fn cmd_sync(
    config_path: PathBuf,
    now: Option<NaiveDate>,
    dry_run: bool,
    json_output: bool,
    strict: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let (config, base_dir) = load_config(&config_path)?;
    let files = &config.files;
    let resolve = |p: &str| base_dir.join(p);

    // Load inputs
    let (external, mut load_issues) = read_records(&resolve(&files.external)).map_err(input_err)?;
    let (baseline, baseline_issues) = load_baseline(&resolve(&files.baseline)).map_err(input_err)?;
    load_issues.extend(baseline_issues);
    let overrides = match &files.overrides {
        Some(p) => load_overrides(&resolve(p)).map_err(input_err)?,
        None => OverrideSet::new(),
    };
    let mut snapshot = OsmDocument::read(&resolve(&files.snapshot)).map_err(input_err)?;
    let entities = snapshot.map_entities(&config.tags);

    tracing::debug!(
        external = external.len(),
        baseline = baseline.len(),
        overrides = overrides.len(),
        entities = entities.len(),
        "inputs loaded"
    );

    // Run engine
    let input = SyncInput {
        external: &external,
        entities: &entities,
        baseline: &baseline,
        overrides: &overrides,
    };
    let mut result = run(&config, &input, run_time(now));
    if !load_issues.is_empty() {
        load_issues.append(&mut result.issues);
        result.issues = load_issues;
        result.summary.issues = result.issues.len();
    }
    let next_baseline = update_baseline(&external);

    // Write outputs: change file first, baseline last, so a failure part-way
    // leaves the previous baseline in place for the next run.
    if dry_run {
        tracing::info!(edits = result.edits.len(), "dry run, no files written");
    } else {
        // Always rewritten, so a run with no edits never leaves the previous
        // run's change file behind for upload.
        snapshot.apply_edits(&result.edits, &config.tags);
        let written = snapshot
            .write_changes(&resolve(&files.changes))
            .map_err(output_err)?;
        if written == 0 {
            tracing::info!("no edits, wrote empty change file");
        }
        save_baseline(&resolve(&files.baseline), &next_baseline).map_err(output_err)?;
    }

    let json_str = if json_output || (files.report.is_some() && !dry_run) {
        Some(
            serde_json::to_string_pretty(&result)
                .map_err(|e| sync_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?,
        )
    } else {
        None
    };

    if let (Some(report), Some(json), false) = (&files.report, &json_str, dry_run) {
        let path = resolve(report);
        write_atomic(&path, json.as_bytes()).map_err(output_err)?;
        tracing::info!(path = %path.display(), "wrote report");
    }

    if json_output {
        if let Some(json) = &json_str {
            println!("{json}");
        }
    }

    if !quiet {
        print_summary(&result);
    }

    let s = &result.summary;
    tracing::info!(
        entities = s.entities,
        writes = s.writes,
        conflicts = s.conflicts,
        duplicates = s.duplicates,
        issues = s.issues,
        "sync complete"
    );

    if strict {
        if s.duplicates > 0 {
            return Err(sync_err(
                EXIT_DUPLICATES,
                format!("{} duplicate references (strict)", s.duplicates),
            )
            .with_hint("each office reference should be on exactly one map element"));
        }
        if s.conflicts > 0 {
            return Err(sync_err(
                EXIT_CONFLICTS,
                format!("{} conflicts need review (strict)", s.conflicts),
            ));
        }
    }

    Ok(())
}

/// `--now` pins the run to the start of that UTC day.
fn run_time(now: Option<NaiveDate>) -> DateTime<Utc> {
    match now.and_then(|d| d.and_hms_opt(0, 0, 0)) {
        Some(dt) => dt.and_utc(),
        None => Utc::now(),
    }
}

/// Human summary to stderr.
fn print_summary(result: &SyncResult) {
    let s = &result.summary;
    eprintln!(
        "{}: {} map elements - {} writes, {} agree, {} conflicts, {} duplicates, {} unmatched external",
        result.meta.config_name,
        s.entities,
        s.writes,
        s.agreements,
        s.conflicts,
        s.duplicates,
        s.unmatched_external,
    );
    if s.issues > 0 {
        eprintln!("issues: {}", s.issues);
        for issue in result.issues.iter().take(10) {
            eprintln!("  {issue}");
        }
        if result.issues.len() > 10 {
            eprintln!("  ... and {} more", result.issues.len() - 10);
        }
    }
}
