//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: cron jobs and wrapper scripts
//! rely on them.
//!
//! | Code | Meaning                                           |
//! |------|---------------------------------------------------|
//! | 0    | Success                                           |
//! | 1    | General error / `check-stale` verdict "not stale" |
//! | 2    | CLI usage error (bad args)                        |
//! | 3    | Invalid config                                    |
//! | 4    | Missing or unreadable input                       |
//! | 5    | Output write failure                              |
//! | 6    | Duplicate references found (`--strict`)           |
//! | 7    | Conflicts left for a human (`--strict`)           |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// `check-stale`: the change is not a stale removal.
/// Like `diff(1)`, exit 1 means "no".
pub const EXIT_NOT_STALE: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Config file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// An input file (config, hours, baseline, overrides, snapshot) is missing
/// or unreadable.
pub const EXIT_INPUT: u8 = 4;

/// Writing the change file, baseline, report or merged output failed.
pub const EXIT_OUTPUT: u8 = 5;

/// Duplicate references found and `--strict` is set.
pub const EXIT_DUPLICATES: u8 = 6;

/// Human conflicts left unresolved and `--strict` is set.
pub const EXIT_CONFLICTS: u8 = 7;
