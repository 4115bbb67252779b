//! Stamps `posthours --version` with the source revision, build profile and
//! target triple.

use std::env;
use std::process::Command;

/// Release tarballs carry no `.git`; packagers can set this instead.
const HASH_OVERRIDE: &str = "POSTHOURS_GIT_HASH";

fn main() {
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/heads");
    println!("cargo:rerun-if-env-changed={HASH_OVERRIDE}");

    let revision = env::var(HASH_OVERRIDE)
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(git_short_hash)
        .unwrap_or_else(|| "unknown".into());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".into());
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".into());

    println!("cargo:rustc-env=POSTHOURS_REVISION={revision}");
    println!("cargo:rustc-env=POSTHOURS_PROFILE={profile}");
    println!("cargo:rustc-env=POSTHOURS_TARGET={target}");
}

fn git_short_hash() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let hash = String::from_utf8(out.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}
