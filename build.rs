//! Build script for psylab
//!
//! Embeds the git revision, build time and target into the binary so
//! `psylab version` and the default session user agent can report them.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let hash = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let dirty = git(&["status", "--porcelain"])
        .map(|out| !out.is_empty())
        .unwrap_or(false);

    let built = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=PSYLAB_GIT_HASH={}", hash);
    println!("cargo:rustc-env=PSYLAB_GIT_BRANCH={}", branch);
    println!("cargo:rustc-env=PSYLAB_GIT_DIRTY={}", dirty);
    println!("cargo:rustc-env=PSYLAB_BUILD_TIMESTAMP={}", built);
    println!("cargo:rustc-env=PSYLAB_TARGET={}", target);
    println!("cargo:rustc-env=PSYLAB_PROFILE={}", profile);
}

/// Run a git command and return its trimmed stdout, if it succeeded.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}
