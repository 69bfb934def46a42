//! Build information embedded by `build.rs`.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
    pub git_branch: &'static str,
    pub git_dirty: bool,
    pub built_at: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("PSYLAB_GIT_HASH"),
            git_branch: env!("PSYLAB_GIT_BRANCH"),
            git_dirty: env!("PSYLAB_GIT_DIRTY") == "true",
            built_at: env!("PSYLAB_BUILD_TIMESTAMP"),
            target: env!("PSYLAB_TARGET"),
            profile: env!("PSYLAB_PROFILE"),
        }
    }

    /// `0.1.0 (abc12345)`, with `-dirty` appended to the hash when applicable.
    pub fn short_version(&self) -> String {
        let dirty = if self.git_dirty { "-dirty" } else { "" };
        format!("{} ({}{})", self.version, self.git_hash, dirty)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.short_version())?;
        writeln!(f, "  branch:  {}", self.git_branch)?;
        writeln!(f, "  built:   {}", self.built_at)?;
        writeln!(f, "  target:  {}", self.target)?;
        write!(f, "  profile: {}", self.profile)
    }
}

/// User agent recorded with sessions started from this binary,
/// e.g. `psylab/0.1.0 (linux; x86_64)`.
pub fn default_user_agent() -> String {
    format!(
        "{}/{} ({}; {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
