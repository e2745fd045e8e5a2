//! Build metadata embedded by `build.rs`.

use std::fmt;

use serde::Serialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What this binary was built from. Missing git data reads as "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub sha: &'static str,
    pub dirty: bool,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: PKG_VERSION,
            branch: or_unknown(option_env!("VERGEN_GIT_BRANCH")),
            sha: or_unknown(option_env!("VERGEN_GIT_SHA")),
            dirty: option_env!("VERGEN_GIT_DIRTY") == Some("true"),
        }
    }

    pub fn short_sha(&self) -> &'static str {
        self.sha.get(..7).unwrap_or(self.sha)
    }
}

/// `{version}+{branch}.{sha7}`, with `.dirty` appended for modified trees.
impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}.{}", self.version, self.branch, self.short_sha())?;
        if self.dirty {
            f.write_str(".dirty")?;
        }
        Ok(())
    }
}

const fn or_unknown(value: Option<&'static str>) -> &'static str {
    match value {
        Some(v) => v,
        None => "unknown",
    }
}

/// Logged by `huginnd` at startup and reported by `/health`.
pub fn version_string() -> String {
    BuildInfo::current().to_string()
}
