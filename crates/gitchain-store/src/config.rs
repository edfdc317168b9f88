//! Version store configuration.
//!
//! Defaults match a containerized deployment with repositories under
//! `/data/gitchain/repos`. Override via environment variables or explicit
//! construction for local use and tests.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default repository root.
pub const DEFAULT_DATA_DIR: &str = "/data/gitchain/repos";
/// Default commit author name.
pub const DEFAULT_AUTHOR_NAME: &str = "GitChain";
/// Default commit author email.
pub const DEFAULT_AUTHOR_EMAIL: &str = "system@gitchain.0711.io";

/// Configuration for a [`VersionStore`](crate::VersionStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory; namespaces live at `{base_dir}/{type}/{namespace}`.
    pub base_dir: PathBuf,
    /// Author name recorded on commits.
    pub author_name: String,
    /// Author email recorded on commits.
    pub author_email: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_DATA_DIR),
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

impl StoreConfig {
    /// Default author, custom root. The usual constructor in tests.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `GITCHAIN_DATA_DIR` (default: `/data/gitchain/repos`)
    /// - `GITCHAIN_AUTHOR_NAME` (default: `GitChain`)
    /// - `GITCHAIN_AUTHOR_EMAIL` (default: `system@gitchain.0711.io`)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply any `GITCHAIN_*` variables that are set on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = env_nonempty("GITCHAIN_DATA_DIR") {
            self.base_dir = PathBuf::from(dir);
        }
        if let Some(name) = env_nonempty("GITCHAIN_AUTHOR_NAME") {
            self.author_name = name;
        }
        if let Some(email) = env_nonempty("GITCHAIN_AUTHOR_EMAIL") {
            self.author_email = email;
        }
        self
    }
}

fn env_nonempty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.base_dir, PathBuf::from("/data/gitchain/repos"));
        assert_eq!(cfg.author_name, "GitChain");
        assert_eq!(cfg.author_email, "system@gitchain.0711.io");
    }

    #[test]
    fn env_overrides_apply() {
        std::env::set_var("GITCHAIN_AUTHOR_NAME", "Release Bot");
        let cfg = StoreConfig::with_base_dir("/tmp/x").with_env_overrides();
        std::env::remove_var("GITCHAIN_AUTHOR_NAME");
        assert_eq!(cfg.author_name, "Release Bot");
    }

    #[test]
    fn yaml_section_fills_missing_fields_with_defaults() {
        let cfg: StoreConfig = serde_json::from_str(r#"{"base_dir": "/srv/gc"}"#).unwrap();
        assert_eq!(cfg.base_dir, PathBuf::from("/srv/gc"));
        assert_eq!(cfg.author_name, DEFAULT_AUTHOR_NAME);
    }
}
