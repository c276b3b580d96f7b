//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Shared primitives and utilities for the agent runtime."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use serde::Serialize;

/// Build metadata captured by `vergen` at compile time.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub semver: String,
    pub build_timestamp: String,
    pub target: String,
    pub profile: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION").to_owned(),
            build_timestamp: option_env!("VERGEN_BUILD_TIMESTAMP")
                .unwrap_or("unknown")
                .to_owned(),
            target: option_env!("VERGEN_CARGO_TARGET_TRIPLE")
                .unwrap_or("unknown")
                .to_owned(),
            profile: if cfg!(debug_assertions) {
                "debug".to_owned()
            } else {
                "release".to_owned()
            },
        }
    }

    /// Multi-field description printed by `--version`.
    pub fn extended(&self) -> String {
        format!(
            "{} (target {}, {} build, built {})",
            self.semver, self.target, self.profile, self.build_timestamp
        )
    }
}
