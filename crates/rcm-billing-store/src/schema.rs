//! File names and record layouts of the reports directory.

use serde::Deserialize;

/// File names at the root of the reports directory.
pub mod file {
    /// PI roster.
    pub const PI_ROSTER: &str = "myorg_pis.csv";

    /// Project and fund-org registry.
    pub const PROJECT_REGISTRY: &str = "fundorg_codes.csv";

    /// Mail addressees by role.
    pub const ADDRESSEES: &str = "email_addressees.csv";
}

/// Subdirectories of a period directory.
pub mod dir {
    /// One compute feed per PI.
    pub const COMPUTE_FEEDS: &str = "sreport";

    /// Dated storage snapshots.
    pub const SNAPSHOTS: &str = "disk_usage";

    /// Rendered statements.
    pub const STATEMENTS: &str = "statements";
}

/// Prefix of storage snapshot file names.
pub const SNAPSHOT_PREFIX: &str = "du_group-";

/// Extension of compute feeds and snapshots.
pub const TEXT_EXTENSION: &str = "txt";

/// One row of the addressee file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Addressee {
    /// Role key, such as `finance` or `support`.
    #[serde(rename = "Description")]
    pub role: String,
    /// Display name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Mail address.
    #[serde(rename = "Email")]
    pub email: String,
}
