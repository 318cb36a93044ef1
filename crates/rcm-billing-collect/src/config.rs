//! Collector configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Programs and paths used to measure cluster usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Slurm accounting report program (default: `sreport`).
    pub sreport_program: String,

    /// Disk usage program (default: `du`).
    pub du_program: String,

    /// Group database query program (default: `getent`).
    pub getent_program: String,

    /// Directory holding one directory per research group.
    pub groups_root: PathBuf,

    /// Basename suffix of research group directories (default: `Grp`).
    pub group_suffix: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sreport_program: "sreport".to_string(),
            du_program: "du".to_string(),
            getent_program: "getent".to_string(),
            groups_root: PathBuf::from("/ifs/groups"),
            group_suffix: "Grp".to_string(),
        }
    }
}

impl CollectorConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `sreport` program.
    #[must_use]
    pub fn with_sreport_program(mut self, program: impl Into<String>) -> Self {
        self.sreport_program = program.into();
        self
    }

    /// Set the disk usage program.
    #[must_use]
    pub fn with_du_program(mut self, program: impl Into<String>) -> Self {
        self.du_program = program.into();
        self
    }

    /// Set the group database program.
    #[must_use]
    pub fn with_getent_program(mut self, program: impl Into<String>) -> Self {
        self.getent_program = program.into();
        self
    }

    /// Set the groups root directory.
    #[must_use]
    pub fn with_groups_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.groups_root = root.into();
        self
    }

    /// Set the group directory suffix.
    #[must_use]
    pub fn with_group_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.group_suffix = suffix.into();
        self
    }
}
