//! Site configuration.
//!
//! One optional JSON file holds the billing policy at its top level plus
//! `collector` and `mail` sections. Every field has a default, so an empty
//! object is a valid configuration.
//!
//! ```json
//! {
//!   "cluster": "MYCLUSTER",
//!   "rate_per_su": "0.0123",
//!   "no_charge_projects": ["sysadminprj"],
//!   "collector": { "groups_root": "/ifs/groups" },
//!   "mail": { "program": "/usr/bin/mailx", "pdf_program": "weasyprint" }
//! }
//! ```

use std::path::{Path, PathBuf};

use rcm_billing_collect::CollectorConfig;
use rcm_billing_core::BillingPolicy;
use serde::Deserialize;

use crate::error::{Result, RunError};

/// Default reports directory.
pub const DEFAULT_PREFIX: &str = "/ifs/sysadmin/RCM";

/// Default pause between statement mails, in seconds.
pub const DEFAULT_PAUSE_SECS: u64 = 15;

/// Everything a run needs besides the command line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteConfig {
    /// Rates, exemptions and feed accounts.
    #[serde(flatten)]
    pub policy: BillingPolicy,

    /// Usage collection programs and paths.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Statement conversion and delivery.
    #[serde(default)]
    pub mail: MailConfig,
}

/// Statement conversion and mail delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// mailx-compatible program (default: `mail`).
    pub program: String,

    /// HTML to PDF converter run as `<program> <html> <pdf>`, if any.
    pub pdf_program: Option<String>,

    /// Seconds to wait after each statement mail.
    pub pause_secs: u64,

    /// Addressee roles.
    pub roles: MailRoles,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            program: "mail".to_string(),
            pdf_program: None,
            pause_secs: DEFAULT_PAUSE_SECS,
            roles: MailRoles::default(),
        }
    }
}

/// Role keys looked up in the addressee file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailRoles {
    /// Sender of every mail.
    pub support: String,
    /// Recipient of the summary and feed.
    pub finance: String,
    /// Copied on the summary mail.
    pub sysadmin: String,
    /// Receives everything in debug mode.
    pub debug: String,
}

impl Default for MailRoles {
    fn default() -> Self {
        Self {
            support: "support".to_string(),
            finance: "finance".to_string(),
            sysadmin: "sysadmin".to_string(),
            debug: "debug".to_string(),
        }
    }
}

impl SiteConfig {
    /// Load the configuration file at `path`, or the defaults if `None`.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Config` if the file cannot be read or parsed, or
    /// holds an out-of-range policy value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::debug!("No configuration file, using defaults");
            return Ok(Self::default());
        };

        let invalid = |message: String| RunError::Config {
            path: path.to_path_buf(),
            message,
        };
        let config: Self = load_config_file(path).map_err(invalid)?;
        config.policy.validate().map_err(|e| invalid(e.to_string()))?;
        tracing::info!(
            path = %path.display(),
            cluster = %config.policy.cluster,
            "Loaded configuration"
        );
        Ok(config)
    }
}

/// Load a JSON file.
fn load_config_file<T: serde::de::DeserializeOwned>(path: &Path) -> std::result::Result<T, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&contents).map_err(|e| e.to_string())
}

/// The default reports directory as a path.
#[must_use]
pub fn default_prefix() -> PathBuf {
    PathBuf::from(DEFAULT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_missing_path_gives_defaults() {
        let config = SiteConfig::load(None).unwrap();
        assert_eq!(config.policy, BillingPolicy::default());
        assert_eq!(config.mail.pause_secs, DEFAULT_PAUSE_SECS);
        assert_eq!(config.mail.roles.finance, "finance");
    }

    #[test]
    fn test_sections_and_flattened_policy() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rcm.json");
        std::fs::write(
            &path,
            r#"{
                "cluster": "PICOTTE",
                "rate_per_su": "0.02",
                "collector": {"groups_root": "/mnt/HA/groups"},
                "mail": {"pdf_program": "weasyprint", "roles": {"support": "orgnamesupport"}}
            }"#,
        )
        .unwrap();

        let config = SiteConfig::load(Some(&path)).unwrap();

        assert_eq!(config.policy.cluster, "PICOTTE");
        assert_eq!(config.policy.rate_per_su, Decimal::new(2, 2));
        assert_eq!(config.policy.monthly_credit, Decimal::from(100));
        assert_eq!(config.collector.groups_root, PathBuf::from("/mnt/HA/groups"));
        assert_eq!(config.mail.pdf_program.as_deref(), Some("weasyprint"));
        assert_eq!(config.mail.roles.support, "orgnamesupport");
        assert_eq!(config.mail.roles.debug, "debug");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rcm.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SiteConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, RunError::Config { .. }));
    }

    #[test]
    fn test_out_of_range_fiscal_start_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rcm.json");
        std::fs::write(&path, r#"{"fiscal_year_start_month": 13}"#).unwrap();

        let err = SiteConfig::load(Some(&path)).unwrap_err();
        assert!(
            matches!(&err, RunError::Config { message, .. } if message.contains("fiscal_year_start_month"))
        );
    }
}
