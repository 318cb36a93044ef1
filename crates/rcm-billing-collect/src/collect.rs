//! Usage collection runners.
//!
//! Each runner shells out to a site program, captures its output and hands
//! it to a [`LedgerStore`] unchanged, so the stored feeds are exactly what
//! the cluster reported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rcm_billing_core::{BillingPeriod, BillingPolicy, Registry};
use rcm_billing_store::LedgerStore;
use tracing::{debug, info, instrument, warn};

use crate::command::run_command;
use crate::config::CollectorConfig;
use crate::error::{CollectError, Result};

/// Arguments of the per-account utilization report for `period`.
///
/// Usage is reported in minutes.
#[must_use]
pub fn sreport_args(account: &str, period: BillingPeriod) -> Vec<String> {
    vec![
        "-P".to_string(),
        "cluster".to_string(),
        "AccountUtilizationByUser".to_string(),
        format!("Account={account}"),
        "Tree".to_string(),
        format!("Start={}", period.first_day().format("%Y-%m-%d")),
        format!("End={}", period.end_exclusive().format("%Y-%m-%d")),
        "-T".to_string(),
        "billing".to_string(),
    ]
}

/// Collect one compute feed per active PI for `period`.
///
/// Returns the paths written.
///
/// # Errors
///
/// Fails on the first report that cannot be run or stored.
#[instrument(skip(store, registry, config))]
pub async fn collect_compute<S>(
    store: &S,
    registry: &Registry,
    period: BillingPeriod,
    config: &CollectorConfig,
) -> Result<Vec<PathBuf>>
where
    S: LedgerStore + ?Sized,
{
    info!("Collecting compute feeds");

    let mut written = Vec::new();
    for pi in registry.active_pis() {
        let account = pi.account_name();
        let text = run_command(&config.sreport_program, &sreport_args(&account, period), None)
            .await?;
        let path = store.put_compute_feed(period, &account, &text)?;
        debug!(account = %account, path = %path.display(), "Compute feed stored");
        written.push(path);
    }

    info!(feeds = written.len(), "Compute feeds collected");
    Ok(written)
}

/// Research group directories under `root`, sorted by name.
///
/// # Errors
///
/// Returns `CollectError::GroupsRoot` if `root` cannot be listed.
pub async fn group_dirs(root: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let listing_error = |source| CollectError::GroupsRoot {
        path: root.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(root).await.map_err(listing_error)?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(listing_error)? {
        let is_group = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(suffix));
        if is_group && entry.file_type().await.map_err(listing_error)?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Take the storage snapshot for `date`.
///
/// Snapshots are only taken on snapshot days unless `force` is set.
/// Returns the path written, or `None` if no snapshot was taken.
///
/// # Errors
///
/// Fails if the groups cannot be listed, the disk usage program fails, or
/// the snapshot cannot be stored.
#[instrument(skip(store, config))]
pub async fn snapshot_storage<S>(
    store: &S,
    date: NaiveDate,
    config: &CollectorConfig,
    force: bool,
) -> Result<Option<PathBuf>>
where
    S: LedgerStore + ?Sized,
{
    if !force && !BillingPeriod::is_snapshot_day(date) {
        info!("Not a snapshot day");
        return Ok(None);
    }

    let dirs = group_dirs(&config.groups_root, &config.group_suffix).await?;
    if dirs.is_empty() {
        warn!(root = %config.groups_root.display(), "No group directories found");
        return Ok(None);
    }

    info!(groups = dirs.len(), "Measuring group disk usage");
    let mut args = vec![PathBuf::from("-sk")];
    args.extend(dirs);
    let text = run_command(&config.du_program, &args, None).await?;

    let path = store.put_snapshot(date, &text)?;
    info!(path = %path.display(), "Storage snapshot stored");
    Ok(Some(path))
}

/// Group member logins keyed by project name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMembers {
    by_project: BTreeMap<String, Vec<String>>,
}

impl GroupMembers {
    /// Member logins of `project`, empty if the group is unknown.
    #[must_use]
    pub fn members(&self, project: &str) -> &[String] {
        self.by_project
            .get(project)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of research groups found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_project.len()
    }

    /// Whether no research groups were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_project.is_empty()
    }
}

/// Parse `group(5)` database lines, keeping research groups only.
#[must_use]
pub fn parse_group_database(text: &str, policy: &BillingPolicy) -> GroupMembers {
    let mut by_project = BTreeMap::new();
    for line in text.lines() {
        let mut fields = line.trim().split(':');
        let (Some(name), Some(members)) = (fields.next(), fields.nth(2)) else {
            continue;
        };
        if !name.ends_with(policy.group_suffix.as_str()) {
            continue;
        }
        let mut logins: Vec<String> = members
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        logins.sort();
        by_project.insert(policy.project_for_group(name), logins);
    }
    GroupMembers { by_project }
}

/// Look up research group members in the system group database.
///
/// # Errors
///
/// Fails if the group database cannot be queried.
#[instrument(skip_all)]
pub async fn load_group_members(
    config: &CollectorConfig,
    policy: &BillingPolicy,
) -> Result<GroupMembers> {
    let text = run_command(&config.getent_program, &["group"], None).await?;
    let members = parse_group_database(&text, policy);
    debug!(groups = members.len(), "Group database loaded");
    Ok(members)
}
