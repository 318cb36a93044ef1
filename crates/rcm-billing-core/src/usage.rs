//! Usage ingestion.
//!
//! Two raw sources feed a billing run:
//!
//! - **Compute feeds**: one pipe-delimited scheduler report per PI. The
//!   `Account` column is indented to show nesting: no leading space for the
//!   PI, one for a project, two or more for a user within that project.
//! - **Storage snapshots**: dated `du -sk` listings of the group
//!   directories, one file per snapshot day.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::IngestionError;
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;
use crate::registry::normalize_project_name;

/// Lines before the header row of a compute feed.
pub const COMPUTE_FEED_PREAMBLE_LINES: usize = 4;

/// Minutes per SU.
const MINUTES_PER_SU: i64 = 60;

/// One classified row of a compute feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageRecord {
    /// PI-level total.
    Pi {
        /// PI account name.
        account: String,
        /// Service units.
        su: Decimal,
    },
    /// Project-level total.
    Project {
        /// Normalized project name.
        project: String,
        /// Service units.
        su: Decimal,
    },
    /// One user's usage within the enclosing project.
    User {
        /// Project name as written on the user row.
        project: String,
        /// User login.
        login: String,
        /// Display name.
        full_name: String,
        /// Service units.
        su: Decimal,
    },
}

/// Where the parser is in the PI → project → user hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FeedState {
    Start,
    PiContext { pi: String },
    ProjectContext { pi: String, project: String },
    UserContext { pi: String, project: String },
}

/// One user's compute usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUsage {
    /// Login.
    pub login: String,
    /// Display name.
    pub full_name: String,
    /// Service units.
    pub su: Decimal,
}

/// Compute usage of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUsage {
    /// Normalized project name.
    pub name: String,
    /// Account of the PI row enclosing the project.
    pub pi_account: String,
    /// Project total in SU.
    pub su: Decimal,
    /// Per-user lines in feed order.
    pub users: Vec<UserUsage>,
}

/// PI-level compute total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiUsage {
    /// PI account name.
    pub account: String,
    /// Service units across all the PI's projects.
    pub su: Decimal,
    /// Projects in feed order.
    pub projects: Vec<String>,
}

/// Compute usage merged from every PI feed of a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUsage {
    pis: BTreeMap<String, PiUsage>,
    projects: BTreeMap<String, ProjectUsage>,
}

impl ComputeUsage {
    /// Create empty usage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage of `project`, if any feed reported it.
    #[must_use]
    pub fn project(&self, project: &str) -> Option<&ProjectUsage> {
        self.projects.get(project)
    }

    /// Every project, ordered by name.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectUsage> {
        self.projects.values()
    }

    /// Every PI-level total, ordered by account.
    pub fn pis(&self) -> impl Iterator<Item = &PiUsage> {
        self.pis.values()
    }

    /// Whether no feed contributed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pis.is_empty() && self.projects.is_empty()
    }

    fn apply(
        &mut self,
        source_name: &str,
        line: usize,
        state: FeedState,
        record: UsageRecord,
    ) -> Result<FeedState, IngestionError> {
        match (state, record) {
            (_, UsageRecord::Pi { account, su }) => {
                self.pis.insert(
                    account.clone(),
                    PiUsage {
                        account: account.clone(),
                        su,
                        projects: Vec::new(),
                    },
                );
                Ok(FeedState::PiContext { pi: account })
            }
            (FeedState::Start, UsageRecord::Project { project, .. }) => {
                Err(IngestionError::OrphanProject {
                    source_name: source_name.to_string(),
                    line,
                    project,
                })
            }
            (
                FeedState::PiContext { pi }
                | FeedState::ProjectContext { pi, .. }
                | FeedState::UserContext { pi, .. },
                UsageRecord::Project { project, su },
            ) => {
                if self.projects.contains_key(&project) {
                    return Err(IngestionError::DuplicateProject {
                        source_name: source_name.to_string(),
                        project,
                    });
                }
                if let Some(pi_usage) = self.pis.get_mut(&pi) {
                    pi_usage.projects.push(project.clone());
                }
                self.projects.insert(
                    project.clone(),
                    ProjectUsage {
                        name: project.clone(),
                        pi_account: pi.clone(),
                        su,
                        users: Vec::new(),
                    },
                );
                Ok(FeedState::ProjectContext { pi, project })
            }
            (FeedState::Start | FeedState::PiContext { .. }, UsageRecord::User { login, .. }) => {
                Err(IngestionError::OrphanUser {
                    source_name: source_name.to_string(),
                    line,
                    login,
                })
            }
            (
                FeedState::ProjectContext { pi, project } | FeedState::UserContext { pi, project },
                UsageRecord::User {
                    project: named,
                    login,
                    full_name,
                    su,
                },
            ) => {
                if normalize_project_name(&named) != project {
                    tracing::warn!(
                        source = source_name,
                        line,
                        row_project = %named,
                        enclosing = %project,
                        "User row names a different project than its enclosing row"
                    );
                }
                if let Some(usage) = self.projects.get_mut(&project) {
                    usage.users.push(UserUsage {
                        login,
                        full_name,
                        su,
                    });
                }
                Ok(FeedState::UserContext { pi, project })
            }
        }
    }
}

struct FeedColumns {
    account: usize,
    login: usize,
    full_name: usize,
    used: usize,
    width: usize,
}

impl FeedColumns {
    fn from_header(source_name: &str, header: &str) -> Result<Self, IngestionError> {
        let cells: Vec<&str> = header.split('|').map(str::trim).collect();
        let find = |column: &'static str| {
            cells
                .iter()
                .position(|c| *c == column)
                .ok_or_else(|| IngestionError::MissingColumn {
                    source_name: source_name.to_string(),
                    column,
                })
        };
        Ok(Self {
            account: find("Account")?,
            login: find("Login")?,
            full_name: find("Proper Name")?,
            used: find("Used")?,
            width: cells.len(),
        })
    }
}

/// Classify one data row by the indentation of its account cell.
fn classify(
    source_name: &str,
    line: usize,
    cells: &[&str],
    columns: &FeedColumns,
) -> Result<UsageRecord, IngestionError> {
    let raw_account = cells[columns.account];
    let account = raw_account.trim();
    if account.is_empty() {
        return Err(IngestionError::BlankAccount {
            source_name: source_name.to_string(),
            line,
        });
    }
    let used = cells[columns.used].trim();
    let minutes = Decimal::from_str(used)
        .or_else(|_| Decimal::from_scientific(used))
        .map_err(|_| IngestionError::InvalidNumber {
            source_name: source_name.to_string(),
            line,
            value: used.to_string(),
        })?;
    let su = minutes / Decimal::from(MINUTES_PER_SU);

    let depth = raw_account.len() - raw_account.trim_start_matches(' ').len();
    Ok(match depth {
        0 => UsageRecord::Pi {
            account: account.to_string(),
            su,
        },
        1 => UsageRecord::Project {
            project: normalize_project_name(account),
            su,
        },
        _ => UsageRecord::User {
            project: account.to_string(),
            login: cells[columns.login].trim().to_string(),
            full_name: cells[columns.full_name].trim().to_string(),
            su,
        },
    })
}

/// Parse one PI's compute feed into `usage`.
///
/// # Errors
///
/// Returns `IngestionError` for a missing header, malformed rows, rows
/// that break the PI → project → user nesting, or a project already
/// present in `usage`.
pub fn parse_compute_feed(
    source_name: &str,
    text: &str,
    usage: &mut ComputeUsage,
) -> Result<(), IngestionError> {
    let mut lines = text
        .lines()
        .enumerate()
        .skip(COMPUTE_FEED_PREAMBLE_LINES)
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| IngestionError::MissingHeader {
        source_name: source_name.to_string(),
    })?;
    let columns = FeedColumns::from_header(source_name, header)?;

    let mut state = FeedState::Start;
    let mut rows = 0usize;
    for (idx, raw) in lines {
        let line = idx + 1;
        let cells: Vec<&str> = raw.split('|').collect();
        if cells.len() < columns.width {
            return Err(IngestionError::ShortRow {
                source_name: source_name.to_string(),
                line,
                expected: columns.width,
                found: cells.len(),
            });
        }
        let record = classify(source_name, line, &cells, &columns)?;
        state = usage.apply(source_name, line, state, record)?;
        rows += 1;
    }

    tracing::debug!(source = source_name, rows, "Compute feed parsed");
    Ok(())
}

/// One project's size in a storage snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Project name derived from the group directory.
    pub project: String,
    /// Size in kiB.
    pub kib: u64,
}

/// A dated storage snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    /// Snapshot name, usually the file name.
    pub source_name: String,
    /// Day the snapshot was taken.
    pub date: NaiveDate,
    /// Per-project sizes.
    pub entries: Vec<StorageEntry>,
}

/// Extract the date from a snapshot name such as `du_group-2023-09-07.txt`.
#[must_use]
pub fn snapshot_date_from_name(name: &str) -> Option<NaiveDate> {
    let stem = name.rsplit('/').next().unwrap_or(name);
    let stem = stem.split_once('.').map_or(stem, |(s, _)| s);
    let start = stem.len().checked_sub(10)?;
    NaiveDate::parse_from_str(stem.get(start..)?, "%Y-%m-%d").ok()
}

/// Parse a storage snapshot.
///
/// # Errors
///
/// Returns `IngestionError` if the name encodes no date or a line is not
/// `<kiB>\t<path>`. Lines without a tab may separate the two fields with
/// any whitespace.
pub fn parse_snapshot(
    source_name: &str,
    text: &str,
    policy: &BillingPolicy,
) -> Result<StorageSnapshot, IngestionError> {
    let date = snapshot_date_from_name(source_name)
        .ok_or_else(|| IngestionError::UndatedSnapshot(source_name.to_string()))?;

    let mut entries = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let malformed = || IngestionError::MalformedSnapshotLine {
            source_name: source_name.to_string(),
            line: idx + 1,
            content: raw.to_string(),
        };
        // `du` separates size and path with a tab; paths may contain spaces.
        let (size, path) = match raw.split_once('\t') {
            Some((size, path)) => (size.trim(), path.trim()),
            None => {
                let mut fields = raw.split_whitespace();
                let (Some(size), Some(path), None) = (fields.next(), fields.next(), fields.next())
                else {
                    return Err(malformed());
                };
                (size, path)
            }
        };
        if path.is_empty() {
            return Err(malformed());
        }
        let kib = size.parse::<u64>().map_err(|_| malformed())?;
        let group = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
        entries.push(StorageEntry {
            project: policy.project_for_group(group),
            kib,
        });
    }

    Ok(StorageSnapshot {
        source_name: source_name.to_string(),
        date,
        entries,
    })
}

/// Storage usage of one project over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStorage {
    /// Project name.
    pub name: String,
    /// Day-weighted service units.
    pub su: Decimal,
    /// Size in the latest snapshot, kiB.
    pub latest_kib: u64,
}

/// Storage usage of every measured project over a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    projects: BTreeMap<String, ProjectStorage>,
    snapshot_count: usize,
}

impl StorageUsage {
    /// Fold snapshots into per-project SU.
    ///
    /// Each snapshot contributes `kiB × rate_per_kiB_day × day_weight`.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::SnapshotOutsidePeriod` for a snapshot dated
    /// outside `period`, and `IngestionError::DuplicateSnapshotDate` if two
    /// snapshots share a date.
    pub fn from_snapshots(
        period: BillingPeriod,
        policy: &BillingPolicy,
        snapshots: &[StorageSnapshot],
    ) -> Result<Self, IngestionError> {
        let rate = policy.storage_rate_per_kib_day(period.days_in_month());
        let mut ordered: Vec<&StorageSnapshot> = snapshots.iter().collect();
        ordered.sort_by_key(|s| s.date);

        let mut usage = Self::default();
        let mut previous: Option<&StorageSnapshot> = None;
        for snapshot in ordered {
            if !period.contains(snapshot.date) {
                return Err(IngestionError::SnapshotOutsidePeriod {
                    source_name: snapshot.source_name.clone(),
                    date: snapshot.date,
                    period,
                });
            }
            if let Some(earlier) = previous.filter(|p| p.date == snapshot.date) {
                return Err(IngestionError::DuplicateSnapshotDate {
                    date: snapshot.date,
                    first: earlier.source_name.clone(),
                    second: snapshot.source_name.clone(),
                });
            }
            previous = Some(snapshot);
            let weight = Decimal::from(period.snapshot_weight(snapshot.date.day()));
            for entry in &snapshot.entries {
                let project = usage
                    .projects
                    .entry(entry.project.clone())
                    .or_insert_with(|| ProjectStorage {
                        name: entry.project.clone(),
                        su: Decimal::ZERO,
                        latest_kib: 0,
                    });
                project.su += Decimal::from(entry.kib) * rate * weight;
                project.latest_kib = entry.kib;
            }
            usage.snapshot_count += 1;
        }

        if usage.snapshot_count == 0 {
            tracing::warn!(%period, "No storage snapshots for period");
        }
        Ok(usage)
    }

    /// Storage of `project`, if measured.
    #[must_use]
    pub fn project(&self, project: &str) -> Option<&ProjectStorage> {
        self.projects.get(project)
    }

    /// Every measured project, ordered by name.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectStorage> {
        self.projects.values()
    }

    /// Number of snapshots folded in.
    #[must_use]
    pub const fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "\
--------------------------------------------------------------------------------
Cluster/Account/User Utilization 2023-09-01T00:00:00 - 2023-09-30T23:59:59 (2592000 secs)
Usage reported in TRES Minutes
--------------------------------------------------------------------------------
Cluster|Account|Login|Proper Name|TRES Name|Used
mycluster|smith|||billing|6000
mycluster| smithprj|||billing|4800
mycluster|  smithprj|alice|Alice Smith|billing|3000
mycluster|  smithprj|carol|Carol Jones|billing|1800
mycluster| phys101prj|||billing|1200
mycluster|  phys101prj|stu1|Student One|billing|1200
";

    fn period() -> BillingPeriod {
        "2023-09".parse().unwrap()
    }

    #[test]
    fn parses_nested_compute_feed() {
        let mut usage = ComputeUsage::new();
        parse_compute_feed("smith.txt", FEED, &mut usage).unwrap();

        let pi = usage.pis().next().unwrap();
        assert_eq!(pi.account, "smith");
        assert_eq!(pi.su, Decimal::from(100));
        assert_eq!(pi.projects, ["smithprj", "phys101prj"]);

        let smith = usage.project("smithprj").unwrap();
        assert_eq!(smith.su, Decimal::from(80));
        assert_eq!(smith.pi_account, "smith");
        let logins: Vec<_> = smith.users.iter().map(|u| u.login.as_str()).collect();
        assert_eq!(logins, ["alice", "carol"]);
        assert_eq!(smith.users[1].su, Decimal::from(30));
        assert_eq!(smith.users[0].full_name, "Alice Smith");

        assert_eq!(usage.project("phys101prj").unwrap().users.len(), 1);
    }

    fn feed_with_rows(rows: &str) -> String {
        format!("a\nb\nc\nd\nCluster|Account|Login|Proper Name|TRES Name|Used\n{rows}")
    }

    #[test]
    fn user_before_project_is_orphan() {
        let text = feed_with_rows("c|smith|||b|60\nc|  smithprj|alice|A|b|60\n");
        let err = parse_compute_feed("f", &text, &mut ComputeUsage::new()).unwrap_err();
        assert!(matches!(err, IngestionError::OrphanUser { line: 7, ref login, .. } if login == "alice"));
    }

    #[test]
    fn project_before_pi_is_orphan() {
        let text = feed_with_rows("c| smithprj|||b|60\n");
        let err = parse_compute_feed("f", &text, &mut ComputeUsage::new()).unwrap_err();
        assert!(matches!(err, IngestionError::OrphanProject { .. }));
    }

    #[test]
    fn new_pi_row_clears_project_context() {
        let text = feed_with_rows(
            "c|smith|||b|60\nc| smithprj|||b|60\nc|jones|||b|0\nc|  smithprj|alice|A|b|60\n",
        );
        let err = parse_compute_feed("f", &text, &mut ComputeUsage::new()).unwrap_err();
        assert!(matches!(err, IngestionError::OrphanUser { .. }));
    }

    #[test]
    fn project_in_two_feeds_is_duplicate() {
        let mut usage = ComputeUsage::new();
        parse_compute_feed("smith.txt", FEED, &mut usage).unwrap();
        let err = parse_compute_feed("smith-again.txt", FEED, &mut usage).unwrap_err();
        assert!(matches!(err, IngestionError::DuplicateProject { ref project, .. } if project == "smithprj"));
    }

    #[test]
    fn feed_without_header_is_rejected() {
        let err = parse_compute_feed("f", "a\nb\nc\nd\n", &mut ComputeUsage::new()).unwrap_err();
        assert!(matches!(err, IngestionError::MissingHeader { .. }));

        let err = parse_compute_feed("f", "a\nb\nc\nd\nAccount|Used\n", &mut ComputeUsage::new())
            .unwrap_err();
        assert!(matches!(err, IngestionError::MissingColumn { column: "Login", .. }));
    }

    #[test]
    fn bad_used_value_is_rejected() {
        let text = feed_with_rows("c|smith|||b|lots\n");
        let err = parse_compute_feed("f", &text, &mut ComputeUsage::new()).unwrap_err();
        assert!(matches!(err, IngestionError::InvalidNumber { ref value, .. } if value == "lots"));
    }

    #[test]
    fn snapshot_dates_come_from_file_names() {
        assert_eq!(
            snapshot_date_from_name("du_group-2023-09-07.txt"),
            NaiveDate::from_ymd_opt(2023, 9, 7)
        );
        assert_eq!(
            snapshot_date_from_name("/reports/2023-09/disk_usage/du_group-2023-09-30.txt"),
            NaiveDate::from_ymd_opt(2023, 9, 30)
        );
        assert_eq!(snapshot_date_from_name("du_group.txt"), None);
    }

    #[test]
    fn parses_snapshot_lines() {
        let policy = BillingPolicy::default();
        let text = "1024\t/groups/SmithGrp\n\n2048\t/groups/sysadmins/\n";
        let snapshot = parse_snapshot("du_group-2023-09-07.txt", text, &policy).unwrap();
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].project, "smithprj");
        assert_eq!(snapshot.entries[0].kib, 1024);
        assert_eq!(snapshot.entries[1].project, "sysadmins");
    }

    #[test]
    fn malformed_snapshot_line_is_rejected() {
        let policy = BillingPolicy::default();
        let err = parse_snapshot("du_group-2023-09-07.txt", "big /groups/SmithGrp\n", &policy)
            .unwrap_err();
        assert!(matches!(err, IngestionError::MalformedSnapshotLine { line: 1, .. }));
        let err = parse_snapshot("du.txt", "1 /g/AGrp\n", &policy).unwrap_err();
        assert!(matches!(err, IngestionError::UndatedSnapshot(_)));
    }

    #[test]
    fn one_tib_for_a_week_of_a_thirty_day_month() {
        let policy = BillingPolicy::default();
        let text = "1073741824\t/groups/SmithGrp\n";
        let snapshot = parse_snapshot("du_group-2023-09-14.txt", text, &policy).unwrap();
        let usage = StorageUsage::from_snapshots(period(), &policy, &[snapshot]).unwrap();
        let su = usage.project("smithprj").unwrap().su;
        assert_eq!(su.round_dp(2), Decimal::from_str("252.23").unwrap());
    }

    #[test]
    fn whole_month_of_snapshots_bills_one_tib_month() {
        let policy = BillingPolicy::default();
        let snapshots: Vec<_> = [7, 14, 21, 28, 30]
            .iter()
            .map(|day| {
                parse_snapshot(
                    &format!("du_group-2023-09-{day:02}.txt"),
                    "1073741824\t/groups/SmithGrp\n",
                    &policy,
                )
                .unwrap()
            })
            .collect();
        let usage = StorageUsage::from_snapshots(period(), &policy, &snapshots).unwrap();
        assert_eq!(usage.snapshot_count(), 5);
        let su = usage.project("smithprj").unwrap().su;
        assert_eq!(su.round_dp(2), Decimal::from(1081));
    }

    #[test]
    fn snapshot_outside_period_is_rejected() {
        let policy = BillingPolicy::default();
        let snapshot =
            parse_snapshot("du_group-2023-10-07.txt", "1\t/g/SmithGrp\n", &policy).unwrap();
        let err = StorageUsage::from_snapshots(period(), &policy, &[snapshot]).unwrap_err();
        assert!(matches!(err, IngestionError::SnapshotOutsidePeriod { .. }));
    }

    #[test]
    fn snapshot_paths_may_contain_spaces() {
        let policy = BillingPolicy::default();
        let text = "512\t/groups/Lab Data Grp\n64 /groups/SmithGrp\n";
        let snapshot = parse_snapshot("du_group-2023-09-07.txt", text, &policy).unwrap();
        assert_eq!(snapshot.entries[0].project, "lab data prj");
        assert_eq!(snapshot.entries[0].kib, 512);
        assert_eq!(snapshot.entries[1].project, "smithprj");

        let err = parse_snapshot("du_group-2023-09-07.txt", "1 /g/A Grp\n", &policy).unwrap_err();
        assert!(matches!(err, IngestionError::MalformedSnapshotLine { .. }));
    }

    #[test]
    fn two_snapshots_on_one_date_are_rejected() {
        let policy = BillingPolicy::default();
        let snapshots: Vec<_> = ["du_group-2023-09-07.txt", "du_group-2023-09-07.old.txt"]
            .iter()
            .map(|name| parse_snapshot(name, "1073741824\t/groups/SmithGrp\n", &policy).unwrap())
            .collect();
        let err = StorageUsage::from_snapshots(period(), &policy, &snapshots).unwrap_err();
        assert!(matches!(
            err,
            IngestionError::DuplicateSnapshotDate { ref first, ref second, .. }
                if first == "du_group-2023-09-07.txt" && second == "du_group-2023-09-07.old.txt"
        ));
    }
}
