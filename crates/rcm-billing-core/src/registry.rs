//! PI roster and project registry.
//!
//! Both rosters are CSV exports maintained by hand, sometimes saved with a
//! byte-order mark (the `csv` reader drops it). Each ends at the first row
//! whose identity cell is empty; anything after that row is ignored.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Sentinel codes for projects without an assigned fund-org.
pub const UNASSIGNED_FUND_ORG_CODES: [&str; 2] = ["xxxxxx-xxxx", "000000-0000"];

/// A principal investigator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pi {
    /// Last name as written in the roster.
    pub last_name: String,
    /// First name.
    pub first_name: String,
    /// Cluster login.
    pub login: String,
    /// Email address, the key project rows use.
    pub email: String,
    /// College.
    pub college: String,
    /// Department.
    pub department: String,
    /// Whether the PI's projects are billed.
    pub is_active: bool,
}

impl Pi {
    /// Last name in the form used for scheduler account names.
    #[must_use]
    pub fn account_name(&self) -> String {
        normalize_last_name(&self.last_name)
    }
}

impl PartialEq for Pi {
    fn eq(&self, other: &Self) -> bool {
        self.login == other.login
            && self.first_name == other.first_name
            && self.last_name == other.last_name
    }
}

impl Eq for Pi {}

impl Hash for Pi {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.login.hash(state);
        self.first_name.hash(state);
        self.last_name.hash(state);
    }
}

/// A project's accounting code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundOrgCode {
    /// A six-digit fund and four-digit organization.
    Assigned {
        /// Fund number.
        fund: String,
        /// Organization number.
        org: String,
        /// The code exactly as it appeared in the registry.
        raw: String,
    },
    /// No code assigned yet; the raw sentinel is kept.
    Unassigned(String),
}

impl FundOrgCode {
    /// Parse a registry cell.
    ///
    /// Returns `None` for anything other than `NNNNNN<sep>NNNN` (any single
    /// non-digit separator) or an unassigned sentinel.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let raw = value.trim();
        if UNASSIGNED_FUND_ORG_CODES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(raw))
        {
            return Some(Self::Unassigned(raw.to_string()));
        }
        let (fund, org) = split_fund_org(raw)?;
        Some(Self::Assigned {
            fund: fund.to_string(),
            org: org.to_string(),
            raw: raw.to_string(),
        })
    }

    /// Whether the code can be charged.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }

    /// The code as written in the registry.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Assigned { raw, .. } | Self::Unassigned(raw) => raw,
        }
    }
}

impl fmt::Display for FundOrgCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split `NNNNNN<sep>NNNN` on its first non-digit.
///
/// The separator is any single non-digit character because spreadsheet
/// exports turn some hyphens into en-dashes.
#[must_use]
pub fn split_fund_org(code: &str) -> Option<(&str, &str)> {
    let sep_start = code.find(|c: char| !c.is_ascii_digit())?;
    let (fund, rest) = code.split_at(sep_start);
    let sep_len = rest.chars().next()?.len_utf8();
    let org = &rest[sep_len..];
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    (fund.len() == 6 && org.len() == 4 && all_digits(org)).then_some((fund, org))
}

/// Normalize a last name for matching against login-derived account names.
///
/// A name with exactly one space, or else exactly one hyphen, loses that
/// separator. Names with more separators are left joined as written.
#[must_use]
pub fn normalize_last_name(last_name: &str) -> String {
    let name = last_name.trim();
    let joined = if name.split(' ').count() == 2 {
        name.replace(' ', "")
    } else if name.split('-').count() == 2 {
        name.replace('-', "")
    } else {
        name.to_string()
    };
    joined.to_lowercase()
}

/// Normalize a project name: trimmed and lower-cased.
#[must_use]
pub fn normalize_project_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A project row from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Normalized project name.
    pub name: String,
    /// Email of the owning PI.
    pub pi_email: String,
    /// Coursework project; never charged.
    pub is_class: bool,
    /// Funded by a major research instrumentation grant.
    pub is_mri: bool,
    /// Funded by startup or grant money.
    pub is_startup: bool,
    /// Receives the monthly credit in the accounting feed.
    pub gets_credit: bool,
    /// End of the MRI/startup share, if any.
    pub share_expiration: Option<NaiveDate>,
    /// Accounting code.
    pub fund_org: FundOrgCode,
}

/// In-memory PI and project lookups for one run.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pis: Vec<Pi>,
    by_login: HashMap<String, usize>,
    by_email: HashMap<String, usize>,
    by_last_name: HashMap<String, usize>,
    projects: HashMap<String, ProjectRecord>,
}

#[derive(Debug, Deserialize)]
struct PiRow {
    #[serde(rename = "Last Name", default)]
    last_name: String,
    #[serde(rename = "First Name", default)]
    first_name: String,
    #[serde(rename = "User ID", default)]
    login: String,
    #[serde(rename = "Email", default)]
    email: String,
    #[serde(rename = "College", default)]
    college: String,
    #[serde(rename = "Department", default)]
    department: String,
    #[serde(rename = "Active?", default)]
    active: String,
}

#[derive(Debug, Deserialize)]
struct ProjectRow {
    #[serde(rename = "Project", default)]
    project: String,
    #[serde(rename = "Fund-Org code", default)]
    fund_org: String,
    #[serde(rename = "Class?", default)]
    is_class: String,
    #[serde(rename = "MRI?", default)]
    is_mri: String,
    #[serde(rename = "Startup/Grant?", default)]
    is_startup: String,
    #[serde(rename = "Monthly credit?", default)]
    gets_credit: String,
    #[serde(rename = "Share expiration", default)]
    share_expiration: String,
    #[serde(rename = "Email", default)]
    email: String,
}

impl Registry {
    /// Load both rosters.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` for malformed rows or a project whose PI
    /// email is not in the PI roster.
    pub fn load<P: Read, J: Read>(pi_roster: P, project_roster: J) -> Result<Self, RegistryError> {
        let mut registry = Self::from_pis(read_pis(pi_roster)?);
        for record in read_projects(project_roster)? {
            registry.insert_project(record)?;
        }
        tracing::info!(
            pis = registry.pis.len(),
            projects = registry.projects.len(),
            "Registry loaded"
        );
        Ok(registry)
    }

    /// Build the PI indices.
    #[must_use]
    pub fn from_pis(pis: Vec<Pi>) -> Self {
        let mut registry = Self::default();
        for (idx, pi) in pis.iter().enumerate() {
            registry.by_login.insert(pi.login.clone(), idx);
            registry.by_email.insert(pi.email.clone(), idx);
            if let Some(prev) = registry.by_last_name.insert(pi.account_name(), idx) {
                tracing::warn!(
                    last_name = %pi.last_name,
                    shadowed = %pis[prev].login,
                    "Two PIs share a normalized last name; keeping the later one"
                );
            }
        }
        registry.pis = pis;
        registry
    }

    /// Add a project record.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownPiEmail` if the PI is not loaded.
    pub fn insert_project(&mut self, record: ProjectRecord) -> Result<(), RegistryError> {
        if !self.by_email.contains_key(&record.pi_email) {
            return Err(RegistryError::UnknownPiEmail {
                project: record.name,
                email: record.pi_email,
            });
        }
        self.projects.insert(record.name.clone(), record);
        Ok(())
    }

    /// All PIs in roster order.
    #[must_use]
    pub fn pis(&self) -> &[Pi] {
        &self.pis
    }

    /// Active PIs in roster order.
    pub fn active_pis(&self) -> impl Iterator<Item = &Pi> {
        self.pis.iter().filter(|pi| pi.is_active)
    }

    /// Look up a PI by login.
    #[must_use]
    pub fn pi_by_login(&self, login: &str) -> Option<&Pi> {
        self.by_login.get(login).map(|&idx| &self.pis[idx])
    }

    /// Look up a PI by email.
    #[must_use]
    pub fn pi_by_email(&self, email: &str) -> Option<&Pi> {
        self.by_email.get(email).map(|&idx| &self.pis[idx])
    }

    /// Look up a PI by last name, normalized before lookup.
    #[must_use]
    pub fn pi_by_last_name(&self, last_name: &str) -> Option<&Pi> {
        self.by_last_name
            .get(&normalize_last_name(last_name))
            .map(|&idx| &self.pis[idx])
    }

    /// Look up a project, normalizing the name first.
    #[must_use]
    pub fn project(&self, name: &str) -> Option<&ProjectRecord> {
        self.projects.get(&normalize_project_name(name))
    }

    /// The PI owning `project`.
    #[must_use]
    pub fn pi_for(&self, project: &ProjectRecord) -> Option<&Pi> {
        self.pi_by_email(&project.pi_email)
    }

    /// Number of registered projects.
    #[must_use]
    pub fn project_count(&self) -> usize {
        self.projects.len()
    }
}

/// Parse the PI roster, stopping at the first row without a last name.
///
/// # Errors
///
/// Returns `RegistryError` for unreadable CSV or a bad `Active?` cell.
pub fn read_pis<R: Read>(reader: R) -> Result<Vec<Pi>, RegistryError> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .flexible(true)
        .from_reader(reader);
    let mut pis = Vec::new();
    for (idx, row) in csv.deserialize::<PiRow>().enumerate() {
        let row = row?;
        if row.last_name.is_empty() {
            tracing::debug!(row = idx + 1, "PI roster ends at empty last name");
            break;
        }
        let is_active = row
            .active
            .parse::<i64>()
            .map_err(|_| RegistryError::InvalidField {
                row: idx + 1,
                field: "Active?",
                value: row.active.clone(),
            })?
            == 1;
        pis.push(Pi {
            last_name: row.last_name,
            first_name: row.first_name,
            login: row.login,
            email: row.email,
            college: row.college,
            department: row.department,
            is_active,
        });
    }
    Ok(pis)
}

/// Parse the project registry, stopping at the first row without a project.
///
/// # Errors
///
/// Returns `RegistryError` for unreadable CSV or cells that cannot be
/// interpreted.
pub fn read_projects<R: Read>(reader: R) -> Result<Vec<ProjectRecord>, RegistryError> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .flexible(true)
        .from_reader(reader);
    let mut projects = Vec::new();
    for (idx, row) in csv.deserialize::<ProjectRow>().enumerate() {
        let row = row?;
        let line = idx + 1;
        if row.project.is_empty() {
            tracing::debug!(row = line, "Project registry ends at empty project name");
            break;
        }
        let name = normalize_project_name(&row.project);
        let fund_org =
            FundOrgCode::parse(&row.fund_org).ok_or_else(|| RegistryError::InvalidFundOrg {
                project: name.clone(),
                value: row.fund_org.clone(),
            })?;
        projects.push(ProjectRecord {
            is_class: parse_flag(&row.is_class, line, "Class?")?,
            is_mri: parse_flag(&row.is_mri, line, "MRI?")?,
            is_startup: parse_flag(&row.is_startup, line, "Startup/Grant?")?,
            gets_credit: parse_flag(&row.gets_credit, line, "Monthly credit?")?,
            share_expiration: parse_expiration(&row.share_expiration, line)?,
            pi_email: row.email,
            fund_org,
            name,
        });
    }
    Ok(projects)
}

fn parse_flag(value: &str, row: usize, field: &'static str) -> Result<bool, RegistryError> {
    match value.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(RegistryError::InvalidField {
            row,
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_expiration(value: &str, row: usize) -> Result<Option<NaiveDate>, RegistryError> {
    if value.is_empty() || value.eq_ignore_ascii_case("n/a") {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| RegistryError::InvalidField {
            row,
            field: "Share expiration",
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIS: &str = "\
Last Name,First Name,User ID,Email,College,Department,Active?
Smith,Alice,as123,alice@example.edu,Arts and Sciences,Physics,1
Van Dyke,Bob,bv45,bob@example.edu,Engineering,Materials,0
,,,,,,
Ghost,Casper,cg1,casper@example.edu,Medicine,Anatomy,1
";

    const PROJECTS: &str = "\
Project,Fund-Org code,Class?,MRI?,Startup/Grant?,Monthly credit?,Share expiration,Last name,First name,Email
SmithPrj,123456-0001,False,True,False,True,2025-06-30,Smith,Alice,alice@example.edu
phys101prj,xxxxxx-xxxx,True,False,False,False,n/a,Smith,Alice,alice@example.edu
vandykeprj,123456\u{2013}0002,no,no,yes,no,,Van Dyke,Bob,bob@example.edu
";

    #[test]
    fn pi_roster_stops_at_empty_last_name() {
        let pis = read_pis(PIS.as_bytes()).unwrap();
        let names: Vec<_> = pis.iter().map(|p| p.last_name.as_str()).collect();
        assert_eq!(names, ["Smith", "Van Dyke"]);
        assert!(pis[0].is_active);
        assert!(!pis[1].is_active);
    }

    #[test]
    fn project_roster_stops_at_empty_project() {
        let rows = format!("{PROJECTS},,,,,,,,,\nlaterprj,123456-0003,F,F,F,F,,X,Y,z@example.edu\n");
        let projects = read_projects(rows.as_bytes()).unwrap();
        assert_eq!(projects.len(), 3);
        assert!(projects.iter().all(|p| p.name != "laterprj"));
    }

    #[test]
    fn loads_and_indexes() {
        let registry = Registry::load(PIS.as_bytes(), PROJECTS.as_bytes()).unwrap();
        assert_eq!(registry.pis().len(), 2);
        assert_eq!(registry.project_count(), 3);
        assert_eq!(registry.pi_by_login("as123").unwrap().first_name, "Alice");
        assert_eq!(registry.pi_by_email("bob@example.edu").unwrap().login, "bv45");
        assert_eq!(registry.pi_by_last_name("Van Dyke").unwrap().login, "bv45");
        assert_eq!(registry.pi_by_last_name("vandyke").unwrap().login, "bv45");

        let smith = registry.project(" SMITHPRJ ").unwrap();
        assert!(smith.is_mri);
        assert!(smith.gets_credit);
        assert_eq!(smith.share_expiration, NaiveDate::from_ymd_opt(2025, 6, 30));
        assert_eq!(registry.pi_for(smith).unwrap().login, "as123");

        let class = registry.project("phys101prj").unwrap();
        assert!(class.is_class);
        assert!(!class.fund_org.is_assigned());
        assert_eq!(class.share_expiration, None);
    }

    #[test]
    fn bom_prefixed_roster_is_accepted() {
        let with_bom = format!("\u{feff}{PIS}");
        let pis = read_pis(with_bom.as_bytes()).unwrap();
        assert_eq!(pis[0].last_name, "Smith");
    }

    #[test]
    fn unknown_pi_email_is_an_error() {
        let projects = "\
Project,Fund-Org code,Class?,MRI?,Startup/Grant?,Monthly credit?,Share expiration,Last name,First name,Email
lostprj,123456-0001,F,F,F,F,,Nobody,No,nobody@example.edu
";
        let err = Registry::load(PIS.as_bytes(), projects.as_bytes()).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownPiEmail { ref email, .. } if email == "nobody@example.edu"));
    }

    #[test]
    fn malformed_fund_org_is_an_error() {
        let projects = "\
Project,Fund-Org code,Class?,MRI?,Startup/Grant?,Monthly credit?,Share expiration,Last name,First name,Email
badprj,12345-0001,F,F,F,F,,Smith,Alice,alice@example.edu
";
        let err = read_projects(projects.as_bytes()).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidFundOrg { .. }));
    }

    #[test]
    fn bad_flag_is_an_error() {
        let projects = "\
Project,Fund-Org code,Class?,MRI?,Startup/Grant?,Monthly credit?,Share expiration,Last name,First name,Email
badprj,123456-0001,maybe,F,F,F,,Smith,Alice,alice@example.edu
";
        let err = read_projects(projects.as_bytes()).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidField { field: "Class?", .. }));
    }

    #[test]
    fn fund_org_split_ignores_separator_kind() {
        assert_eq!(split_fund_org("123456-0001"), Some(("123456", "0001")));
        assert_eq!(split_fund_org("123456\u{2013}0001"), Some(("123456", "0001")));
        assert_eq!(split_fund_org("123456 0001"), Some(("123456", "0001")));
        assert_eq!(split_fund_org("1234560001"), None);
        assert_eq!(split_fund_org("123456--0001"), None);
        assert_eq!(split_fund_org("123456-00012"), None);
    }

    #[test]
    fn fund_org_sentinels_are_unassigned() {
        assert_eq!(
            FundOrgCode::parse("xxxxxx-xxxx"),
            Some(FundOrgCode::Unassigned("xxxxxx-xxxx".to_string()))
        );
        assert_eq!(
            FundOrgCode::parse("000000-0000"),
            Some(FundOrgCode::Unassigned("000000-0000".to_string()))
        );
        assert!(FundOrgCode::parse("123456-0001").unwrap().is_assigned());
        assert_eq!(FundOrgCode::parse("TBD"), None);
    }

    #[test]
    fn last_name_normalization() {
        assert_eq!(normalize_last_name("Van Dyke"), "vandyke");
        assert_eq!(normalize_last_name("Smith-Jones"), "smithjones");
        assert_eq!(normalize_last_name("De La Cruz"), "de la cruz");
        assert_eq!(normalize_last_name(" Smith "), "smith");
    }

    #[test]
    fn pi_identity_ignores_contact_details() {
        let pis = read_pis(PIS.as_bytes()).unwrap();
        let mut moved = pis[0].clone();
        moved.email = "alice@elsewhere.edu".to_string();
        moved.department = "Chemistry".to_string();
        assert_eq!(moved, pis[0]);
        assert_ne!(pis[0], pis[1]);
    }
}
