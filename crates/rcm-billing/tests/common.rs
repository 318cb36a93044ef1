//! Common test utilities for rcm-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::TempDir;

use rcm_billing::SiteConfig;
use rcm_billing_core::BillingPeriod;
use rcm_billing_store::{FsStore, LedgerStore};

pub const PIS: &str = "\
Last Name,First Name,User ID,Email,College,Department,Active?
Smith,Alice,as123,alice@example.edu,Arts and Sciences,Physics,1
Jones,Bob,bj45,bob@example.edu,Engineering,Chemistry,1
Gone,Carl,cg9,carl@example.edu,Engineering,Biology,0
";

pub const PROJECTS: &str = "\
Project,Fund-Org code,Class?,MRI?,Startup/Grant?,Monthly credit?,Share expiration,Last name,First name,Email
smithprj,123456-0001,N,N,N,N,n/a,Smith,Alice,alice@example.edu
jonesprj,654321-0002,N,Y,N,Y,2025-06-30,Jones,Bob,bob@example.edu
gonePrj,111111-0003,N,N,N,N,,Gone,Carl,carl@example.edu
";

pub const ADDRESSEES: &str = "\
Description,Name,Email
support,Cluster Support,support@example.edu
finance,Finance Officer,finance@example.edu
sysadmin,Sysadmins,root@example.edu
debug,Debug Inbox,debug@example.edu
";

/// Test harness over a temporary reports directory.
pub struct TestHarness {
    /// The store under test.
    pub store: FsStore,
    /// Configuration with defaults.
    pub config: SiteConfig,
    /// Temporary reports directory (kept alive for test duration).
    pub dir: TempDir,
}

impl TestHarness {
    /// Create a reports directory holding the rosters and addressees.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("myorg_pis.csv"), PIS).unwrap();
        fs::write(dir.path().join("fundorg_codes.csv"), PROJECTS).unwrap();
        fs::write(dir.path().join("email_addressees.csv"), ADDRESSEES).unwrap();
        let store = FsStore::open(dir.path(), "MYCLUSTER").expect("Failed to open store");

        Self {
            store,
            config: SiteConfig::default(),
            dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Store a compute feed charging `smith_minutes` to smithprj and
    /// `jones_minutes` to jonesprj.
    pub fn put_compute(&self, period: BillingPeriod, smith_minutes: u64, jones_minutes: u64) {
        let smith = format!(
            "preamble\n-----\n\n\n\
             Cluster|Account|Login|Proper Name|TRES Name|Used\n\
             mycluster|smith|||billing|{smith_minutes}\n\
             mycluster| smithprj|||billing|{smith_minutes}\n\
             mycluster|  smithprj|as123|Alice Smith|billing|{smith_minutes}\n"
        );
        let jones = format!(
            "preamble\n-----\n\n\n\
             Cluster|Account|Login|Proper Name|TRES Name|Used\n\
             mycluster|jones|||billing|{jones_minutes}\n\
             mycluster| jonesprj|||billing|{jones_minutes}\n\
             mycluster|  jonesprj|bj45|Bob Jones|billing|{jones_minutes}\n"
        );
        self.store.put_compute_feed(period, "smith", &smith).unwrap();
        self.store.put_compute_feed(period, "jones", &jones).unwrap();
    }

    /// Store an empty-usage month-end snapshot naming the given groups.
    pub fn put_empty_snapshot(&self, period: BillingPeriod, groups: &[&str]) {
        let date = NaiveDate::from_ymd_opt(period.year(), period.month(), period.days_in_month())
            .unwrap();
        let text: String = groups
            .iter()
            .map(|g| format!("0\t/ifs/groups/{g}\n"))
            .collect();
        self.store.put_snapshot(date, &text).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
