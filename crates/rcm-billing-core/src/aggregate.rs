//! Aggregation of measured usage into the period ledger.

use std::collections::BTreeSet;

use crate::error::{AggregationError, Result};
use crate::ledger::{LedgerEntry, SummaryLedger};
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;
use crate::registry::Registry;
use crate::usage::{ComputeUsage, StorageUsage};

/// Merge compute and storage usage into a [`SummaryLedger`].
///
/// Every measured storage project is a billing candidate. Exempt projects
/// and projects of inactive PIs are skipped; compute usage is attached
/// where reported, and registry data supplies the PI, flags and fund-org.
///
/// # Errors
///
/// Returns `AggregationError::UnknownProject` for a measured project the
/// registry does not know, and `AggregationError::UnresolvedPi` if its PI
/// cannot be found.
pub fn aggregate(
    registry: &Registry,
    compute: &ComputeUsage,
    storage: &StorageUsage,
    period: BillingPeriod,
    policy: &BillingPolicy,
) -> Result<SummaryLedger> {
    let mut entries = Vec::new();
    let mut billed = BTreeSet::new();

    for measured in storage.projects() {
        let name = measured.name.as_str();
        if policy.is_exempt(name) {
            tracing::debug!(project = name, "Skipping exempt project");
            continue;
        }
        let record = registry
            .project(name)
            .ok_or_else(|| AggregationError::UnknownProject {
                project: name.to_string(),
            })?;
        let pi = registry
            .pi_for(record)
            .ok_or_else(|| AggregationError::UnresolvedPi {
                project: name.to_string(),
                email: record.pi_email.clone(),
            })?;
        if !pi.is_active {
            tracing::info!(project = name, pi = %pi.login, "Skipping project of inactive PI");
            continue;
        }

        let entry = LedgerEntry::new(record, pi, compute.project(name), Some(measured), policy);
        if entry.is_class {
            tracing::debug!(project = name, "Class project; charges zeroed");
        }
        billed.insert(name.to_string());
        entries.push(entry);
    }

    for usage in compute.projects() {
        if !billed.contains(&usage.name) && !policy.is_exempt(&usage.name) {
            tracing::warn!(
                project = %usage.name,
                su = %usage.su,
                "Compute usage without storage snapshot; not billed"
            );
        }
    }
    for pi in compute.pis() {
        if registry.pi_by_last_name(&pi.account).is_none() {
            tracing::warn!(account = %pi.account, "Compute feed for unknown PI account");
        }
    }

    let ledger = SummaryLedger::new(period, policy.cluster.clone(), entries);
    tracing::info!(
        %period,
        projects = ledger.entries().len(),
        total = %ledger.total_charge(),
        "Aggregated usage"
    );
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::error::BillingError;
    use crate::usage::{parse_compute_feed, parse_snapshot};

    const PIS: &str = "\
Last Name,First Name,User ID,Email,College,Department,Active?
Smith,Alice,as123,alice@example.edu,Arts,Physics,1
Adams,Bob,ba45,bob@example.edu,Engineering,Materials,1
Gone,Carl,cg1,carl@example.edu,Medicine,Anatomy,0
";

    const PROJECTS: &str = "\
Project,Fund-Org code,Class?,MRI?,Startup/Grant?,Monthly credit?,Share expiration,Last name,First name,Email
smithprj,123456-0001,F,F,F,T,,Smith,Alice,alice@example.edu
phys101prj,xxxxxx-xxxx,T,F,F,F,,Smith,Alice,alice@example.edu
adamsprj,123456-0002,F,F,F,F,,Adams,Bob,bob@example.edu
goneprj,123456-0003,F,F,F,F,,Gone,Carl,carl@example.edu
";

    const FEED: &str = "a\nb\nc\nd\nCluster|Account|Login|Proper Name|TRES Name|Used
c|smith|||billing|120000
c| smithprj|||billing|60000
c|  smithprj|alice|Alice Smith|billing|60000
c| phys101prj|||billing|60000
c|  phys101prj|stu|Student|billing|60000
c| orphanprj|||billing|600
";

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn fixtures(du: &str) -> (Registry, ComputeUsage, StorageUsage, BillingPolicy) {
        let policy = BillingPolicy::default();
        let registry = Registry::load(PIS.as_bytes(), PROJECTS.as_bytes()).unwrap();
        let mut compute = ComputeUsage::new();
        parse_compute_feed("smith.txt", FEED, &mut compute).unwrap();
        let snapshot = parse_snapshot("du_group-2023-09-30.txt", du, &policy).unwrap();
        let storage =
            StorageUsage::from_snapshots("2023-09".parse().unwrap(), &policy, &[snapshot]).unwrap();
        (registry, compute, storage, policy)
    }

    #[test]
    fn aggregates_measured_projects() {
        let du = "0\t/g/SmithGrp\n0\t/g/phys101Grp\n0\t/g/AdamsGrp\n0\t/g/GoneGrp\n";
        let (registry, compute, storage, policy) = fixtures(du);
        let ledger =
            aggregate(&registry, &compute, &storage, "2023-09".parse().unwrap(), &policy).unwrap();

        let order: Vec<_> = ledger.entries().iter().map(|e| e.project.as_str()).collect();
        assert_eq!(order, ["adamsprj", "phys101prj", "smithprj"]);

        let smith = ledger.entry("smithprj").unwrap();
        // 60000 min = 1000 SU -> 12.30
        assert_eq!(smith.compute_charge(), d("12.30"));
        assert_eq!(smith.total_charge(), d("12.30"));
        assert!(smith.gets_credit);

        let class = ledger.entry("phys101prj").unwrap();
        assert_eq!(class.compute_su(), d("1000"));
        assert_eq!(class.total_charge(), Decimal::ZERO);

        assert_eq!(ledger.entry("adamsprj").unwrap().total_charge(), Decimal::ZERO);
        assert!(ledger.entry("goneprj").is_none());
    }

    #[test]
    fn exempt_projects_are_skipped() {
        let du = "0\t/g/SmithGrp\n0\t/g/InternGrp\n";
        let (registry, compute, storage, mut policy) = fixtures(du);
        policy.no_charge_projects.insert("internprj".to_string());
        let ledger =
            aggregate(&registry, &compute, &storage, "2023-09".parse().unwrap(), &policy).unwrap();
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn exempt_projects_match_whatever_case_is_configured() {
        let du = "0\t/g/SmithGrp\n0\t/g/InternGrp\n0\t/g/OldGrp\n";
        let (registry, compute, storage, mut policy) = fixtures(du);
        policy.no_charge_projects.insert("InternPrj".to_string());
        policy.defunct_projects.insert("OLDPRJ".to_string());
        let ledger =
            aggregate(&registry, &compute, &storage, "2023-09".parse().unwrap(), &policy).unwrap();
        let order: Vec<_> = ledger.entries().iter().map(|e| e.project.as_str()).collect();
        assert_eq!(order, ["smithprj"]);
    }

    #[test]
    fn unregistered_project_is_fatal() {
        let du = "0\t/g/SmithGrp\n0\t/g/MysteryGrp\n";
        let (registry, compute, storage, policy) = fixtures(du);
        let err = aggregate(&registry, &compute, &storage, "2023-09".parse().unwrap(), &policy)
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Aggregation(AggregationError::UnknownProject { ref project })
                if project == "mysteryprj"
        ));
    }
}
