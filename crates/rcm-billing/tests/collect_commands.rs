//! Collection subcommands driven through the command line.

mod common;

use std::fs;

use clap::Parser;
use common::TestHarness;
use rcm_billing::{execute, Cli};
use tempfile::TempDir;

fn write_config(harness: &TestHarness, groups: &TempDir) -> String {
    let path = harness.path("rcm.json");
    let config = serde_json::json!({
        "collector": {
            "groups_root": groups.path(),
            "sreport_program": "echo"
        }
    });
    fs::write(&path, config.to_string()).unwrap();
    path.to_string_lossy().into_owned()
}

fn cli(harness: &TestHarness, config: &str, command: &[&str]) -> Cli {
    let prefix = harness.root().to_string_lossy().into_owned();
    let mut args = vec!["rcm-billing", "--prefix", prefix.as_str(), "--policy", config];
    args.extend_from_slice(command);
    Cli::try_parse_from(args).unwrap()
}

#[tokio::test]
async fn snapshot_storage_on_snapshot_day() {
    let harness = TestHarness::new();
    let groups = TempDir::new().unwrap();
    fs::create_dir(groups.path().join("smithGrp")).unwrap();
    fs::create_dir(groups.path().join("jonesGrp")).unwrap();
    let config = write_config(&harness, &groups);

    execute(cli(&harness, &config, &["snapshot-storage", "--date", "2023-09-14"]))
        .await
        .unwrap();

    let snapshot = harness.read("2023-09/disk_usage/du_group-2023-09-14.txt");
    let lines: Vec<&str> = snapshot.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("jonesGrp"));
    assert!(lines[1].ends_with("smithGrp"));
}

#[tokio::test]
async fn snapshot_storage_off_schedule_needs_force() {
    let harness = TestHarness::new();
    let groups = TempDir::new().unwrap();
    fs::create_dir(groups.path().join("smithGrp")).unwrap();
    let config = write_config(&harness, &groups);

    execute(cli(&harness, &config, &["snapshot-storage", "--date", "2023-09-15"]))
        .await
        .unwrap();
    assert!(!harness.path("2023-09/disk_usage").exists());

    execute(cli(
        &harness,
        &config,
        &["snapshot-storage", "--date", "2023-09-15", "--force"],
    ))
    .await
    .unwrap();
    assert!(harness.path("2023-09/disk_usage/du_group-2023-09-15.txt").exists());
}

#[tokio::test]
async fn collect_compute_writes_one_feed_per_active_pi() {
    let harness = TestHarness::new();
    let groups = TempDir::new().unwrap();
    let config = write_config(&harness, &groups);

    execute(cli(&harness, &config, &["collect-compute", "--period", "2023-09"]))
        .await
        .unwrap();

    let smith = harness.read("2023-09/sreport/smith.txt");
    assert!(smith.contains("Account=smith"));
    assert!(smith.contains("Start=2023-09-01"));
    assert!(smith.contains("End=2023-10-01"));
    assert!(harness.path("2023-09/sreport/jones.txt").exists());
    assert!(!harness.path("2023-09/sreport/gone.txt").exists());
}
