//! Filesystem storage implementation.
//!
//! This module provides the `FsStore` implementation of the `LedgerStore`
//! trait. Outputs are written to a temporary file in the target directory
//! and renamed into place, so a crashed run never leaves a partial file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::NamedTempFile;

use rcm_billing_core::{
    parse_compute_feed, parse_snapshot, read_summary_rows, BillingError, BillingPeriod,
    BillingPolicy, ComputeUsage, Document, Feed, PriorLedgers, Registry, StorageUsage,
    SummaryLedger, SummaryRow,
};

use crate::error::{Result, StoreError};
use crate::layout;
use crate::schema::{file, Addressee, TEXT_EXTENSION};
use crate::LedgerStore;

/// Reports directory on a local or network filesystem.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    cluster: String,
}

impl FsStore {
    /// Open the reports directory at `root` for `cluster`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if `root` is not a directory.
    pub fn open<P: AsRef<Path>>(root: P, cluster: impl Into<String>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(StoreError::NotFound(root));
        }
        Ok(Self {
            root,
            cluster: cluster.into(),
        })
    }

    /// The reports directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the statements of `period` are written to.
    #[must_use]
    pub fn statement_dir(&self, period: BillingPeriod) -> PathBuf {
        layout::statement_dir(&self.root, period)
    }

    fn open_input(&self, name: &str) -> Result<fs::File> {
        let path = self.root.join(name);
        fs::File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(path),
            _ => StoreError::io(path, e),
        })
    }

    /// Sorted `*.txt` files of `dir`; missing directory is `NotFound`.
    fn text_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(dir.to_path_buf()),
            _ => StoreError::io(dir, e),
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == TEXT_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(StoreError::NotFound(dir.to_path_buf()));
        }
        Ok(files)
    }

    fn read_text(path: &Path) -> Result<(String, String)> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok((name, text))
    }
}

/// Write `bytes` to `path` through a temporary file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))?;
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    if path.exists() {
        tracing::warn!(path = %path.display(), "Replacing existing file");
    }

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "File written");
    Ok(())
}

impl LedgerStore for FsStore {
    // =========================================================================
    // Registry
    // =========================================================================

    fn load_registry(&self) -> Result<Registry> {
        let pis = self.open_input(file::PI_ROSTER)?;
        let projects = self.open_input(file::PROJECT_REGISTRY)?;
        Ok(Registry::load(pis, projects).map_err(BillingError::from)?)
    }

    fn load_addressees(&self) -> Result<Vec<Addressee>> {
        let path = self.root.join(file::ADDRESSEES);
        let reader = self.open_input(file::ADDRESSEES)?;
        csv::ReaderBuilder::new()
            .trim(csv::Trim::Fields)
            .from_reader(reader)
            .deserialize()
            .collect::<std::result::Result<Vec<Addressee>, _>>()
            .map_err(|source| StoreError::Csv { path, source })
    }

    // =========================================================================
    // Raw usage
    // =========================================================================

    fn put_compute_feed(
        &self,
        period: BillingPeriod,
        pi_account: &str,
        text: &str,
    ) -> Result<PathBuf> {
        let path = layout::compute_feed_path(&self.root, period, pi_account);
        write_atomic(&path, text.as_bytes())?;
        Ok(path)
    }

    fn put_snapshot(&self, date: NaiveDate, text: &str) -> Result<PathBuf> {
        let path = layout::snapshot_path(&self.root, date);
        write_atomic(&path, text.as_bytes())?;
        Ok(path)
    }

    fn load_compute_usage(&self, period: BillingPeriod) -> Result<ComputeUsage> {
        let mut usage = ComputeUsage::new();
        let files = Self::text_files(&layout::compute_feed_dir(&self.root, period))?;
        for path in &files {
            let (name, text) = Self::read_text(path)?;
            parse_compute_feed(&name, &text, &mut usage).map_err(BillingError::from)?;
        }
        tracing::info!(%period, feeds = files.len(), "Compute feeds loaded");
        Ok(usage)
    }

    fn load_storage_usage(
        &self,
        period: BillingPeriod,
        policy: &BillingPolicy,
    ) -> Result<StorageUsage> {
        let files = Self::text_files(&layout::snapshot_dir(&self.root, period))?;
        let mut snapshots = Vec::with_capacity(files.len());
        for path in &files {
            let (name, text) = Self::read_text(path)?;
            snapshots.push(parse_snapshot(&name, &text, policy).map_err(BillingError::from)?);
        }
        let usage =
            StorageUsage::from_snapshots(period, policy, &snapshots).map_err(BillingError::from)?;
        tracing::info!(%period, snapshots = usage.snapshot_count(), "Storage snapshots loaded");
        Ok(usage)
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    fn put_summary(&self, ledger: &SummaryLedger) -> Result<PathBuf> {
        let path = layout::summary_path(&self.root, ledger.period(), ledger.cluster());
        write_atomic(&path, &ledger.to_csv_bytes()?)?;
        Ok(path)
    }

    fn get_summary_rows(&self, period: BillingPeriod) -> Result<Option<Vec<SummaryRow>>> {
        let path = layout::summary_path(&self.root, period, &self.cluster);
        let reader = match fs::File::open(&path) {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        Ok(Some(read_summary_rows(reader)?))
    }

    fn put_feed(&self, feed: &Feed, policy: &BillingPolicy) -> Result<PathBuf> {
        let path = layout::feed_path(&self.root, feed.period(), &policy.feed.description_label);
        write_atomic(&path, &feed.to_csv_bytes()?)?;
        Ok(path)
    }

    fn put_statement(&self, period: BillingPeriod, document: &Document) -> Result<PathBuf> {
        let path = self.statement_dir(period).join(&document.file_name);
        write_atomic(&path, &document.content)?;
        Ok(path)
    }
}

impl PriorLedgers for FsStore {
    fn summary_rows(
        &self,
        period: BillingPeriod,
    ) -> rcm_billing_core::Result<Option<Vec<SummaryRow>>> {
        self.get_summary_rows(period).map_err(|e| match e {
            StoreError::Billing(inner) => inner,
            other => BillingError::History {
                period,
                message: other.to_string(),
            },
        })
    }
}
