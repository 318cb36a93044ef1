//! The monthly billing run and the collection commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use rcm_billing_collect::{
    collect_compute, load_group_members, run_command, snapshot_storage, GroupMembers,
};
use rcm_billing_core::{
    accumulate_ytd, aggregate, to_feed, BillingPeriod, HtmlRenderer, PriorLedgers, Statement,
    StatementRenderer,
};
use rcm_billing_store::{FsStore, LedgerStore, StoreError};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::cli::{BillArgs, Cli, Command};
use crate::config::SiteConfig;
use crate::error::Result;
use crate::mail::{
    statement_message, summary_message, AddressBook, CommandMailer, DryRunMailer, Mailer,
};

/// How a billing run treats its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillOptions {
    /// Period to bill.
    pub period: BillingPeriod,
    /// Whether mail is really sent.
    pub send_email: bool,
    /// Redirect mail to the debug addressee.
    pub debug: bool,
    /// HTML to PDF converter.
    pub pdf_program: Option<String>,
    /// Pause after each statement mail.
    pub pause: Duration,
    /// Look up group members for statements.
    pub members: bool,
}

impl BillOptions {
    /// Options for `period` with nothing sent or converted.
    #[must_use]
    pub fn new(period: BillingPeriod) -> Self {
        Self {
            period,
            send_email: false,
            debug: false,
            pdf_program: None,
            pause: Duration::ZERO,
            members: false,
        }
    }
}

/// What a billing run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Billed period.
    pub period: BillingPeriod,
    /// Projects in the summary.
    pub billed_projects: usize,
    /// Statements written.
    pub statements: usize,
    /// Messages handed to the mailer.
    pub mails: usize,
    /// Rows in the accounting feed.
    pub feed_rows: usize,
    /// Amount moved by the feed.
    pub feed_total: Decimal,
    /// Summary file.
    pub summary_path: PathBuf,
    /// Feed file.
    pub feed_path: PathBuf,
}

impl RunReport {
    /// Log the report at info level.
    pub fn log(&self) {
        info!(
            period = %self.period,
            billed_projects = self.billed_projects,
            statements = self.statements,
            mails = self.mails,
            feed_rows = self.feed_rows,
            feed_total = %self.feed_total,
            summary = %self.summary_path.display(),
            feed = %self.feed_path.display(),
            "Billing run complete"
        );
    }
}

/// Bill one period end to end.
///
/// Reads the registry and the period's usage from `store`, writes the
/// summary, one statement per billed project and the accounting feed, and
/// hands statements and the finance summary to `mailer`.
///
/// # Errors
///
/// Fails on the first error. Files written before the failure are kept.
#[instrument(skip_all, fields(period = %options.period))]
pub async fn bill<S>(
    store: &S,
    config: &SiteConfig,
    options: &BillOptions,
    mailer: &dyn Mailer,
) -> Result<RunReport>
where
    S: LedgerStore + PriorLedgers,
{
    let policy = &config.policy;
    let period = options.period;

    let registry = store.load_registry()?;
    let compute = store.load_compute_usage(period)?;
    let storage = store.load_storage_usage(period, policy)?;

    let ledger = aggregate(&registry, &compute, &storage, period, policy)?;
    let summary_path = store.put_summary(&ledger)?;
    info!(
        projects = ledger.entries().len(),
        total = %ledger.total_charge(),
        path = %summary_path.display(),
        "Summary written"
    );

    let book = match store.load_addressees() {
        Ok(addressees) => Some(AddressBook::new(addressees, config.mail.roles.clone())),
        Err(StoreError::NotFound(path)) if !options.send_email => {
            warn!(path = %path.display(), "No addressees, skipping mail");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let members = if options.members {
        load_group_members(&config.collector, policy).await?
    } else {
        GroupMembers::default()
    };

    let renderer = HtmlRenderer;
    let mut statements = 0;
    let mut mails = 0;

    for entry in ledger.entries() {
        let ytd = accumulate_ytd(entry, period, policy, store)?;
        let statement = Statement::new(entry, period, policy)
            .with_ytd(ytd)
            .with_members(members.members(&entry.project).to_vec());

        let document = renderer.render(&statement)?;
        let html = store.put_statement(period, &document)?;
        statements += 1;

        let attachment = match &options.pdf_program {
            Some(program) => convert_to_pdf(program, &html).await?,
            None => html,
        };

        if let Some(book) = &book {
            let message = statement_message(&statement, policy, book, attachment, options.debug)?;
            mailer.send(&message).await?;
            mails += 1;
            if options.send_email && !options.pause.is_zero() {
                tokio::time::sleep(options.pause).await;
            }
        }
    }

    let feed = to_feed(&ledger, policy)?;
    let feed_path = store.put_feed(&feed, policy)?;
    info!(rows = feed.rows().count(), total = %feed.total(), "Feed written");

    if let Some(book) = &book {
        let message = summary_message(
            period,
            policy,
            book,
            vec![summary_path.clone(), feed_path.clone()],
            options.debug,
        )?;
        mailer.send(&message).await?;
        mails += 1;
    }

    Ok(RunReport {
        period,
        billed_projects: ledger.entries().len(),
        statements,
        mails,
        feed_rows: feed.rows().count(),
        feed_total: feed.total(),
        summary_path,
        feed_path,
    })
}

/// Convert a statement to PDF next to its HTML file.
async fn convert_to_pdf(program: &str, html: &Path) -> Result<PathBuf> {
    let pdf = html.with_extension("pdf");
    run_command(program, &[html, pdf.as_path()], None).await?;
    debug!(path = %pdf.display(), "Statement converted");
    Ok(pdf)
}

/// Execute a parsed command line.
///
/// # Errors
///
/// Returns the first error of the selected command.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = SiteConfig::load(cli.policy.as_deref())?;
    let store = FsStore::open(&cli.prefix, config.policy.cluster.clone())?;
    let today = Local::now().date_naive();

    match cli.command {
        Command::Bill(args) => {
            let options = bill_options(&args, &config, cli.debug, today);
            let report = if options.send_email {
                let mailer = CommandMailer::new(config.mail.program.clone());
                bill(&store, &config, &options, &mailer).await?
            } else {
                bill(&store, &config, &options, &DryRunMailer::new()).await?
            };
            report.log();
        }
        Command::CollectCompute { period } => {
            let period = period.unwrap_or_else(|| BillingPeriod::previous_to(today));
            let registry = store.load_registry()?;
            collect_compute(&store, &registry, period, &config.collector).await?;
        }
        Command::SnapshotStorage { date, force } => {
            snapshot(&store, &config, date.unwrap_or(today), force).await?;
        }
    }
    Ok(())
}

async fn snapshot(
    store: &FsStore,
    config: &SiteConfig,
    date: NaiveDate,
    force: bool,
) -> Result<()> {
    if let Some(path) = snapshot_storage(store, date, &config.collector, force).await? {
        debug!(path = %path.display(), "Snapshot taken");
    }
    Ok(())
}

/// Resolve `bill` arguments against the configuration.
#[must_use]
pub fn bill_options(
    args: &BillArgs,
    config: &SiteConfig,
    debug: bool,
    today: NaiveDate,
) -> BillOptions {
    BillOptions {
        period: args.period.unwrap_or_else(|| BillingPeriod::previous_to(today)),
        send_email: args.send_email,
        debug,
        pdf_program: args
            .pdf_program
            .clone()
            .or_else(|| config.mail.pdf_program.clone()),
        pause: Duration::from_secs(args.pause_secs.unwrap_or(config.mail.pause_secs)),
        members: args.members,
    }
}
