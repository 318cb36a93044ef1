//! Per-project statements.
//!
//! A [`Statement`] gathers everything printed for one project; a
//! [`StatementRenderer`] turns it into a document. PDF output is produced
//! outside this crate from the HTML rendering.

use std::fmt::Write;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::LedgerEntry;
use crate::money::format_grouped;
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;
use crate::registry::Pi;
use crate::ytd::YtdCharges;

/// One row of the per-user compute table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementUser {
    /// Display name.
    pub full_name: String,
    /// Login.
    pub login: String,
    /// Service units.
    pub su: Decimal,
    /// Charge, zero for class projects.
    pub charge: Decimal,
}

/// Everything printed on one project's statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Cluster name.
    pub cluster: String,
    /// Billed period.
    pub period: BillingPeriod,
    /// Project name.
    pub project: String,
    /// Owning PI.
    pub pi: Pi,
    /// Coursework project.
    pub is_class: bool,
    /// MRI share.
    pub is_mri: bool,
    /// Startup or grant share.
    pub is_startup: bool,
    /// Share expiration.
    pub share_expiration: Option<NaiveDate>,
    /// Fund-org code as registered.
    pub fund_org: String,
    /// Dollars per SU.
    pub rate_per_su: Decimal,
    /// Storage SU per TiB-month.
    pub storage_su_per_tib_month: Decimal,
    /// Compute SU.
    pub compute_su: Decimal,
    /// Compute charge.
    pub compute_charge: Decimal,
    /// Storage SU.
    pub storage_su: Decimal,
    /// Storage charge.
    pub storage_charge: Decimal,
    /// Per-user compute lines.
    pub users: Vec<StatementUser>,
    /// Fiscal year-to-date charges, current period included.
    pub ytd: Option<YtdCharges>,
    /// Logins of the project's group members, if looked up.
    pub members: Vec<String>,
}

impl Statement {
    /// Build the statement of `entry`.
    #[must_use]
    pub fn new(entry: &LedgerEntry, period: BillingPeriod, policy: &BillingPolicy) -> Self {
        Self {
            cluster: policy.cluster.clone(),
            period,
            project: entry.project.clone(),
            pi: entry.pi.clone(),
            is_class: entry.is_class,
            is_mri: entry.is_mri,
            is_startup: entry.is_startup,
            share_expiration: entry.share_expiration,
            fund_org: entry.fund_org.to_string(),
            rate_per_su: policy.rate_per_su,
            storage_su_per_tib_month: policy.storage_su_per_tib_month,
            compute_su: entry.compute_su(),
            compute_charge: entry.compute_charge(),
            storage_su: entry.storage_su(),
            storage_charge: entry.storage_charge(),
            users: entry
                .users()
                .iter()
                .map(|u| StatementUser {
                    full_name: u.full_name.clone(),
                    login: u.login.clone(),
                    su: u.su,
                    charge: u.charge(entry.is_class),
                })
                .collect(),
            ytd: None,
            members: Vec::new(),
        }
    }

    /// Attach year-to-date totals.
    #[must_use]
    pub fn with_ytd(mut self, ytd: YtdCharges) -> Self {
        self.ytd = Some(ytd);
        self
    }

    /// Attach the project's member list.
    #[must_use]
    pub fn with_members(mut self, members: Vec<String>) -> Self {
        self.members = members;
        self
    }

    /// Compute plus storage SU.
    #[must_use]
    pub fn total_su(&self) -> Decimal {
        self.compute_su + self.storage_su
    }

    /// Compute plus storage charge.
    #[must_use]
    pub fn total_charge(&self) -> Decimal {
        self.compute_charge + self.storage_charge
    }

    /// `<project>_<YYYYMM>`, the stem of every file made for this statement.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.project, self.period.compact())
    }
}

/// A rendered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name, no directory.
    pub file_name: String,
    /// Encoded content.
    pub content: Vec<u8>,
}

/// Turns a statement into a document.
pub trait StatementRenderer: Send + Sync {
    /// Render `statement`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be produced.
    fn render(&self, statement: &Statement) -> Result<Document>;
}

/// Standalone HTML statements, laid out for landscape letter paper.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

const STYLE: &str = r"
      @page { size: Letter landscape; }
      body { font-size: 9pt; }
      pre { font-size: 9pt; }
      .rates { font-size: 85%; font-style: italic; }
      table.listing { border-collapse: collapse; width: 100%; }
      table.listing td, table.listing th { border: 1px solid #ddd; padding: 2px; }
      table.listing tr:nth-child(even) { background-color: #f2f2f2; }
      table.listing th { text-align: left; background-color: #4CAF50; color: white; }
";

impl StatementRenderer for HtmlRenderer {
    fn render(&self, statement: &Statement) -> Result<Document> {
        let s = statement;
        let mut html = String::new();
        let cluster = escape(&s.cluster);
        let project = escape(&s.project);

        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html>\n<head>\n<meta charset=\"utf-8\" />")?;
        writeln!(html, "<style>{STYLE}</style>")?;
        writeln!(html, "<title>{cluster} Usage Report for {project}</title>")?;
        writeln!(html, "</head>\n<body>")?;

        writeln!(html, "<h4>{cluster} usage charges for period {}</h4>", s.period.long_label())?;
        writeln!(html, "<table>")?;
        writeln!(
            html,
            "<tr><td>PI:</td><td>{}, {} <tt>&lt;{}&gt;</tt></td></tr>",
            escape(&s.pi.last_name),
            escape(&s.pi.first_name),
            escape(&s.pi.email)
        )?;
        writeln!(html, "<tr><td>Project:</td><td>{project}</td></tr>")?;
        writeln!(html, "<tr><td>Coursework?</td><td>{}</td></tr>", yes_no(s.is_class))?;
        writeln!(html, "<tr><td>MRI?</td><td>{}</td></tr>", yes_no(s.is_mri))?;
        writeln!(html, "<tr><td>Startup/Grant?</td><td>{}</td></tr>", yes_no(s.is_startup))?;
        writeln!(
            html,
            "<tr><td>Share (MRI/Startup/Grant) expiration:</td><td>{}</td></tr>",
            s.share_expiration
                .map_or_else(|| "n/a".to_string(), |d| d.format("%Y-%m-%d").to_string())
        )?;
        writeln!(html, "<tr><td>Fund-Org code:</td><td><tt>{}</tt></td></tr>", escape(&s.fund_org))?;
        writeln!(html, "</table>")?;

        writeln!(html, "<p class=\"rates\">Rate: ${} per SU. ", s.rate_per_su.normalize())?;
        writeln!(
            html,
            "Standard compute: 1 SU per core-hour. Storage: {} SU per TiB-month.</p>",
            s.storage_su_per_tib_month.normalize()
        )?;

        writeln!(html, "<pre><b>{:<12} {:>16} {:>16}</b>", "", "Usage (SU)", "Charge")?;
        for (label, su, charge) in [
            ("Compute", s.compute_su, s.compute_charge),
            ("Storage", s.storage_su, s.storage_charge),
        ] {
            writeln!(html, "{label:<12} {:>16} {:>16}", su_text(su), dollars(charge))?;
        }
        writeln!(html, "{:<12} {:>16} {:>16}", "", "-".repeat(14), "-".repeat(14))?;
        writeln!(
            html,
            "<b>{:<12} {:>16} {:>16}</b></pre>",
            "TOTAL",
            su_text(s.total_su()),
            dollars(s.total_charge())
        )?;

        writeln!(html, "<h5>Compute usage by user</h5>")?;
        if s.users.is_empty() {
            writeln!(html, "<p>n/a</p>")?;
        } else {
            writeln!(html, "<table class=\"listing\">")?;
            writeln!(html, "<tr><th>Name</th><th>User ID</th><th>Usage (SU)</th><th>Charge</th></tr>")?;
            for user in &s.users {
                writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(&user.full_name),
                    escape(&user.login),
                    su_text(user.su),
                    dollars(user.charge)
                )?;
            }
            writeln!(html, "</table>")?;
        }

        if let Some(ytd) = &s.ytd {
            writeln!(html, "<h5>Fiscal year-to-date charges</h5>")?;
            writeln!(html, "<pre>{:<12} {:>16}", "Compute", dollars(ytd.compute))?;
            writeln!(html, "{:<12} {:>16}", "Storage", dollars(ytd.storage))?;
            writeln!(html, "<b>{:<12} {:>16}</b></pre>", "TOTAL", dollars(ytd.total()))?;
        }

        if !s.members.is_empty() {
            writeln!(html, "<h5>Project members</h5>\n<p>")?;
            let members: Vec<String> = s.members.iter().map(|m| escape(m)).collect();
            writeln!(html, "{}", members.join(", "))?;
            writeln!(html, "</p>")?;
        }

        writeln!(html, "</body>\n</html>")?;

        Ok(Document {
            file_name: format!("{}.html", s.file_stem()),
            content: html.into_bytes(),
        })
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn su_text(su: Decimal) -> String {
    format_grouped(su.round_dp(2))
}

fn dollars(amount: Decimal) -> String {
    format!("${}", format_grouped(amount))
}

/// Escape text for HTML element content and attribute values.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::registry::{FundOrgCode, ProjectRecord};
    use crate::usage::{ProjectStorage, ProjectUsage, UserUsage};

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn entry(is_class: bool) -> LedgerEntry {
        let pi = Pi {
            last_name: "O'Brien".to_string(),
            first_name: "Alice".to_string(),
            login: "ao1".to_string(),
            email: "alice@example.edu".to_string(),
            college: String::new(),
            department: String::new(),
            is_active: true,
        };
        let record = ProjectRecord {
            name: "obrienprj".to_string(),
            pi_email: pi.email.clone(),
            is_class,
            is_mri: true,
            is_startup: false,
            gets_credit: false,
            share_expiration: NaiveDate::from_ymd_opt(2026, 6, 30),
            fund_org: FundOrgCode::parse("123456-0001").unwrap(),
        };
        let compute = ProjectUsage {
            name: "obrienprj".to_string(),
            pi_account: "obrien".to_string(),
            su: d("100000"),
            users: vec![UserUsage {
                login: "bob".to_string(),
                full_name: "Bob <Builder>".to_string(),
                su: d("100000"),
            }],
        };
        let storage = ProjectStorage {
            name: "obrienprj".to_string(),
            su: d("252.2333"),
            latest_kib: 0,
        };
        LedgerEntry::new(&record, &pi, Some(&compute), Some(&storage), &BillingPolicy::default())
    }

    fn render(statement: &Statement) -> String {
        let doc = HtmlRenderer.render(statement).unwrap();
        String::from_utf8(doc.content).unwrap()
    }

    #[test]
    fn statement_carries_charges() {
        let period: BillingPeriod = "2023-09".parse().unwrap();
        let statement = Statement::new(&entry(false), period, &BillingPolicy::default());
        assert_eq!(statement.compute_charge, d("1230.00"));
        assert_eq!(statement.storage_charge, d("3.10"));
        assert_eq!(statement.total_charge(), d("1233.10"));
        assert_eq!(statement.file_stem(), "obrienprj_202309");
    }

    #[test]
    fn renders_html() {
        let period: BillingPeriod = "2023-09".parse().unwrap();
        let statement = Statement::new(&entry(false), period, &BillingPolicy::default())
            .with_ytd(YtdCharges {
                compute: d("2000"),
                storage: d("10.5"),
            })
            .with_members(vec!["ao1".to_string(), "bob".to_string()]);
        let doc = HtmlRenderer.render(&statement).unwrap();
        assert_eq!(doc.file_name, "obrienprj_202309.html");

        let html = String::from_utf8(doc.content).unwrap();
        assert!(html.contains("MYCLUSTER usage charges for period September 2023"));
        assert!(html.contains("O&#39;Brien, Alice"));
        assert!(html.contains("Bob &lt;Builder&gt;"));
        assert!(html.contains("$1,233.10"));
        assert!(html.contains("100,000.00"));
        assert!(html.contains("Fiscal year-to-date charges"));
        assert!(html.contains("$2,010.50"));
        assert!(html.contains("ao1, bob"));
        assert!(html.contains("Rate: $0.0123 per SU"));
    }

    #[test]
    fn class_statement_shows_zero_charges() {
        let period: BillingPeriod = "2023-09".parse().unwrap();
        let statement = Statement::new(&entry(true), period, &BillingPolicy::default());
        assert_eq!(statement.users[0].charge, Decimal::ZERO);
        let html = render(&statement);
        assert!(html.contains("$0.00"));
        assert!(!html.contains("$1,230.00"));
        assert!(!html.contains("year-to-date"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
    }
}
