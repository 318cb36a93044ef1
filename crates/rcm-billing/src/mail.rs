//! Statement and summary mail.
//!
//! Messages are handed to a [`Mailer`]. [`CommandMailer`] pipes them through
//! a mailx-compatible program; [`DryRunMailer`] only records and logs them,
//! and is what a run uses unless mail was requested.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use rcm_billing_collect::run_command;
use rcm_billing_core::{BillingPeriod, BillingPolicy, Statement};
use rcm_billing_store::Addressee;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::MailRoles;
use crate::error::{Result, RunError};

/// One outgoing mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender mailbox.
    pub from: String,
    /// Recipient mailbox.
    pub to: String,
    /// Copied mailboxes.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Files attached in order.
    pub attachments: Vec<PathBuf>,
}

/// Mail delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be handed off.
    async fn send(&self, message: &Message) -> Result<()>;
}

/// Mailer that logs and records messages without sending them.
#[derive(Debug, Default)]
pub struct DryRunMailer {
    sent: Mutex<Vec<Message>>,
}

impl DryRunMailer {
    /// Create an empty dry-run mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far.
    pub async fn sent(&self) -> Vec<Message> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for DryRunMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "Not sending mail"
        );
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Mailer that runs a mailx-compatible program.
///
/// The program is called as
/// `<program> -s <subject> -r <from> [-c <cc>] [-a <file>]... -- <to>`
/// with the body on standard input.
#[derive(Debug, Clone)]
pub struct CommandMailer {
    program: String,
}

impl CommandMailer {
    /// Create a mailer running `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for `message`.
    #[must_use]
    pub fn command_args(message: &Message) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            message.subject.clone(),
            "-r".to_string(),
            message.from.clone(),
        ];
        if !message.cc.is_empty() {
            args.push("-c".to_string());
            args.push(message.cc.join(","));
        }
        for attachment in &message.attachments {
            args.push("-a".to_string());
            args.push(attachment.to_string_lossy().into_owned());
        }
        args.push("--".to_string());
        args.push(message.to.clone());
        args
    }
}

#[async_trait]
impl Mailer for CommandMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        let args = Self::command_args(message);
        run_command(&self.program, &args, Some(message.body.as_bytes())).await?;
        info!(to = %message.to, subject = %message.subject, "Mail sent");
        Ok(())
    }
}

/// Addressees indexed by role.
#[derive(Debug, Clone)]
pub struct AddressBook {
    by_role: BTreeMap<String, Addressee>,
    roles: MailRoles,
}

impl AddressBook {
    /// Index `addressees` by their role key.
    #[must_use]
    pub fn new(addressees: Vec<Addressee>, roles: MailRoles) -> Self {
        let by_role = addressees
            .into_iter()
            .map(|a| (a.role.trim().to_string(), a))
            .collect();
        Self { by_role, roles }
    }

    fn lookup(&self, role: &str) -> Result<&Addressee> {
        self.by_role
            .get(role)
            .ok_or_else(|| RunError::MissingAddressee(role.to_string()))
    }

    fn mailbox_for(&self, role: &str) -> Result<String> {
        let a = self.lookup(role)?;
        Ok(mailbox(&a.name, &a.email))
    }

    /// Sender of every message.
    ///
    /// # Errors
    ///
    /// Returns `RunError::MissingAddressee` if the support role is absent.
    pub fn sender(&self) -> Result<String> {
        self.mailbox_for(&self.roles.support)
    }

    /// Recipient of debug-mode mail.
    ///
    /// # Errors
    ///
    /// Returns `RunError::MissingAddressee` if the debug role is absent.
    pub fn debug_recipient(&self) -> Result<String> {
        self.mailbox_for(&self.roles.debug)
    }
}

fn mailbox(name: &str, email: &str) -> String {
    format!("{} <{}>", name.trim(), email.trim())
}

/// Mail carrying one project's statement to its PI.
///
/// In debug mode the statement goes to the debug addressee instead.
///
/// # Errors
///
/// Returns `RunError::MissingAddressee` if a needed role is absent.
pub fn statement_message(
    statement: &Statement,
    policy: &BillingPolicy,
    book: &AddressBook,
    attachment: PathBuf,
    debug: bool,
) -> Result<Message> {
    let org = &policy.feed.description_label;
    let period = statement.period.short_label();
    let pi = &statement.pi;

    let to = if debug {
        book.debug_recipient()?
    } else {
        mailbox(&format!("{}, {}", pi.last_name, pi.first_name), &pi.email)
    };

    Ok(Message {
        from: book.sender()?,
        to,
        cc: Vec::new(),
        subject: format!(
            "{org} {} - {} account charges for {period}",
            statement.cluster, statement.project
        ),
        body: format!(
            "Dear Dr. {}:\n\n\
             Attached, please find a report detailing your group's usage of {org} {} for {period}.\n\n\
             Thank you.\n",
            pi.last_name, statement.cluster
        ),
        attachments: vec![attachment],
    })
}

/// Mail carrying the summary and feed files to finance, copying the
/// system administrators.
///
/// # Errors
///
/// Returns `RunError::MissingAddressee` if a needed role is absent.
pub fn summary_message(
    period: BillingPeriod,
    policy: &BillingPolicy,
    book: &AddressBook,
    attachments: Vec<PathBuf>,
    debug: bool,
) -> Result<Message> {
    let org = &policy.feed.description_label;
    let label = period.short_label();
    let finance = book.lookup(&book.roles.finance)?;
    let support = book.lookup(&book.roles.support)?;

    let to = if debug {
        book.debug_recipient()?
    } else {
        mailbox(&finance.name, &finance.email)
    };

    Ok(Message {
        from: mailbox(&support.name, &support.email),
        to,
        cc: vec![book.mailbox_for(&book.roles.sysadmin)?],
        subject: format!("{org} {} - charges summary for {label}", policy.cluster),
        body: format!(
            "Dear {}:\n\n\
             Attached, please find a report detailing {org} {} charges for {label}.\n\n\
             Regards,\n    {}\n",
            finance.name.trim(),
            policy.cluster,
            support.name.trim()
        ),
        attachments,
    })
}
