//! Record management commands.
//!
//! Every mutation edits the current snapshot and commits it, so the index is
//! reconciled in the same step as the save.

use super::{print_json, print_sync_report};
use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use qabase_core::config::AppConfig;
use qabase_knowledge::records::{self, NewRecord, RecordEdit, RecordFilter};
use qabase_knowledge::{KnowledgeBase, QaRecord, RecordId, RecordStatus};

/// List and edit records
#[derive(Args, Debug)]
pub struct RecordsCommand {
    #[command(subcommand)]
    pub action: RecordsAction,
}

#[derive(Subcommand, Debug)]
pub enum RecordsAction {
    /// List records, optionally filtered
    List(ListCommand),
    /// Add a new record
    Add(AddCommand),
    /// Change a record's question, answer or status
    Edit(EditCommand),
    /// Soft delete a record (status Inativo)
    Deactivate(StatusCommand),
    /// Reactivate a soft-deleted record
    Activate(StatusCommand),
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| format!("expected dd/mm/yyyy, got '{}'", s))
}

/// Numeric ids are canonical; anything else is kept as text.
fn parse_id(raw: &str) -> RecordId {
    raw.trim()
        .parse::<u64>()
        .map(RecordId::Numeric)
        .unwrap_or_else(|_| RecordId::from(raw))
}

/// List records
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Only records with this status (repeatable)
    #[arg(long)]
    pub status: Vec<RecordStatus>,

    /// Case-insensitive text the question must contain
    #[arg(long)]
    pub question: Option<String>,

    /// Created on or after (dd/mm/yyyy)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Created on or before (dd/mm/yyyy)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let kb = KnowledgeBase::open(config).await?;
        let orchestrator = kb.orchestrator();

        if !orchestrator.store().path().exists() {
            println!("No data yet: {} does not exist", orchestrator.store().path().display());
            return Ok(());
        }

        let snapshot = orchestrator.snapshot()?;
        let filter = RecordFilter {
            statuses: self.status.clone(),
            question_contains: self.question.clone(),
            created_from: self.from,
            created_to: self.to,
        };
        let selected = filter.apply(&snapshot);
        tracing::debug!("{} of {} records match", selected.len(), snapshot.len());

        if self.json {
            return print_json(&selected);
        }

        for record in &selected {
            print_record(record);
        }
        println!("{} record(s)", selected.len());
        Ok(())
    }
}

fn print_record(record: &QaRecord) {
    let id = record
        .id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    println!(
        "[{}] v{} {} {}",
        id,
        record.version,
        record.status,
        record.created_at.format("%d/%m/%Y")
    );
    println!("  Q: {}", record.question);
    println!("  A: {}", record.answer);
}

/// Add a record
#[derive(Args, Debug)]
pub struct AddCommand {
    /// Question text
    #[arg(long)]
    pub question: String,

    /// Answer text
    #[arg(long)]
    pub answer: String,

    /// Initial version
    #[arg(long, default_value = "1")]
    pub version: u32,

    /// Initial status
    #[arg(long, default_value = "Ativo")]
    pub status: RecordStatus,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AddCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let kb = KnowledgeBase::open(config).await?;
        let new = NewRecord {
            question: self.question.clone(),
            answer: self.answer.clone(),
            version: self.version,
            status: self.status,
        };
        let today = Local::now().date_naive();

        let (id, report) = kb
            .orchestrator()
            .update(|snapshot| records::add_record(snapshot, new, today))
            .await
            .context("adding record")?;

        if self.json {
            return print_json(&serde_json::json!({ "id": id, "sync": report }));
        }
        println!("Added record {}", id);
        print_sync_report(&report);
        Ok(())
    }
}

/// Edit a record
#[derive(Args, Debug)]
pub struct EditCommand {
    /// Record id
    pub id: String,

    /// New question text
    #[arg(long)]
    pub question: Option<String>,

    /// New answer text
    #[arg(long)]
    pub answer: Option<String>,

    /// New status
    #[arg(long)]
    pub status: Option<RecordStatus>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl EditCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        if self.question.is_none() && self.answer.is_none() && self.status.is_none() {
            anyhow::bail!("nothing to change: pass --question, --answer or --status");
        }

        let kb = KnowledgeBase::open(config).await?;
        let id = parse_id(&self.id);
        let edit = RecordEdit {
            question: self.question.clone(),
            answer: self.answer.clone(),
            status: self.status,
        };

        let (version, report) = kb
            .orchestrator()
            .update(|snapshot| records::edit_record(snapshot, &id, edit).map(|r| r.version))
            .await
            .with_context(|| format!("editing record {}", id))?;

        if self.json {
            return print_json(&serde_json::json!({
                "id": id,
                "version": version,
                "sync": report,
            }));
        }
        println!("Record {} now at version {}", id, version);
        print_sync_report(&report);
        Ok(())
    }
}

/// Change a record's status
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Record id
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &AppConfig, status: RecordStatus) -> anyhow::Result<()> {
        let kb = KnowledgeBase::open(config).await?;
        let id = parse_id(&self.id);

        let ((), report) = kb
            .orchestrator()
            .update(|snapshot| records::set_status(snapshot, &id, status))
            .await
            .with_context(|| format!("setting record {} to {}", id, status))?;

        if self.json {
            return print_json(&serde_json::json!({
                "id": id,
                "status": status,
                "sync": report,
            }));
        }
        println!("Record {} is now {}", id, status);
        print_sync_report(&report);
        Ok(())
    }
}

impl RecordsCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        match &self.action {
            RecordsAction::List(cmd) => cmd.execute(config).await,
            RecordsAction::Add(cmd) => cmd.execute(config).await,
            RecordsAction::Edit(cmd) => cmd.execute(config).await,
            RecordsAction::Deactivate(cmd) => cmd.execute(config, RecordStatus::Inactive).await,
            RecordsAction::Activate(cmd) => cmd.execute(config, RecordStatus::Active).await,
        }
    }
}
