//! Index maintenance commands: sync, rebuild, audit.

use super::{print_json, print_sync_report};
use clap::Args;
use qabase_core::config::AppConfig;
use qabase_knowledge::{AuditReport, KnowledgeBase};

fn report_missing_store(kb: &KnowledgeBase) -> bool {
    let path = kb.orchestrator().store().path();
    if path.exists() {
        return false;
    }
    println!("No data yet: {} does not exist", path.display());
    true
}

/// Re-sync the index against the stored records
#[derive(Args, Debug)]
pub struct SyncCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SyncCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let kb = KnowledgeBase::open(config).await?;
        if report_missing_store(&kb) {
            return Ok(());
        }

        let report = kb.orchestrator().sync().await?;
        if self.json {
            return print_json(&report);
        }
        print_sync_report(&report);
        Ok(())
    }
}

/// Drop the index and re-embed every active record
#[derive(Args, Debug)]
pub struct RebuildCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RebuildCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let kb = KnowledgeBase::open(config).await?;
        report_missing_store(&kb);

        let report = kb.orchestrator().rebuild().await?;
        if self.json {
            return print_json(&report);
        }
        print_sync_report(&report);
        Ok(())
    }
}

/// Report index entries that disagree with the record store
#[derive(Args, Debug)]
pub struct AuditCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AuditCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let kb = KnowledgeBase::open(config).await?;
        report_missing_store(&kb);

        let report = kb.orchestrator().audit().await?;
        if self.json {
            return print_json(&report);
        }
        print_audit(&report);
        Ok(())
    }
}

fn print_audit(report: &AuditReport) {
    println!("Index entries: {}", report.entries);
    if report.is_consistent() {
        println!("Index is consistent with the record store");
        return;
    }

    if !report.orphans.is_empty() {
        println!("Orphan entries:");
        for orphan in &report.orphans {
            println!(
                "- {} (record {}): {:?}",
                orphan.index_key, orphan.record_id, orphan.reason
            );
        }
    }
    if !report.missing_ids.is_empty() {
        println!("Records missing from the index: {}", report.missing_ids.join(", "));
    }
    println!("Run `qabase rebuild` to reconcile");
}
