//! Command handlers for the QA Base CLI.

pub mod grade;
pub mod records;
pub mod search;
pub mod sync;

pub use grade::GradeCommand;
pub use records::RecordsCommand;
pub use search::SearchCommand;
pub use sync::{AuditCommand, RebuildCommand, SyncCommand};

use qabase_knowledge::SyncReport;
use serde::Serialize;

/// Pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Human summary of a sync, including the partial-sync warning.
pub(crate) fn print_sync_report(report: &SyncReport) {
    println!(
        "Index synced: {} removed, {} added in {:.2}s",
        report.mutation.deleted,
        report.mutation.inserted.len(),
        report.duration_secs
    );
    if report.is_partial() {
        println!(
            "Warning: records {} could not be indexed; run `qabase sync` to retry",
            report.failed_ids().join(", ")
        );
    }
}
