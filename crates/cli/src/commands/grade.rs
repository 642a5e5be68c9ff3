//! Grade command handler.
//!
//! Either grades one candidate against one reference, or a JSON file of
//! `{"id": ..., "answer": ...}` candidates against the stored answers.

use super::print_json;
use anyhow::Context;
use clap::Args;
use qabase_core::config::AppConfig;
use qabase_knowledge::grading::{self, Evaluation};
use qabase_knowledge::{KnowledgeBase, RecordId};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Grade candidate answers against reference answers
#[derive(Args, Debug)]
pub struct GradeCommand {
    /// Reference answer
    #[arg(required_unless_present = "file")]
    pub reference: Option<String>,

    /// Candidate answer
    #[arg(required_unless_present = "file")]
    pub candidate: Option<String>,

    /// JSON list of {"id", "answer"} graded against the record store
    #[arg(long, conflicts_with_all = ["reference", "candidate"])]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
struct CandidateAnswer {
    id: RecordId,
    answer: String,
}

impl GradeCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        match (&self.file, &self.reference, &self.candidate) {
            (Some(path), _, _) => self.grade_file(config, path).await,
            (None, Some(reference), Some(candidate)) => {
                let grade = grading::grade(reference, candidate);
                if self.json {
                    return print_json(&grade);
                }
                println!("{} (similarity {:.2})", grade.verdict, grade.similarity);
                println!("{}", grade.reason);
                Ok(())
            }
            _ => anyhow::bail!("pass a reference and a candidate answer, or --file"),
        }
    }

    async fn grade_file(&self, config: &AppConfig, path: &Path) -> anyhow::Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading candidates from {}", path.display()))?;
        let candidates: Vec<CandidateAnswer> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing candidates in {}", path.display()))?;
        let pairs: Vec<(RecordId, String)> =
            candidates.into_iter().map(|c| (c.id, c.answer)).collect();

        let kb = KnowledgeBase::open(config).await?;
        let snapshot = kb.orchestrator().snapshot()?;
        let evaluations = grading::evaluate(&snapshot, &pairs);
        let accuracy = grading::accuracy(&evaluations);

        if self.json {
            return print_json(&serde_json::json!({
                "evaluations": evaluations,
                "accuracy": accuracy,
            }));
        }
        print_evaluations(&evaluations);
        println!(
            "Accuracy: {:.1}% over {} answers",
            accuracy * 100.0,
            evaluations.len()
        );
        Ok(())
    }
}

fn print_evaluations(evaluations: &[Evaluation]) {
    for evaluation in evaluations {
        println!(
            "[{}] {}: {} ({:.2})",
            evaluation.id, evaluation.question, evaluation.grade.verdict, evaluation.grade.similarity
        );
    }
}
