//! Word-overlap answer grading.
//!
//! A pure scoring function kept apart from the sync engine. The similarity is
//! the share of distinct reference words (lowercased, whitespace separated)
//! that also appear in the candidate.

use crate::types::{QaRecord, RecordId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Similarity strictly above this is graded correct.
pub const CORRECT_THRESHOLD: f32 = 0.8;

/// Similarity strictly above this (and not correct) is graded partially correct.
pub const PARTIAL_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    #[serde(rename = "Correto")]
    Correct,
    #[serde(rename = "Parcialmente Correto")]
    PartiallyCorrect,
    #[serde(rename = "Incorreto")]
    Incorrect,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Correct => "Correto",
            Verdict::PartiallyCorrect => "Parcialmente Correto",
            Verdict::Incorrect => "Incorreto",
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Verdict::Correct => "A resposta segue a ideia central da resposta referência.",
            Verdict::PartiallyCorrect => {
                "A resposta contém alguns elementos da resposta referência, mas não está completa."
            }
            Verdict::Incorrect => "A resposta não segue a ideia central da resposta referência.",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grade {
    pub verdict: Verdict,
    pub similarity: f32,
    pub reason: &'static str,
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Fraction of distinct reference words found in `candidate`, in `[0, 1]`.
pub fn score(reference: &str, candidate: &str) -> f32 {
    let reference = words(reference);
    if reference.is_empty() {
        return 0.0;
    }
    let candidate = words(candidate);
    let shared = reference.intersection(&candidate).count();
    shared as f32 / reference.len() as f32
}

pub fn grade(reference: &str, candidate: &str) -> Grade {
    let similarity = score(reference, candidate);
    let verdict = if similarity > CORRECT_THRESHOLD {
        Verdict::Correct
    } else if similarity > PARTIAL_THRESHOLD {
        Verdict::PartiallyCorrect
    } else {
        Verdict::Incorrect
    };
    Grade {
        verdict,
        similarity,
        reason: verdict.reason(),
    }
}

/// A candidate answer graded against a record's reference answer.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub id: RecordId,
    pub question: String,
    pub candidate: String,
    pub grade: Grade,
}

/// Grade `(record id, candidate answer)` pairs against the stored answers.
///
/// Candidates for ids missing from `records` are skipped.
pub fn evaluate(records: &[QaRecord], candidates: &[(RecordId, String)]) -> Vec<Evaluation> {
    let by_id: HashMap<String, &QaRecord> = records
        .iter()
        .filter_map(|r| r.id.as_ref().map(|id| (id.key(), r)))
        .collect();

    candidates
        .iter()
        .filter_map(|(id, candidate)| {
            let Some(record) = by_id.get(&id.key()) else {
                tracing::warn!("No record with id {} to grade against", id);
                return None;
            };
            Some(Evaluation {
                id: id.clone(),
                question: record.question.clone(),
                candidate: candidate.clone(),
                grade: grade(&record.answer, candidate),
            })
        })
        .collect()
}

/// Share of evaluations graded correct; 0.0 when there are none.
pub fn accuracy(evaluations: &[Evaluation]) -> f32 {
    if evaluations.is_empty() {
        return 0.0;
    }
    let correct = evaluations
        .iter()
        .filter(|e| e.grade.verdict == Verdict::Correct)
        .count();
    correct as f32 / evaluations.len() as f32
}
