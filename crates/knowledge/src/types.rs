//! Knowledge system type definitions.
//!
//! `QaRecord` is the persisted unit of knowledge. Its serialized field names
//! are the stable ones used by the record store file (`ID`, `Pergunta`, ...).

use chrono::NaiveDate;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a record in the store.
///
/// Numeric ids are canonical. Textual ids are accepted on input so that
/// hand-edited stores still load, but they disable numeric id assignment.
/// Integral floats (`3.0`, as written by dataframe exports) read as numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum RecordId {
    Numeric(u64),
    Text(String),
}

impl RecordId {
    /// Numeric value, if this id is (or spells) an integer.
    pub fn as_number(&self) -> Option<u64> {
        match self {
            RecordId::Numeric(n) => Some(*n),
            RecordId::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Key under which the index metadata is matched back to records.
    ///
    /// `5` and `"5"` map to the same key.
    pub fn key(&self) -> String {
        match self.as_number() {
            Some(n) => n.to_string(),
            None => match self {
                RecordId::Text(s) => s.trim().to_string(),
                RecordId::Numeric(n) => n.to_string(),
            },
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, RecordId::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Numeric(n) => write!(f, "{}", n),
            RecordId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RecordIdVisitor)
    }
}

struct RecordIdVisitor;

impl<'de> Visitor<'de> for RecordIdVisitor {
    type Value = RecordId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a record id (integer or string)")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RecordId, E> {
        Ok(RecordId::Numeric(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RecordId, E> {
        Ok(u64::try_from(v)
            .map(RecordId::Numeric)
            .unwrap_or_else(|_| RecordId::Text(v.to_string())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RecordId, E> {
        // Fractional or negative ids fall back to the textual path
        Ok(integral(v)
            .map(RecordId::Numeric)
            .unwrap_or_else(|| RecordId::Text(v.to_string())))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RecordId, E> {
        Ok(RecordId::Text(v.to_string()))
    }
}

/// `v` as an unsigned integer when it has no fractional part.
fn integral(v: f64) -> Option<u64> {
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v < u64::MAX as f64).then_some(v as u64)
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId::Numeric(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

/// Lifecycle status of a record. Inactive records are soft-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    #[serde(rename = "Ativo", alias = "Active")]
    Active,
    #[serde(rename = "Inativo", alias = "Inactive")]
    Inactive,
}

impl RecordStatus {
    pub fn is_active(self) -> bool {
        self == RecordStatus::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Active => "Ativo",
            RecordStatus::Inactive => "Inativo",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ativo" | "active" => Ok(RecordStatus::Active),
            "inativo" | "inactive" => Ok(RecordStatus::Inactive),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// One question/answer knowledge unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRecord {
    /// Store-assigned identifier; `None` when missing or blank in the file
    #[serde(
        rename = "ID",
        default,
        deserialize_with = "deserialize_record_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RecordId>,

    #[serde(rename = "Pergunta", default)]
    pub question: String,

    /// The text that gets embedded and retrieved
    #[serde(rename = "Resposta", default)]
    pub answer: String,

    #[serde(
        rename = "Versão",
        default = "default_version",
        deserialize_with = "deserialize_version"
    )]
    pub version: u32,

    #[serde(rename = "Status")]
    pub status: RecordStatus,

    #[serde(rename = "Data de criação", with = "day_month_year")]
    pub created_at: NaiveDate,
}

fn default_version() -> u32 {
    1
}

/// Versions are positive integers; `2.0` is accepted, `2.5` is not.
fn deserialize_version<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    struct VersionVisitor;

    impl<'de> Visitor<'de> for VersionVisitor {
        type Value = u32;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integral version number")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
            u32::try_from(v).map_err(|_| E::custom(format!("version {} out of range", v)))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
            u32::try_from(v).map_err(|_| E::custom(format!("version {} out of range", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u32, E> {
            integral(v)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| E::custom(format!("version {} is not an integer", v)))
        }

        fn visit_unit<E: de::Error>(self) -> Result<u32, E> {
            Ok(default_version())
        }
    }

    deserializer.deserialize_any(VersionVisitor)
}

fn deserialize_record_id<'de, D>(deserializer: D) -> Result<Option<RecordId>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<RecordId>::deserialize(deserializer)?;
    Ok(id.filter(|id| !id.is_blank()))
}

impl QaRecord {
    /// Records that can be embedded: active, identified, with content.
    pub fn is_indexable(&self) -> bool {
        self.id.is_some()
            && self.status.is_active()
            && !self.question.trim().is_empty()
            && !self.answer.trim().is_empty()
    }
}

/// `dd/mm/yyyy` dates, as written by the management screens.
pub mod day_month_year {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%d/%m/%Y";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Snapshot of a record taken when its answer was embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub id: RecordId,
    pub question: String,
    pub version: u32,
    pub status: RecordStatus,
    #[serde(with = "day_month_year")]
    pub created_at: NaiveDate,
}

impl EntryMetadata {
    /// Snapshot `record`; `None` if it has no id.
    pub fn from_record(record: &QaRecord) -> Option<Self> {
        Some(Self {
            id: record.id.clone()?,
            question: record.question.clone(),
            version: record.version,
            status: record.status,
            created_at: record.created_at,
        })
    }
}

/// One live entry of the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Key assigned by the index, unrelated to the record id
    pub index_key: String,
    pub embedded_text: String,
    pub metadata: EntryMetadata,
}

/// An entry about to be inserted.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub embedded_text: String,
    pub metadata: EntryMetadata,
    pub embedding: Vec<f32>,
}

/// An index entry together with its similarity to a query vector.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub embedding: Vec<f32>,
    pub score: f32,
}

/// An index entry scheduled for removal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deletion {
    pub index_key: String,
    /// Key of the record the entry belongs to (see [`RecordId::key`])
    pub record_id: String,
}

/// Index mutations needed to reconcile the index with the record store.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub to_delete: Vec<Deletion>,
    pub to_upsert: Vec<QaRecord>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_upsert.is_empty()
    }

    /// Index keys scheduled for deletion.
    pub fn delete_keys(&self) -> Vec<String> {
        self.to_delete.iter().map(|d| d.index_key.clone()).collect()
    }
}

/// Outcome of applying a plan to the index.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationReport {
    /// Number of entries removed
    pub deleted: usize,

    /// `(record id key, new index key)` for every inserted entry
    pub inserted: Vec<(String, String)>,

    /// Record ids that could not be synchronized after retrying
    pub failed_ids: Vec<String>,
}

/// Result of a commit or rebuild.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub planned_deletes: usize,
    pub planned_upserts: usize,
    pub mutation: MutationReport,
    pub duration_secs: f64,
}

impl SyncReport {
    /// Some records failed to sync; the rest of the commit went through.
    pub fn is_partial(&self) -> bool {
        !self.mutation.failed_ids.is_empty()
    }

    pub fn failed_ids(&self) -> &[String] {
        &self.mutation.failed_ids
    }
}

/// Why an index entry is inconsistent with the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrphanReason {
    /// No record with this id exists
    UnknownRecord,
    /// The record is inactive or has no content
    NotIndexable,
    /// Embedded text or metadata differs from the record
    Stale,
    /// Another entry for the same id was found first
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanEntry {
    pub index_key: String,
    pub record_id: String,
    pub reason: OrphanReason,
}

/// Read-only consistency check of the index against the store.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub entries: usize,
    pub orphans: Vec<OrphanEntry>,
    /// Indexable records with no index entry
    pub missing_ids: Vec<String>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.orphans.is_empty() && self.missing_ids.is_empty()
    }
}

/// A retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: EntryMetadata,
    /// Cosine similarity to the query
    pub score: f32,
}
