//! Entity model of the domain store.

use crate::calibration::ScoreCalibration;
use crate::validation::dataframe::DatasetColumns;
use crate::validation::target::SequenceType;

/// Processing state of a score set's variant data.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessingState {
    #[default]
    Incomplete,
    Processing,
    Success,
    Failed,
}

/// Mapping state of a score set's variants.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MappingState {
    PendingVariantProcessing,
    Processing,
    Complete,
    Incomplete,
    Failed,
    NotAttempted,
    Queued,
}

/// Lifecycle status of a job run.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Retried,
}

/// Lifecycle status of a pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    #[default]
    Created,
    Running,
    Succeeded,
    Failed,
}

/// Kind of per-variant annotation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationType {
    VrsMapping,
    ClingenAlleleId,
    ClinvarControl,
    GnomadAlleleFrequency,
    VepFunctionalConsequence,
}

/// Outcome of one annotation attempt.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationStatus {
    Success,
    Failed,
    Skipped,
}

/// Executable job functions; job routing is a closed, typed enumeration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobFunction {
    CreateVariantsForScoreSet,
    MapVariantsForScoreSet,
    VariantMapperManager,
    RefreshClinvarControls,
    LinkGnomadVariants,
}

/// System-wide user roles.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    Admin,
    Mapper,
}

/// Role of a user within a collection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContributionRole {
    Admin,
    Editor,
    Viewer,
}

/// A registered user.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: i64,
    /// ORCID iD used as the username.
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<UserRole>,
}

/// A dataset contributor identified by ORCID iD.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Contributor {
    pub id: i64,
    pub orcid_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

/// A data license.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct License {
    pub id: i64,
    pub short_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// A controlled vocabulary keyword.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ControlledKeyword {
    pub id: i64,
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary: Option<String>,
    #[serde(default)]
    pub special: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A DOI identifier attached to datasets.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DoiIdentifier {
    pub id: i64,
    pub identifier: String,
    pub db_name: String,
    pub url: String,
}

/// A raw read (SRA) identifier attached to experiments.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawReadIdentifier {
    pub id: i64,
    pub identifier: String,
    pub db_name: String,
    pub url: String,
}

/// One publication author with authorship level.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PublicationAuthor {
    pub name: String,
    /// Whether this is the first-listed author.
    pub primary: bool,
}

/// A publication identifier; unique over (identifier, db_name).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PublicationIdentifier {
    pub id: i64,
    pub identifier: String,
    pub db_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<PublicationAuthor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_pages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub reference_html: String,
}

/// An experiment set: the top-level grouping node.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExperimentSet {
    pub id: i64,
    pub urn: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<chrono::NaiveDate>,
    pub creation_date: chrono::NaiveDate,
    pub modification_date: chrono::NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
}

/// An experiment grouping one or more score sets.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub urn: String,
    pub title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub method_text: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<chrono::NaiveDate>,
    pub experiment_set_id: i64,
    pub creation_date: chrono::NaiveDate,
    pub modification_date: chrono::NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
}

/// Structured processing error payload persisted on a score set.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessingErrors {
    pub exception: String,
    #[serde(default)]
    pub detail: Vec<String>,
}

/// A score set: the unit of published MAVE data.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoreSet {
    pub id: i64,
    pub urn: String,
    pub title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub method_text: String,
    #[serde(default)]
    pub extra_metadata: serde_json::Value,
    #[serde(default)]
    pub dataset_columns: DatasetColumns,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_ranges: Option<serde_json::Value>,
    #[serde(default = "default_private")]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub processing_state: ProcessingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_errors: Option<ProcessingErrors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_state: Option<MappingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_errors: Option<serde_json::Value>,
    #[serde(default)]
    pub num_variants: i64,
    pub experiment_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_id: Option<i64>,
    /// The score set this one supersedes, if any (linear chain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_score_set_id: Option<i64>,
    #[serde(default)]
    pub contributors: Vec<i64>,
    pub creation_date: chrono::NaiveDate,
    pub modification_date: chrono::NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<i64>,
}

fn default_private() -> bool {
    true
}

/// A raw target sequence plus its declared type.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetSequence {
    pub sequence: String,
    #[serde(default)]
    pub sequence_type: SequenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxonomy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A reference transcript/genome accession target.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetAccession {
    pub accession: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene: Option<String>,
    #[serde(default)]
    pub is_base_editor: bool,
}

/// What a score set assays: either a raw sequence or an accession.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetGene {
    pub id: i64,
    pub score_set_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sequence: Option<TargetSequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_accession: Option<TargetAccession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_hgnc_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_mapped_metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mapped_metadata: Option<serde_json::Value>,
}

/// The JSON data payload of a variant.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantData {
    #[serde(default)]
    pub score_data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub count_data: serde_json::Map<String, serde_json::Value>,
}

impl VariantData {
    /// The numeric score of this variant, if present.
    pub fn score(&self) -> Option<f64> {
        match self.score_data.get("score") {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A single row of an ingested dataset, bound to a score set.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Variant {
    pub id: i64,
    pub urn: String,
    pub score_set_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hgvs_nt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hgvs_splice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hgvs_pro: Option<String>,
    pub data: VariantData,
    pub creation_date: chrono::NaiveDate,
    pub modification_date: chrono::NaiveDate,
}

impl Variant {
    /// The 1-based number from the variant URN suffix, if well-formed.
    pub fn urn_suffix(&self) -> Option<u64> {
        self.urn.rsplit_once('#').and_then(|(_, n)| n.parse().ok())
    }
}

/// The VRS-mapped view of a variant.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MappedVariant {
    pub id: i64,
    pub variant_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_mapped: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mapped: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrs_version: Option<String>,
    pub mapping_api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_date: Option<chrono::NaiveDate>,
    pub modification_date: chrono::NaiveDate,
    pub current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clingen_allele_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One row of the append-only per-variant annotation history.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantAnnotationStatus {
    pub id: i64,
    pub variant_id: i64,
    pub annotation_type: AnnotationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: AnnotationStatus,
    pub current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_run_id: Option<i64>,
    pub creation_date: chrono::NaiveDate,
}

/// An external clinical control record, keyed by (db_name, db_identifier).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClinicalControl {
    pub id: i64,
    pub db_name: String,
    pub db_identifier: String,
    pub db_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_significance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_review_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_symbol: Option<String>,
    pub modification_date: chrono::NaiveDate,
}

/// A gnomAD variant record, keyed by its gnomAD identifier.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GnomadVariant {
    pub id: i64,
    pub db_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_number: Option<i64>,
    pub modification_date: chrono::NaiveDate,
}

/// Progress of a running job.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobProgress {
    pub completed: i64,
    pub total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A persistent job lifecycle record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JobRun {
    pub id: i64,
    pub job_type: String,
    pub job_function: JobFunction,
    pub status: JobStatus,
    #[serde(default)]
    pub job_params: serde_json::Value,
    #[serde(default)]
    pub progress: JobProgress,
    #[serde(default)]
    pub retry_count: i64,
    #[serde(default)]
    pub max_retries: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Free-form key/value context accumulated by the job for logging.
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<i64>,
    pub mavedb_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// One declared step of a pipeline: a job function plus its parameter
/// template.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipelineStep {
    pub function: JobFunction,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A pre-registered ordered sequence of jobs.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub status: PipelineStatus,
    pub pipeline_type: String,
    pub steps: Vec<PipelineStep>,
    /// Index of the step currently executing or about to execute.
    pub current_step: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A calibration entity alias; calibrations are modelled in
/// [`crate::calibration`] and stored as-is.
pub type StoredScoreCalibration = ScoreCalibration;
