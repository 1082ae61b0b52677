//! The embedded domain store.
//!
//! Tables are order-preserving maps keyed by entity id; uniqueness and
//! cascade contracts are enforced by the mutation methods here. The whole
//! store serializes to a JSON snapshot. A savepoint mirrors session
//! commit/rollback semantics for the managed job lifecycle.

pub mod annotation;
pub mod models;

use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;
use serde_with::serde_as;

use crate::calibration::ScoreCalibration;
use crate::common::today;
use crate::error::CoreError;
use crate::store::models::*;
use crate::urns::generate_temp_urn;

/// Shared handle to the store used by jobs and the worker loop.
pub type Db = std::sync::Arc<tokio::sync::Mutex<Store>>;

/// Directed meta-analysis relationship between score sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetaAnalysisLink {
    pub source_score_set_id: i64,
    pub meta_analysis_score_set_id: i64,
}

/// All tables of the store.
#[serde_as]
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StoreData {
    #[serde_as(as = "Vec<(_, _)>")]
    pub users: IndexMap<i64, User>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub contributors: IndexMap<i64, Contributor>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub licenses: IndexMap<i64, License>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub controlled_keywords: IndexMap<i64, ControlledKeyword>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub doi_identifiers: IndexMap<i64, DoiIdentifier>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub raw_read_identifiers: IndexMap<i64, RawReadIdentifier>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub publication_identifiers: IndexMap<i64, PublicationIdentifier>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub experiment_sets: IndexMap<i64, ExperimentSet>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub experiments: IndexMap<i64, Experiment>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub score_sets: IndexMap<i64, ScoreSet>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub target_genes: IndexMap<i64, TargetGene>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub variants: IndexMap<i64, Variant>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub mapped_variants: IndexMap<i64, MappedVariant>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub annotation_statuses: IndexMap<i64, VariantAnnotationStatus>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub calibrations: IndexMap<i64, ScoreCalibration>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub clinical_controls: IndexMap<i64, ClinicalControl>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub gnomad_variants: IndexMap<i64, GnomadVariant>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub job_runs: IndexMap<i64, JobRun>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub pipelines: IndexMap<i64, Pipeline>,
    /// MappedVariant ↔ ClinicalControl association.
    #[serde(default)]
    pub mapped_variant_clinical_controls: Vec<(i64, i64)>,
    /// MappedVariant ↔ GnomADVariant association.
    #[serde(default)]
    pub mapped_variant_gnomad_variants: Vec<(i64, i64)>,
    /// Meta-analysis join table with explicit directional halves.
    #[serde(default)]
    pub meta_analysis_sources: Vec<MetaAnalysisLink>,
    next_id: i64,
}

impl StoreData {
    pub fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    // -- users, contributors, auxiliary lookups ------------------------------

    pub fn create_user(&mut self, username: &str, roles: Vec<UserRole>) -> i64 {
        let id = self.next_id();
        self.users.insert(
            id,
            User {
                id,
                username: username.to_owned(),
                roles,
                ..Default::default()
            },
        );
        id
    }

    pub fn user(&self, id: i64) -> Result<&User, CoreError> {
        self.users
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("user {}", id)))
    }

    pub fn find_contributor_by_orcid(&self, orcid_id: &str) -> Option<&Contributor> {
        self.contributors.values().find(|c| c.orcid_id == orcid_id)
    }

    pub fn create_contributor(&mut self, orcid_id: &str) -> i64 {
        if let Some(existing) = self.find_contributor_by_orcid(orcid_id) {
            return existing.id;
        }
        let id = self.next_id();
        self.contributors.insert(
            id,
            Contributor {
                id,
                orcid_id: orcid_id.to_owned(),
                ..Default::default()
            },
        );
        id
    }

    // -- experiment sets, experiments, score sets ----------------------------

    pub fn create_experiment_set(&mut self, created_by: Option<i64>) -> i64 {
        let id = self.next_id();
        self.experiment_sets.insert(
            id,
            ExperimentSet {
                id,
                urn: generate_temp_urn(),
                private: true,
                published_date: None,
                creation_date: today(),
                modification_date: today(),
                created_by,
            },
        );
        id
    }

    /// Create an experiment; a missing parent experiment set is created
    /// write-behind, bound to the inserting user's context.
    pub fn create_experiment(
        &mut self,
        title: &str,
        experiment_set_id: Option<i64>,
        created_by: Option<i64>,
    ) -> Result<i64, CoreError> {
        let experiment_set_id = match experiment_set_id {
            Some(id) => {
                self.experiment_set(id)?;
                id
            }
            None => self.create_experiment_set(created_by),
        };
        let id = self.next_id();
        self.experiments.insert(
            id,
            Experiment {
                id,
                urn: generate_temp_urn(),
                title: title.to_owned(),
                private: true,
                experiment_set_id,
                creation_date: today(),
                modification_date: today(),
                created_by,
                ..Default::default()
            },
        );
        Ok(id)
    }

    pub fn create_score_set(
        &mut self,
        title: &str,
        experiment_id: i64,
        created_by: Option<i64>,
    ) -> Result<i64, CoreError> {
        self.experiment(experiment_id)?;
        let id = self.next_id();
        self.score_sets.insert(
            id,
            ScoreSet {
                id,
                urn: generate_temp_urn(),
                title: title.to_owned(),
                private: true,
                experiment_id,
                creation_date: today(),
                modification_date: today(),
                created_by,
                modified_by: created_by,
                ..Default::default()
            },
        );
        Ok(id)
    }

    pub fn experiment_set(&self, id: i64) -> Result<&ExperimentSet, CoreError> {
        self.experiment_sets
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("experiment set {}", id)))
    }

    pub fn experiment_set_mut(&mut self, id: i64) -> Result<&mut ExperimentSet, CoreError> {
        self.experiment_sets
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("experiment set {}", id)))
    }

    pub fn experiment(&self, id: i64) -> Result<&Experiment, CoreError> {
        self.experiments
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("experiment {}", id)))
    }

    pub fn experiment_mut(&mut self, id: i64) -> Result<&mut Experiment, CoreError> {
        self.experiments
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("experiment {}", id)))
    }

    pub fn score_set(&self, id: i64) -> Result<&ScoreSet, CoreError> {
        self.score_sets
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("score set {}", id)))
    }

    pub fn score_set_mut(&mut self, id: i64) -> Result<&mut ScoreSet, CoreError> {
        self.score_sets
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("score set {}", id)))
    }

    pub fn find_score_set_by_urn(&self, urn: &str) -> Option<&ScoreSet> {
        self.score_sets.values().find(|s| s.urn == urn)
    }

    /// Walk the superseding chain starting at a score set, oldest first. A
    /// visit set guards against cycles, which violate an invariant.
    pub fn walk_superseded_chain(&self, score_set_id: i64) -> Result<Vec<i64>, CoreError> {
        let mut visited = std::collections::HashSet::new();
        let mut chain = Vec::new();
        let mut cursor = Some(score_set_id);
        while let Some(id) = cursor {
            if !visited.insert(id) {
                return Err(CoreError::Internal(format!(
                    "superseded chain starting at score set {} contains a cycle",
                    score_set_id
                )));
            }
            let score_set = self.score_set(id)?;
            chain.push(id);
            cursor = score_set.superseded_score_set_id;
        }
        chain.reverse();
        Ok(chain)
    }

    // -- meta-analysis graph -------------------------------------------------

    pub fn add_meta_analysis_source(&mut self, source_score_set_id: i64, meta_analysis_score_set_id: i64) {
        let link = MetaAnalysisLink {
            source_score_set_id,
            meta_analysis_score_set_id,
        };
        if !self.meta_analysis_sources.contains(&link) {
            self.meta_analysis_sources.push(link);
        }
    }

    /// Score sets analyzed by a meta-analysis score set.
    pub fn meta_analyzes_score_sets(&self, meta_analysis_score_set_id: i64) -> Vec<i64> {
        self.meta_analysis_sources
            .iter()
            .filter(|l| l.meta_analysis_score_set_id == meta_analysis_score_set_id)
            .map(|l| l.source_score_set_id)
            .collect()
    }

    /// Meta-analysis score sets analyzing a source score set.
    pub fn meta_analyses_for_score_set(&self, source_score_set_id: i64) -> Vec<i64> {
        self.meta_analysis_sources
            .iter()
            .filter(|l| l.source_score_set_id == source_score_set_id)
            .map(|l| l.meta_analysis_score_set_id)
            .collect()
    }

    // -- target genes --------------------------------------------------------

    /// Attach a target gene to a score set, enforcing target consistency:
    /// no mixing of sequence and accession targets, distinct non-empty labels
    /// when multiple targets exist, and uniform base-editor status.
    pub fn add_target_gene(&mut self, mut target: TargetGene) -> Result<i64, CoreError> {
        self.score_set(target.score_set_id)?;
        let siblings: Vec<&TargetGene> = self
            .target_genes
            .values()
            .filter(|t| t.score_set_id == target.score_set_id)
            .collect();

        let has_sequence = target.target_sequence.is_some()
            || siblings.iter().any(|t| t.target_sequence.is_some());
        let has_accession = target.target_accession.is_some()
            || siblings.iter().any(|t| t.target_accession.is_some());
        if has_sequence && has_accession {
            return Err(CoreError::MixedTarget(format!(
                "score set {} mixes sequence and accession based targets",
                target.score_set_id
            )));
        }

        if !siblings.is_empty() {
            let mut labels: Vec<Option<&str>> = siblings
                .iter()
                .map(|t| t.target_sequence.as_ref().and_then(|s| s.label.as_deref()))
                .collect();
            labels.push(
                target
                    .target_sequence
                    .as_ref()
                    .and_then(|s| s.label.as_deref()),
            );
            if target.target_sequence.is_some() || siblings.iter().any(|t| t.target_sequence.is_some()) {
                let mut seen = std::collections::HashSet::new();
                for label in labels {
                    match label {
                        Some(label) if !label.trim().is_empty() => {
                            if !seen.insert(label) {
                                return Err(CoreError::Validation(
                                    crate::error::ValidationError::new(
                                        "target sequence labels must be distinct when a score \
                                         set has multiple targets",
                                    ),
                                ));
                            }
                        }
                        _ => {
                            return Err(CoreError::Validation(crate::error::ValidationError::new(
                                "each target must have a non-empty label when a score set has \
                                 multiple targets",
                            )))
                        }
                    }
                }
            }

            if let Some(accession) = &target.target_accession {
                if siblings.iter().any(|t| {
                    t.target_accession
                        .as_ref()
                        .is_some_and(|a| a.is_base_editor != accession.is_base_editor)
                }) {
                    return Err(CoreError::Validation(crate::error::ValidationError::new(
                        "all target accessions of one score set must share base editor status",
                    )));
                }
            }
        }

        let id = self.next_id();
        target.id = id;
        self.target_genes.insert(id, target);
        Ok(id)
    }

    pub fn target_genes_for_score_set(&self, score_set_id: i64) -> Vec<&TargetGene> {
        self.target_genes
            .values()
            .filter(|t| t.score_set_id == score_set_id)
            .collect()
    }

    pub fn target_gene_mut(&mut self, id: i64) -> Result<&mut TargetGene, CoreError> {
        self.target_genes
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("target gene {}", id)))
    }

    // -- variants ------------------------------------------------------------

    pub fn variant(&self, id: i64) -> Result<&Variant, CoreError> {
        self.variants
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("variant {}", id)))
    }

    pub fn variant_mut(&mut self, id: i64) -> Result<&mut Variant, CoreError> {
        self.variants
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("variant {}", id)))
    }

    pub fn find_variant_by_urn(&self, urn: &str) -> Option<&Variant> {
        self.variants.values().find(|v| v.urn == urn)
    }

    pub fn variants_for_score_set(&self, score_set_id: i64) -> Vec<&Variant> {
        self.variants
            .values()
            .filter(|v| v.score_set_id == score_set_id)
            .collect()
    }

    /// Bulk-insert variants, enforcing URN uniqueness.
    pub fn insert_variants(&mut self, variants: Vec<Variant>) -> Result<Vec<i64>, CoreError> {
        let mut existing: std::collections::HashSet<String> =
            self.variants.values().map(|v| v.urn.clone()).collect();
        let mut ids = Vec::with_capacity(variants.len());
        for mut variant in variants {
            if !existing.insert(variant.urn.clone()) {
                return Err(CoreError::Conflict(format!(
                    "variant URN {} already exists",
                    variant.urn
                )));
            }
            let id = self.next_id();
            variant.id = id;
            self.variants.insert(id, variant);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Delete all variants of a score set, cascading to mapped variants,
    /// annotation statuses, and enrichment links.
    pub fn delete_variants_for_score_set(&mut self, score_set_id: i64) -> usize {
        let variant_ids: std::collections::HashSet<i64> = self
            .variants
            .values()
            .filter(|v| v.score_set_id == score_set_id)
            .map(|v| v.id)
            .collect();
        let mapped_ids: std::collections::HashSet<i64> = self
            .mapped_variants
            .values()
            .filter(|m| variant_ids.contains(&m.variant_id))
            .map(|m| m.id)
            .collect();

        self.mapped_variant_clinical_controls
            .retain(|(mv, _)| !mapped_ids.contains(mv));
        self.mapped_variant_gnomad_variants
            .retain(|(mv, _)| !mapped_ids.contains(mv));
        self.mapped_variants.retain(|_, m| !mapped_ids.contains(&m.id));
        self.annotation_statuses
            .retain(|_, s| !variant_ids.contains(&s.variant_id));
        self.variants.retain(|_, v| !variant_ids.contains(&v.id));
        variant_ids.len()
    }

    // -- mapped variants -----------------------------------------------------

    pub fn insert_mapped_variant(&mut self, mut mapped: MappedVariant) -> i64 {
        let id = self.next_id();
        mapped.id = id;
        self.mapped_variants.insert(id, mapped);
        id
    }

    /// The single current mapped variant for a variant, if any.
    pub fn current_mapped_variant(&self, variant_id: i64) -> Option<&MappedVariant> {
        self.mapped_variants
            .values()
            .find(|m| m.variant_id == variant_id && m.current)
    }

    /// Flip `current=false` on any current mapped variant of this variant.
    pub fn retire_current_mapped_variants(&mut self, variant_id: i64) {
        for mapped in self.mapped_variants.values_mut() {
            if mapped.variant_id == variant_id && mapped.current {
                mapped.current = false;
            }
        }
    }

    /// All current mapped variants, across score sets.
    pub fn current_mapped_variants(&self) -> Vec<&MappedVariant> {
        self.mapped_variants.values().filter(|m| m.current).collect()
    }

    pub fn mapped_variant_mut(&mut self, id: i64) -> Result<&mut MappedVariant, CoreError> {
        self.mapped_variants
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("mapped variant {}", id)))
    }

    // -- enrichment entities -------------------------------------------------

    pub fn find_clinical_control(
        &self,
        db_name: &str,
        db_identifier: &str,
    ) -> Option<&ClinicalControl> {
        self.clinical_controls
            .values()
            .find(|c| c.db_name == db_name && c.db_identifier == db_identifier)
    }

    /// Insert or update a clinical control keyed by (db_name, db_identifier).
    pub fn upsert_clinical_control(&mut self, control: ClinicalControl) -> i64 {
        if let Some(existing_id) = self
            .find_clinical_control(&control.db_name, &control.db_identifier)
            .map(|c| c.id)
        {
            let existing = self.clinical_controls.get_mut(&existing_id).unwrap();
            existing.db_version = control.db_version;
            existing.clinical_significance = control.clinical_significance;
            existing.clinical_review_status = control.clinical_review_status;
            existing.gene_symbol = control.gene_symbol;
            existing.modification_date = today();
            existing_id
        } else {
            let id = self.next_id();
            self.clinical_controls.insert(
                id,
                ClinicalControl {
                    id,
                    modification_date: today(),
                    ..control
                },
            );
            id
        }
    }

    /// Idempotently link a mapped variant to a clinical control.
    pub fn link_clinical_control(&mut self, mapped_variant_id: i64, clinical_control_id: i64) {
        let link = (mapped_variant_id, clinical_control_id);
        if !self.mapped_variant_clinical_controls.contains(&link) {
            self.mapped_variant_clinical_controls.push(link);
        }
    }

    pub fn find_gnomad_variant(&self, db_identifier: &str) -> Option<&GnomadVariant> {
        self.gnomad_variants
            .values()
            .find(|g| g.db_identifier == db_identifier)
    }

    /// Insert or update a gnomAD variant keyed by its gnomAD identifier.
    pub fn upsert_gnomad_variant(&mut self, variant: GnomadVariant) -> i64 {
        if let Some(existing_id) = self.find_gnomad_variant(&variant.db_identifier).map(|g| g.id) {
            let existing = self.gnomad_variants.get_mut(&existing_id).unwrap();
            existing.db_version = variant.db_version;
            existing.allele_frequency = variant.allele_frequency;
            existing.allele_count = variant.allele_count;
            existing.allele_number = variant.allele_number;
            existing.modification_date = today();
            existing_id
        } else {
            let id = self.next_id();
            self.gnomad_variants.insert(
                id,
                GnomadVariant {
                    id,
                    modification_date: today(),
                    ..variant
                },
            );
            id
        }
    }

    /// Idempotently link a mapped variant to a gnomAD variant.
    pub fn link_gnomad_variant(&mut self, mapped_variant_id: i64, gnomad_variant_id: i64) {
        let link = (mapped_variant_id, gnomad_variant_id);
        if !self.mapped_variant_gnomad_variants.contains(&link) {
            self.mapped_variant_gnomad_variants.push(link);
        }
    }

    // -- publications and auxiliary identifiers ------------------------------

    pub fn find_publication(&self, identifier: &str, db_name: &str) -> Option<&PublicationIdentifier> {
        self.publication_identifiers
            .values()
            .find(|p| p.identifier == identifier && p.db_name == db_name)
    }

    pub fn find_publication_by_doi(&self, doi: &str) -> Option<&PublicationIdentifier> {
        self.publication_identifiers
            .values()
            .find(|p| p.doi.as_deref() == Some(doi))
    }

    /// Insert a publication, enforcing uniqueness over (identifier, db_name).
    pub fn insert_publication(
        &mut self,
        mut publication: PublicationIdentifier,
    ) -> Result<i64, CoreError> {
        if self
            .find_publication(&publication.identifier, &publication.db_name)
            .is_some()
        {
            return Err(CoreError::Conflict(format!(
                "publication identifier ({}, {}) already exists",
                publication.identifier, publication.db_name
            )));
        }
        let id = self.next_id();
        publication.id = id;
        self.publication_identifiers.insert(id, publication);
        Ok(id)
    }

    /// Find or create a DOI identifier record.
    pub fn find_or_create_doi_identifier(&mut self, identifier: &str) -> i64 {
        if let Some(existing) = self
            .doi_identifiers
            .values()
            .find(|d| d.identifier == identifier)
        {
            return existing.id;
        }
        let id = self.next_id();
        self.doi_identifiers.insert(
            id,
            DoiIdentifier {
                id,
                identifier: identifier.to_owned(),
                db_name: "DOI".to_owned(),
                url: format!("https://doi.org/{}", identifier),
            },
        );
        id
    }

    /// Find or create a raw read (SRA) identifier record.
    pub fn find_or_create_raw_read_identifier(&mut self, identifier: &str) -> i64 {
        if let Some(existing) = self
            .raw_read_identifiers
            .values()
            .find(|r| r.identifier == identifier)
        {
            return existing.id;
        }
        let id = self.next_id();
        self.raw_read_identifiers.insert(
            id,
            RawReadIdentifier {
                id,
                identifier: identifier.to_owned(),
                db_name: "SRA".to_owned(),
                url: format!("http://www.ebi.ac.uk/ena/data/view/{}", identifier),
            },
        );
        id
    }

    // -- calibrations --------------------------------------------------------

    pub fn insert_calibration(&mut self, mut calibration: ScoreCalibration) -> i64 {
        let id = self.next_id();
        calibration.id = id;
        self.calibrations.insert(id, calibration);
        id
    }

    pub fn calibration(&self, id: i64) -> Result<&ScoreCalibration, CoreError> {
        self.calibrations
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("score calibration {}", id)))
    }

    pub fn calibration_mut(&mut self, id: i64) -> Result<&mut ScoreCalibration, CoreError> {
        self.calibrations
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("score calibration {}", id)))
    }

    pub fn calibrations_for_score_set(&self, score_set_id: i64) -> Vec<&ScoreCalibration> {
        self.calibrations
            .values()
            .filter(|c| c.score_set_id == score_set_id)
            .collect()
    }

    pub fn delete_calibration(&mut self, id: i64) -> Result<(), CoreError> {
        self.calibrations
            .shift_remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("score calibration {}", id)))
    }

    // -- job runs and pipelines ----------------------------------------------

    pub fn create_job_run(
        &mut self,
        job_type: &str,
        job_function: JobFunction,
        job_params: serde_json::Value,
        max_retries: i64,
        pipeline_id: Option<i64>,
    ) -> i64 {
        let id = self.next_id();
        self.job_runs.insert(
            id,
            JobRun {
                id,
                job_type: job_type.to_owned(),
                job_function,
                status: JobStatus::Pending,
                job_params,
                progress: JobProgress::default(),
                retry_count: 0,
                max_retries,
                result: None,
                context: serde_json::Value::Null,
                pipeline_id,
                mavedb_version: crate::common::worker_version().to_owned(),
                created_at: Some(chrono::Utc::now()),
                started_at: None,
                finished_at: None,
            },
        );
        id
    }

    pub fn job_run(&self, id: i64) -> Result<&JobRun, CoreError> {
        self.job_runs
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("job run {}", id)))
    }

    pub fn job_run_mut(&mut self, id: i64) -> Result<&mut JobRun, CoreError> {
        self.job_runs
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("job run {}", id)))
    }

    pub fn create_pipeline(&mut self, pipeline_type: &str, steps: Vec<PipelineStep>) -> i64 {
        let id = self.next_id();
        self.pipelines.insert(
            id,
            Pipeline {
                id,
                status: PipelineStatus::Created,
                pipeline_type: pipeline_type.to_owned(),
                steps,
                current_step: 0,
                created_at: Some(chrono::Utc::now()),
            },
        );
        id
    }

    pub fn pipeline(&self, id: i64) -> Result<&Pipeline, CoreError> {
        self.pipelines
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("pipeline {}", id)))
    }

    pub fn pipeline_mut(&mut self, id: i64) -> Result<&mut Pipeline, CoreError> {
        self.pipelines
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("pipeline {}", id)))
    }

    /// Job runs belonging to a pipeline, in creation order.
    pub fn job_runs_for_pipeline(&self, pipeline_id: i64) -> Vec<&JobRun> {
        self.job_runs
            .values()
            .filter(|j| j.pipeline_id == Some(pipeline_id))
            .collect()
    }
}

/// The store: live data plus a savepoint for commit/rollback semantics.
#[derive(Debug, Clone, Default)]
pub struct Store {
    data: StoreData,
    savepoint: StoreData,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist the current data as the rollback point.
    pub fn commit(&mut self) {
        self.savepoint = self.data.clone();
    }

    /// Restore the data to the last commit.
    pub fn rollback(&mut self) {
        self.data = self.savepoint.clone();
    }

    /// Write a JSON snapshot of the store.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), anyhow::Error> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &self.data)?;
        Ok(())
    }

    /// Load a store from a JSON snapshot.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, anyhow::Error> {
        let file = std::fs::File::open(path)?;
        let data: StoreData = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(Self {
            savepoint: data.clone(),
            data,
        })
    }
}

impl Deref for Store {
    type Target = StoreData;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Store {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}
