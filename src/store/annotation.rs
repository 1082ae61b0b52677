//! Append-only per-variant annotation status history.

use crate::common::today;
use crate::store::models::{AnnotationStatus, AnnotationType, VariantAnnotationStatus};
use crate::store::StoreData;

/// Parameters of one annotation status row.
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub variant_id: i64,
    pub annotation_type: AnnotationType,
    pub version: Option<String>,
    pub status: AnnotationStatus,
    pub annotation_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub job_run_id: Option<i64>,
}

/// Manager enforcing the current-flag contract over annotation statuses.
pub struct AnnotationStatusManager<'a> {
    data: &'a mut StoreData,
}

impl<'a> AnnotationStatusManager<'a> {
    pub fn new(data: &'a mut StoreData) -> Self {
        Self { data }
    }

    /// Atomically insert a new annotation row: any existing row matching
    /// (variant_id, annotation_type, version) is flipped to `current=false`
    /// first. Rows for a different version or type are untouched.
    pub fn add_annotation(&mut self, annotation: NewAnnotation) -> i64 {
        for existing in self.data.annotation_statuses.values_mut() {
            if existing.variant_id == annotation.variant_id
                && existing.annotation_type == annotation.annotation_type
                && existing.version == annotation.version
                && existing.current
            {
                existing.current = false;
            }
        }

        let id = self.data.next_id();
        self.data.annotation_statuses.insert(
            id,
            VariantAnnotationStatus {
                id,
                variant_id: annotation.variant_id,
                annotation_type: annotation.annotation_type,
                version: annotation.version,
                status: annotation.status,
                current: true,
                annotation_data: annotation.annotation_data,
                error_message: annotation.error_message,
                job_run_id: annotation.job_run_id,
                creation_date: today(),
            },
        );
        id
    }

    /// The unique current row for (variant_id, annotation_type, version), if
    /// any.
    pub fn get_current_annotation(
        &self,
        variant_id: i64,
        annotation_type: AnnotationType,
        version: Option<&str>,
    ) -> Option<&VariantAnnotationStatus> {
        self.data.annotation_statuses.values().find(|s| {
            s.variant_id == variant_id
                && s.annotation_type == annotation_type
                && s.version.as_deref() == version
                && s.current
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn annotation(
        variant_id: i64,
        annotation_type: AnnotationType,
        version: Option<&str>,
        status: AnnotationStatus,
    ) -> NewAnnotation {
        NewAnnotation {
            variant_id,
            annotation_type,
            version: version.map(str::to_owned),
            status,
            annotation_data: None,
            error_message: None,
            job_run_id: None,
        }
    }

    #[test]
    fn adding_a_second_row_retires_the_first() {
        let mut data = StoreData::default();
        let mut manager = AnnotationStatusManager::new(&mut data);
        let first = manager.add_annotation(annotation(
            1,
            AnnotationType::VrsMapping,
            Some("v1"),
            AnnotationStatus::Success,
        ));
        let second = manager.add_annotation(annotation(
            1,
            AnnotationType::VrsMapping,
            Some("v1"),
            AnnotationStatus::Failed,
        ));

        assert!(!data.annotation_statuses[&first].current);
        assert!(data.annotation_statuses[&second].current);
    }

    #[test]
    fn different_versions_keep_their_own_current_rows() {
        let mut data = StoreData::default();
        let mut manager = AnnotationStatusManager::new(&mut data);
        let v1 = manager.add_annotation(annotation(
            1,
            AnnotationType::VrsMapping,
            Some("v1"),
            AnnotationStatus::Success,
        ));
        let v2 = manager.add_annotation(annotation(
            1,
            AnnotationType::VrsMapping,
            Some("v2"),
            AnnotationStatus::Success,
        ));

        assert!(data.annotation_statuses[&v1].current);
        assert!(data.annotation_statuses[&v2].current);
    }

    #[test]
    fn different_types_keep_their_own_current_rows() {
        let mut data = StoreData::default();
        let mut manager = AnnotationStatusManager::new(&mut data);
        let mapping = manager.add_annotation(annotation(
            1,
            AnnotationType::VrsMapping,
            Some("v1"),
            AnnotationStatus::Success,
        ));
        let control = manager.add_annotation(annotation(
            1,
            AnnotationType::ClinvarControl,
            Some("v1"),
            AnnotationStatus::Skipped,
        ));

        assert!(data.annotation_statuses[&mapping].current);
        assert!(data.annotation_statuses[&control].current);
    }

    #[test]
    fn unversioned_rows_share_one_current_slot() {
        let mut data = StoreData::default();
        let mut manager = AnnotationStatusManager::new(&mut data);
        let first = manager.add_annotation(annotation(
            1,
            AnnotationType::ClinvarControl,
            None,
            AnnotationStatus::Success,
        ));
        manager.add_annotation(annotation(
            1,
            AnnotationType::ClinvarControl,
            None,
            AnnotationStatus::Skipped,
        ));

        assert!(!data.annotation_statuses[&first].current);
        let manager = AnnotationStatusManager::new(&mut data);
        let current = manager
            .get_current_annotation(1, AnnotationType::ClinvarControl, None)
            .unwrap();
        assert_eq!(AnnotationStatus::Skipped, current.status);
    }

    #[test]
    fn history_is_append_only() {
        let mut data = StoreData::default();
        let mut manager = AnnotationStatusManager::new(&mut data);
        for _ in 0..3 {
            manager.add_annotation(annotation(
                1,
                AnnotationType::VrsMapping,
                Some("v1"),
                AnnotationStatus::Success,
            ));
        }
        assert_eq!(3, data.annotation_statuses.len());
        assert_eq!(
            1,
            data.annotation_statuses
                .values()
                .filter(|s| s.current)
                .count()
        );
    }
}
