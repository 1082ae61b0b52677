//! Client for the VRS mapping service.

use indexmap::IndexMap;

use crate::error::CoreError;

/// One mapped score returned by the mapping service.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MappedScore {
    /// The MaveDB variant URN this mapping belongs to.
    pub mavedb_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_mapped: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mapped: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrs_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Gene-level metadata for a mapped target.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeneInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hgnc_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_method: Option<String>,
}

/// Reference sequences of one annotation layer.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReferenceLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_reference_sequence: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_reference_sequence: Option<serde_json::Value>,
}

/// Per-target reference metadata.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_info: Option<GeneInfo>,
    #[serde(default)]
    pub layers: IndexMap<String, ReferenceLayer>,
}

/// The full result payload of mapping one score set.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VrsMappingResults {
    #[serde(default)]
    pub mapped_scores: Vec<MappedScore>,
    /// Keyed by target gene name.
    #[serde(default)]
    pub reference_sequences: IndexMap<String, TargetReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_date_utc: Option<String>,
    #[serde(default)]
    pub dcd_mapping_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl VrsMappingResults {
    /// The mapping date parsed from the UTC timestamp, if present.
    pub fn mapped_date(&self) -> Option<chrono::NaiveDate> {
        self.mapped_date_utc
            .as_deref()
            .and_then(|s| s.get(..10))
            .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }
}

/// Blocking client mapping a whole score set through VRS.
pub trait VrsMapperClient: Send + Sync {
    fn map_score_set(&self, urn: &str) -> Result<VrsMappingResults, CoreError>;
}

/// HTTP implementation against the dcd-mapping service.
pub struct HttpVrsMapperClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpVrsMapperClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl VrsMapperClient for HttpVrsMapperClient {
    fn map_score_set(&self, urn: &str) -> Result<VrsMappingResults, CoreError> {
        let url = format!("{}/api/v1/map/{}", self.base_url, urn);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| CoreError::Transport(format!("VRS mapper request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(CoreError::Transport(format!(
                "VRS mapper returned status {} for {}",
                response.status(),
                urn
            )));
        }
        response
            .json()
            .map_err(|e| CoreError::Transport(format!("VRS mapper returned invalid JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mapped_date_parses_utc_timestamps() {
        let results = VrsMappingResults {
            mapped_date_utc: Some("2026-08-01T12:30:00Z".to_owned()),
            ..Default::default()
        };
        assert_eq!(
            chrono::NaiveDate::from_ymd_opt(2026, 8, 1),
            results.mapped_date()
        );
        assert_eq!(None, VrsMappingResults::default().mapped_date());
    }

    #[test]
    fn results_deserialize_from_service_shape() {
        let payload = serde_json::json!({
            "mapped_scores": [
                {"mavedb_id": "tmp:x#1", "pre_mapped": {"id": "a"}, "post_mapped": {"id": "b"}, "vrs_version": "2.0"}
            ],
            "reference_sequences": {
                "TP53": {
                    "gene_info": {"hgnc_symbol": "TP53", "selection_method": "exact"},
                    "layers": {"g": {"computed_reference_sequence": {"sequence": "AT"}}}
                }
            },
            "mapped_date_utc": "2026-08-01T00:00:00Z",
            "dcd_mapping_version": "1.2.3"
        });
        let results: VrsMappingResults = serde_json::from_value(payload).unwrap();
        assert_eq!(1, results.mapped_scores.len());
        assert_eq!("1.2.3", results.dcd_mapping_version);
        assert!(results.reference_sequences["TP53"].gene_info.is_some());
    }
}
