//! Client for the gnomAD variant source.

use crate::error::CoreError;

/// One gnomAD record matched to a ClinGen allele id.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GnomadRecord {
    /// The CAID this record was matched against.
    pub caid: String,
    /// The gnomAD variant key, e.g. `1-55516888-G-GA`.
    pub db_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_number: Option<i64>,
}

/// Blocking client batch-querying gnomAD records by CAID.
pub trait GnomadSourceClient: Send + Sync {
    fn variants_for_caids(&self, caids: &[String]) -> Result<Vec<GnomadRecord>, CoreError>;
}

/// HTTP implementation fronting the SQL-queryable gnomAD data lake.
pub struct HttpGnomadClient {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpGnomadClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl GnomadSourceClient for HttpGnomadClient {
    fn variants_for_caids(&self, caids: &[String]) -> Result<Vec<GnomadRecord>, CoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "caids": caids }))
            .send()
            .map_err(|e| CoreError::Transport(format!("gnomAD query failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(CoreError::Transport(format!(
                "gnomAD source returned status {}",
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| CoreError::Transport(format!("gnomAD returned invalid JSON: {}", e)))
    }
}
