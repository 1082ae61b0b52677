//! Client for the ClinGen allele registry.

use crate::error::CoreError;

/// Blocking client resolving ClinGen allele ids (CAIDs) to ClinVar allele
/// ids.
pub trait ClinGenClient: Send + Sync {
    /// The ClinVar allele id associated with a CAID, or `None` when the
    /// registry has no ClinVar cross-reference.
    fn get_associated_clinvar_allele_id(&self, caid: &str) -> Result<Option<String>, CoreError>;
}

/// HTTP implementation against the allele registry.
pub struct HttpClinGenClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpClinGenClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl ClinGenClient for HttpClinGenClient {
    fn get_associated_clinvar_allele_id(&self, caid: &str) -> Result<Option<String>, CoreError> {
        let url = format!("{}/allele/{}", self.base_url, caid);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| CoreError::Transport(format!("ClinGen request failed: {}", e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CoreError::Transport(format!(
                "ClinGen returned status {} for {}",
                response.status(),
                caid
            )));
        }
        let payload: serde_json::Value = response
            .json()
            .map_err(|e| CoreError::Transport(format!("ClinGen returned invalid JSON: {}", e)))?;
        Ok(payload
            .pointer("/externalRecords/ClinVarAlleles/0/alleleId")
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }))
    }
}
