//! Client for the ClinVar variant_summary archive, plus TSV parsing.

use std::io::Read;

use indexmap::IndexMap;

use crate::error::CoreError;

/// Default archive location.
pub const CLINVAR_ARCHIVE_BASE_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/pub/clinvar/tab_delimited/archive";

/// Blocking client downloading the archived variant_summary TSV for one
/// month.
pub trait ClinVarArchiveClient: Send + Sync {
    /// Fetch the gzip-compressed TSV bytes for `(year, month)`.
    fn fetch_variant_summary(&self, year: i32, month: u32) -> Result<Vec<u8>, CoreError>;
}

/// HTTP implementation against the NCBI FTP mirror.
pub struct HttpClinVarArchiveClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpClinVarArchiveClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl ClinVarArchiveClient for HttpClinVarArchiveClient {
    fn fetch_variant_summary(&self, year: i32, month: u32) -> Result<Vec<u8>, CoreError> {
        let url = format!(
            "{}/variant_summary_{:02}_{}.txt.gz",
            self.base_url, month, year
        );
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| CoreError::Transport(format!("ClinVar archive request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(CoreError::Transport(format!(
                "ClinVar archive returned status {} for {}",
                response.status(),
                url
            )));
        }
        let mut bytes = Vec::new();
        let mut response = response;
        response
            .read_to_end(&mut bytes)
            .map_err(|e| CoreError::Transport(format!("ClinVar archive read failed: {}", e)))?;
        Ok(bytes)
    }
}

/// One parsed variant_summary row, keyed in the parse result by its ClinVar
/// allele id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClinVarSummaryRecord {
    pub allele_id: String,
    pub variation_id: String,
    pub clinical_significance: String,
    pub review_status: String,
    pub gene_symbol: String,
}

impl ClinVarSummaryRecord {
    /// The VCV accession for this record's variation id.
    pub fn vcv_accession(&self) -> String {
        match self.variation_id.parse::<u64>() {
            Ok(n) => format!("VCV{:09}", n),
            Err(_) => self.variation_id.clone(),
        }
    }
}

/// Parse a gzip-compressed variant_summary TSV into records keyed by allele
/// id. The header row begins with `#`.
pub fn parse_variant_summary(
    gzip_bytes: &[u8],
) -> Result<IndexMap<String, ClinVarSummaryRecord>, CoreError> {
    let mut decoder = flate2::read::GzDecoder::new(gzip_bytes);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| CoreError::Internal(format!("ClinVar TSV decompression failed: {}", e)))?;
    parse_variant_summary_text(&text)
}

fn parse_variant_summary_text(
    text: &str,
) -> Result<IndexMap<String, ClinVarSummaryRecord>, CoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| CoreError::Internal(format!("ClinVar TSV header parse failed: {}", e)))?;
    let column = |name: &str| -> Option<usize> {
        headers
            .iter()
            .position(|h| h.trim_start_matches('#') == name)
    };
    let (Some(allele_id), Some(variation_id), Some(significance), Some(review), Some(gene)) = (
        column("AlleleID"),
        column("VariationID"),
        column("ClinicalSignificance"),
        column("ReviewStatus"),
        column("GeneSymbol"),
    ) else {
        return Err(CoreError::Internal(
            "ClinVar TSV is missing expected columns".to_owned(),
        ));
    };

    let mut records = IndexMap::new();
    for row in reader.records() {
        let row =
            row.map_err(|e| CoreError::Internal(format!("ClinVar TSV row parse failed: {}", e)))?;
        let field = |i: usize| row.get(i).unwrap_or_default().to_owned();
        let record = ClinVarSummaryRecord {
            allele_id: field(allele_id),
            variation_id: field(variation_id),
            clinical_significance: field(significance),
            review_status: field(review),
            gene_symbol: field(gene),
        };
        if !record.allele_id.is_empty() {
            // The TSV repeats alleles per assembly; the first row wins.
            records.entry(record.allele_id.clone()).or_insert(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    pub(crate) const SUMMARY_TSV: &str = "\
#AlleleID\tType\tName\tGeneID\tGeneSymbol\tClinicalSignificance\tReviewStatus\tVariationID\n\
15041\tsingle nucleotide variant\tNM_000:c.1A>G\t9907\tTP53\tPathogenic\tcriteria provided, single submitter\t12345\n\
15041\tsingle nucleotide variant\tNM_000:c.1A>G\t9907\tTP53\tPathogenic\tcriteria provided, single submitter\t12345\n\
15042\tsingle nucleotide variant\tNM_000:c.2C>T\t9907\tTP53\tBenign\treviewed by expert panel\t67\n";

    pub(crate) fn gzipped_summary() -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(SUMMARY_TSV.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn parses_gzip_tsv_keyed_by_allele_id() {
        let records = parse_variant_summary(&gzipped_summary()).unwrap();
        assert_eq!(2, records.len());
        let record = &records["15041"];
        assert_eq!("Pathogenic", record.clinical_significance);
        assert_eq!("criteria provided, single submitter", record.review_status);
        assert_eq!("TP53", record.gene_symbol);
        assert_eq!("VCV000012345", record.vcv_accession());
        assert_eq!("VCV000000067", records["15042"].vcv_accession());
    }

    #[test]
    fn missing_columns_are_an_error() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"#AlleleID\tType\n1\tx\n").unwrap();
        let bytes = encoder.finish().unwrap();
        assert!(parse_variant_summary(&bytes).is_err());
    }
}
