//! Publication identifier format validation and URL inference.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// Publication databases accepted for identifier resolution.
pub const VALID_DB_NAMES: &[&str] = &["PubMed", "bioRxiv", "medRxiv", "Crossref"];

/// Preprint servers switched to date-based identifiers on this date.
const PREPRINT_CHANGEOVER: (i32, u32, u32) = (2019, 12, 11);

static PMID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[1-9]\d*$").unwrap());
static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/[-._;()/:A-Za-z0-9]+$").unwrap());

/// Validate a publication database name.
pub fn validate_db_name(db_name: &str) -> Result<(), ValidationError> {
    if db_name.trim().is_empty() {
        return Err(ValidationError::new("db_name should not be empty"));
    }
    if !VALID_DB_NAMES.contains(&db_name) {
        return Err(ValidationError::new(format!(
            "the db_name of a publication identifier should take one of the following values: \
             {}",
            VALID_DB_NAMES.join(", ")
        )));
    }
    Ok(())
}

/// Whether a string is a PubMed identifier: an integer with no leading zeros.
pub fn validate_pubmed(identifier: &str) -> bool {
    PMID_RE.is_match(identifier)
}

/// Whether a string is a bioRxiv identifier: a 6-digit legacy id, or a
/// date-based id with a 6-digit suffix after the changeover date.
pub fn validate_biorxiv(identifier: &str) -> bool {
    validate_preprint(identifier, 6)
}

/// Whether a string is a medRxiv identifier: as bioRxiv but with an 8-digit
/// suffix.
pub fn validate_medrxiv(identifier: &str) -> bool {
    validate_preprint(identifier, 8)
}

fn validate_preprint(identifier: &str, suffix_len: usize) -> bool {
    if identifier.contains('.') {
        return validate_new_preprint_format(identifier, suffix_len);
    }
    identifier.len() == suffix_len && identifier.bytes().all(|b| b.is_ascii_digit())
}

fn validate_new_preprint_format(identifier: &str, suffix_len: usize) -> bool {
    let parts: Vec<&str> = identifier.split('.').collect();
    let Some((suffix, date_parts)) = parts.split_last() else {
        return false;
    };
    if suffix.len() != suffix_len || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if date_parts.len() != 3 {
        return false;
    }
    let Ok([year, month, day]) = <[&str; 3]>::try_from(date_parts) else {
        return false;
    };
    let Some(date) = year
        .parse()
        .ok()
        .zip(month.parse().ok())
        .zip(day.parse().ok())
        .and_then(|((y, m), d)| chrono::NaiveDate::from_ymd_opt(y, m, d))
    else {
        return false;
    };
    let (cy, cm, cd) = PREPRINT_CHANGEOVER;
    date > chrono::NaiveDate::from_ymd_opt(cy, cm, cd).expect("valid changeover date")
}

/// Whether a string is a DOI per the standard DOI pattern.
pub fn is_doi(identifier: &str) -> bool {
    DOI_RE.is_match(identifier)
}

/// Strip a `doi:` scheme prefix and surrounding whitespace.
pub fn normalize_doi(identifier: &str) -> String {
    let trimmed = identifier.trim();
    trimmed
        .strip_prefix("doi:")
        .or_else(|| trimmed.strip_prefix("DOI:"))
        .unwrap_or(trimmed)
        .trim()
        .to_owned()
}

/// The databases for which an identifier is format-valid.
pub fn identifier_valid_for(identifier: &str) -> indexmap::IndexMap<&'static str, bool> {
    indexmap::IndexMap::from([
        ("PubMed", validate_pubmed(identifier)),
        ("bioRxiv", validate_biorxiv(identifier)),
        ("medRxiv", validate_medrxiv(identifier)),
        ("Crossref", is_doi(identifier)),
    ])
}

/// Whether an identifier is acceptable for any accepted database.
pub fn validate_publication(identifier: &str) -> Result<(), ValidationError> {
    if identifier_valid_for(identifier).values().any(|v| *v) {
        Ok(())
    } else {
        Err(ValidationError::new(format!(
            "'{}' is not a valid DOI or a valid PubMed, bioRxiv, or medRxiv identifier",
            identifier
        )))
    }
}

/// Recognize URLs from accepted databases and strip them to the bare
/// identifier; anything else is returned unchanged.
pub fn infer_identifier_from_url(identifier: &str) -> String {
    let Ok(url) = reqwest::Url::parse(identifier) else {
        return identifier.to_owned();
    };
    let Some(host) = url.host_str() else {
        return identifier.to_owned();
    };
    let path = url.path().trim_matches('/');

    if host.contains("dx.doi.org") {
        path.to_owned()
    } else if host.contains("biorxiv.org") || host.contains("medrxiv.org") {
        path.rsplit('/').next().unwrap_or(path).to_owned()
    } else if host.contains("ncbi.nlm.nih.gov") {
        path.rsplit('/').next().unwrap_or(path).to_owned()
    } else {
        identifier.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("24567513", true)]
    #[case("1", true)]
    #[case("0123", false)] // no leading zeros
    #[case("12a4", false)]
    #[case("", false)]
    fn pubmed_format(#[case] identifier: &str, #[case] expected: bool) {
        assert_eq!(expected, validate_pubmed(identifier));
    }

    #[rstest::rstest]
    #[case("123456", true)] // legacy 6-digit
    #[case("2024.04.26.591310", true)]
    #[case("2019.12.11.123456", false)] // on the changeover date, not after
    #[case("2019.12.12.123456", true)]
    #[case("12345678", false)] // 8 digits is medRxiv
    #[case("2024.04.26.59131023", false)] // 8-digit suffix is medRxiv
    #[case("2024.13.01.123456", false)] // invalid month
    #[case("2024.04.591310", false)] // missing date part
    #[case("cvfg", false)]
    fn biorxiv_format(#[case] identifier: &str, #[case] expected: bool) {
        assert_eq!(expected, validate_biorxiv(identifier));
    }

    #[rstest::rstest]
    #[case("12345678", true)]
    #[case("2024.04.26.59131023", true)]
    #[case("123456", false)]
    #[case("2024.04.26.591310", false)]
    fn medrxiv_format(#[case] identifier: &str, #[case] expected: bool) {
        assert_eq!(expected, validate_medrxiv(identifier));
    }

    #[rstest::rstest]
    #[case("10.1101/2024.04.26.591310", true)]
    #[case("10.1038/s41586-020-2308-7", true)]
    #[case("not-a-doi", false)]
    #[case("10.x/abc", false)]
    fn doi_format(#[case] identifier: &str, #[case] expected: bool) {
        assert_eq!(expected, is_doi(identifier));
    }

    #[test]
    fn doi_normalization() {
        assert_eq!("10.1/abc", normalize_doi(" doi:10.1/abc "));
        assert_eq!("10.1/abc", normalize_doi("10.1/abc"));
    }

    #[rstest::rstest]
    #[case("http://www.dx.doi.org/10.1101/2024.04.26.591310", "10.1101/2024.04.26.591310")]
    #[case(
        "https://www.biorxiv.org/content/10.1101/2024.04.26.591310",
        "2024.04.26.591310"
    )]
    #[case(
        "https://www.medrxiv.org/content/10.1101/2024.04.26.59131023",
        "2024.04.26.59131023"
    )]
    #[case("https://pubmed.ncbi.nlm.nih.gov/24567513/", "24567513")]
    #[case("http://www.ncbi.nlm.nih.gov/pubmed/432", "432")]
    #[case("https://example.org/123", "https://example.org/123")]
    #[case("24567513", "24567513")]
    fn url_inference(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(expected, infer_identifier_from_url(input));
    }

    #[test]
    fn ambiguous_identifier_is_valid_for_multiple_dbs() {
        // An 8-digit number is both a plausible PMID and a legacy medRxiv id.
        let valid = identifier_valid_for("12345678");
        assert!(valid["PubMed"]);
        assert!(valid["medRxiv"]);
        assert!(!valid["bioRxiv"]);
        assert!(!valid["Crossref"]);
    }

    #[test]
    fn db_name_validation() {
        assert!(validate_db_name("PubMed").is_ok());
        assert!(validate_db_name("").is_err());
        assert!(validate_db_name("Scopus").is_err());
    }

    #[test]
    fn sentinel_non_pmid_is_invalid_everywhere() {
        assert!(validate_publication("cvfg").is_err());
    }
}
