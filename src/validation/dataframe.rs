//! Validation and standardization of uploaded score and count tables.

use indexmap::IndexMap;
use itertools::Itertools;

use crate::error::ValidationError;
use crate::tabular::{ColumnType, Table};
use crate::validation::hgvs::{
    HgvsVariant, MaveHgvsError, NT_PREFIXES, PRO_PREFIXES, SPLICE_PREFIXES,
};
use crate::validation::target::{translate_dna, SequenceType};

pub const HGVS_NT_COLUMN: &str = "hgvs_nt";
pub const HGVS_SPLICE_COLUMN: &str = "hgvs_splice";
pub const HGVS_PRO_COLUMN: &str = "hgvs_pro";
pub const REQUIRED_SCORE_COLUMN: &str = "score";

/// Standard column names in their canonical order.
pub const STANDARD_COLUMNS: [&str; 4] = [
    HGVS_NT_COLUMN,
    HGVS_SPLICE_COLUMN,
    HGVS_PRO_COLUMN,
    REQUIRED_SCORE_COLUMN,
];

const HGVS_COLUMNS: [&str; 3] = [HGVS_NT_COLUMN, HGVS_SPLICE_COLUMN, HGVS_PRO_COLUMN];

/// Which dataset of a submission a table represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DatasetKind {
    Scores,
    Counts,
}

/// The target sequence a dataset is validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSeqInfo {
    pub sequence: String,
    pub sequence_type: SequenceType,
}

/// Declared dataset columns and per-column metadata persisted on the score
/// set after validation.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatasetColumns {
    pub score_columns: Vec<String>,
    pub count_columns: Vec<String>,
    #[serde(default)]
    pub score_columns_metadata: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub count_columns_metadata: IndexMap<String, serde_json::Value>,
}

/// Result of the full validation pipeline over a scores/counts pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDatasets {
    pub scores: Table,
    pub counts: Option<Table>,
    pub dataset_columns: DatasetColumns,
    /// Name of the primary HGVS index column.
    pub index_column: String,
}

/// Standardize a table: lowercase the recognized standard column names,
/// preserve the case of all others, then sort columns canonically.
pub fn standardize_table(table: &Table) -> Table {
    let mut standardized = table.clone();
    let columns = standardized
        .columns()
        .iter()
        .map(|c| {
            if STANDARD_COLUMNS.contains(&c.to_ascii_lowercase().as_str()) {
                c.to_ascii_lowercase()
            } else {
                c.clone()
            }
        })
        .collect();
    standardized.set_columns(columns);
    sort_table_columns(&standardized)
}

/// Sort columns into the canonical order: `hgvs_nt`, `hgvs_splice`,
/// `hgvs_pro`, `score`, then all extras in their input order.
pub fn sort_table_columns(table: &Table) -> Table {
    let mut order: Vec<usize> = (0..table.n_cols()).collect();
    order.sort_by_key(|&i| {
        let name = table.columns()[i].to_ascii_lowercase();
        STANDARD_COLUMNS
            .iter()
            .position(|s| *s == name)
            .unwrap_or(STANDARD_COLUMNS.len() + i)
    });
    table.select(&order)
}

/// Validate column names for a scores or counts table.
pub fn validate_column_names(table: &Table, kind: DatasetKind) -> Result<(), ValidationError> {
    if table
        .columns()
        .iter()
        .any(|c| c.is_empty() || c.trim().is_empty())
    {
        return Err(ValidationError::new(
            "column names cannot be empty or whitespace",
        ));
    }

    let lowered: Vec<String> = table
        .columns()
        .iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();

    match kind {
        DatasetKind::Scores => {
            if !lowered.iter().any(|c| c == REQUIRED_SCORE_COLUMN) {
                return Err(ValidationError::new(format!(
                    "score data frame must have a '{}' column",
                    REQUIRED_SCORE_COLUMN
                )));
            }
        }
        DatasetKind::Counts => {
            if lowered.iter().any(|c| c == REQUIRED_SCORE_COLUMN) {
                return Err(ValidationError::new(format!(
                    "counts data frame must not have a '{}' column",
                    REQUIRED_SCORE_COLUMN
                )));
            }
        }
    }

    if lowered.iter().any(|c| c == HGVS_SPLICE_COLUMN)
        && (!lowered.iter().any(|c| c == HGVS_NT_COLUMN)
            || !lowered.iter().any(|c| c == HGVS_PRO_COLUMN))
    {
        return Err(ValidationError::new(format!(
            "data frames with '{}' must also define '{}' and '{}'",
            HGVS_SPLICE_COLUMN, HGVS_NT_COLUMN, HGVS_PRO_COLUMN
        )));
    }

    let mut seen = std::collections::HashSet::new();
    if !lowered.iter().all(|c| seen.insert(c.clone())) {
        return Err(ValidationError::new(
            "duplicate column names are not allowed (this check is case insensitive)",
        ));
    }

    if !lowered.iter().any(|c| HGVS_COLUMNS.contains(&c.as_str())) {
        return Err(ValidationError::new(
            "data frame does not define any variant columns",
        ));
    }

    if lowered.iter().all(|c| HGVS_COLUMNS.contains(&c.as_str())) {
        return Err(ValidationError::new(
            "data frame must include at least one data column beyond the variant columns",
        ));
    }

    Ok(())
}

/// Reject any fully-null row.
pub fn validate_no_null_rows(table: &Table) -> Result<(), ValidationError> {
    let null_rows = (0..table.n_rows())
        .filter(|&i| table.row_is_null(i))
        .count();
    if null_rows > 0 {
        return Err(ValidationError::new(format!(
            "found {} null rows in the data frame",
            null_rows
        )));
    }
    Ok(())
}

/// Reject non-HGVS columns that contain no data at all.
pub fn validate_no_null_data_columns(table: &Table) -> Result<(), ValidationError> {
    let null_columns: Vec<&str> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !HGVS_COLUMNS.contains(&name.to_ascii_lowercase().as_str()))
        .filter(|(i, _)| table.infer_column_type(*i) == ColumnType::Empty)
        .map(|(_, name)| name.as_str())
        .collect();
    if !null_columns.is_empty() {
        return Err(ValidationError::new(format!(
            "data columns contain no data: {}",
            null_columns.join(", ")
        )));
    }
    Ok(())
}

/// Find the index column: the first of `hgvs_nt`, `hgvs_splice`, `hgvs_pro`
/// that is present and not entirely null.
pub fn choose_index_column(table: &Table) -> Result<usize, ValidationError> {
    for name in HGVS_COLUMNS {
        if let Some(i) = table.column_index(name) {
            if table.infer_column_type(i) != ColumnType::Empty {
                return Ok(i);
            }
        }
    }
    Err(ValidationError::new(
        "cannot validate data frame with no variant columns",
    ))
}

/// The allowed prefixes for a recognized HGVS column name.
fn allowed_prefixes(column_name: &str) -> Result<&'static [char], ValidationError> {
    match column_name.to_ascii_lowercase().as_str() {
        HGVS_NT_COLUMN => Ok(NT_PREFIXES),
        HGVS_SPLICE_COLUMN => Ok(SPLICE_PREFIXES),
        HGVS_PRO_COLUMN => Ok(PRO_PREFIXES),
        other => Err(ValidationError::new(format!(
            "unrecognized hgvs column name '{}'",
            other
        ))),
    }
}

/// Validate one HGVS column: prefix consistency, index constraints, and
/// per-variant grammar/target checks.
///
/// Splice variants are never validated against the target sequence; protein
/// variants validate against the translated target when the target is DNA.
/// Returns the column's shared prefix character.
pub fn validate_hgvs_column(
    table: &Table,
    col: usize,
    is_index: bool,
    target: Option<&TargetSeqInfo>,
) -> Result<Option<char>, ValidationError> {
    let name = table.columns()[col].clone();
    let lowered = name.to_ascii_lowercase();

    if matches!(
        table.infer_column_type(col),
        ColumnType::Numeric | ColumnType::Mixed
    ) {
        return Err(ValidationError::new(format!(
            "variant column '{}' cannot contain numeric data",
            name
        )));
    }

    if is_index {
        if table.column_values(col).any(|v| v.is_none()) {
            return Err(ValidationError::new(format!(
                "primary variant column '{}' cannot contain null values",
                name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        if !table.column_values(col).flatten().all(|v| seen.insert(v)) {
            return Err(ValidationError::new(format!(
                "primary variant column '{}' must contain unique values",
                name
            )));
        }
    }

    // Prefix consistency across the column, then against the allowed set.
    let allowed = allowed_prefixes(&lowered)?;
    let prefixes: std::collections::BTreeSet<char> = table
        .column_values(col)
        .flatten()
        .filter_map(|v| v.chars().next())
        .collect();
    if prefixes.len() > 1 {
        return Err(ValidationError::new(format!(
            "variant column '{}' has inconsistent variant prefixes",
            name
        )));
    }
    let prefix = prefixes.iter().next().copied();
    let has_valid_prefix = |v: &str| {
        let mut chars = v.chars();
        matches!((chars.next(), chars.next()), (Some(first), Some('.')) if allowed.contains(&first))
    };
    if table.column_values(col).flatten().any(|v| !has_valid_prefix(v)) {
        return Err(ValidationError::new(format!(
            "variant column '{}' has invalid variant prefixes",
            name
        )));
    }

    // Resolve the sequence the individual variants are checked against.
    let check_sequence = match (lowered.as_str(), target) {
        (_, None) | (HGVS_SPLICE_COLUMN, _) => None,
        (HGVS_NT_COLUMN, Some(info)) => {
            if info.sequence_type != SequenceType::Dna {
                return Err(ValidationError::new(format!(
                    "invalid target sequence type for '{}'",
                    name
                )));
            }
            Some(info.sequence.clone())
        }
        (HGVS_PRO_COLUMN, Some(info)) => Some(if info.sequence_type == SequenceType::Dna {
            translate_dna(&info.sequence)?
        } else {
            info.sequence.clone()
        }),
        _ => None,
    };

    let mut invalid_variants = Vec::new();
    for (i, value) in table.column_values(col).enumerate() {
        let Some(value) = value else { continue };
        let result = match &check_sequence {
            Some(sequence) => HgvsVariant::parse_with_target(value, sequence).map(|_| ()),
            None => HgvsVariant::parse(value).map(|_| ()),
        };
        match result {
            Ok(()) => {}
            Err(MaveHgvsError::Parse(_)) => {
                invalid_variants.push(format!("invalid variant string '{}' at row {}", value, i));
            }
            Err(MaveHgvsError::TargetMismatch(_)) => {
                invalid_variants.push(format!(
                    "target sequence mismatch for '{}' at row {}",
                    value, i
                ));
            }
        }
    }

    if !invalid_variants.is_empty() {
        return Err(ValidationError::with_triggers(
            format!(
                "encountered {} invalid variant strings: {}",
                invalid_variants.len(),
                invalid_variants.join(", ")
            ),
            invalid_variants,
        ));
    }

    Ok(prefix)
}

/// Validate the combination of HGVS column prefixes.
///
/// Assumes per-column prefix consistency has already been checked.
pub fn validate_hgvs_prefix_combinations(
    nt: Option<char>,
    splice: Option<char>,
    pro: Option<char>,
) -> Result<(), ValidationError> {
    if let Some(c) = nt {
        if !NT_PREFIXES.contains(&c) {
            return Err(ValidationError::new("invalid nucleotide prefix"));
        }
    }
    if let Some(c) = splice {
        if !SPLICE_PREFIXES.contains(&c) {
            return Err(ValidationError::new("invalid splice prefix"));
        }
    }
    if let Some(c) = pro {
        if !PRO_PREFIXES.contains(&c) {
            return Err(ValidationError::new("invalid protein prefix"));
        }
    }

    if let Some(splice) = splice {
        if !matches!(nt, Some('g') | Some('m') | Some('o')) {
            return Err(ValidationError::new(
                "nucleotide variants must use a genomic prefix when splice variants are present",
            ));
        }
        if pro.is_some() {
            if splice != 'c' {
                return Err(ValidationError::new(
                    "splice variants must use the 'c.' prefix when protein variants are present",
                ));
            }
        } else if splice != 'n' {
            return Err(ValidationError::new(
                "splice variants must use the 'n.' prefix when protein variants are not present",
            ));
        }
    } else if pro.is_some() && nt.is_some() {
        if nt != Some('c') {
            return Err(ValidationError::new(
                "nucleotide variants must use the 'c.' prefix when protein variants are present \
                 and splice variants are not present",
            ));
        }
    } else if let Some(nt) = nt {
        if nt != 'n' {
            return Err(ValidationError::new(
                "nucleotide variants must use the 'n.' prefix when only nucleotide variants are \
                 defined",
            ));
        }
    }

    Ok(())
}

/// Validate the data columns: the declared score column must contain only
/// numeric values.
pub fn validate_data_columns(table: &Table) -> Result<(), ValidationError> {
    if let Some(i) = table.column_index(REQUIRED_SCORE_COLUMN) {
        if table.infer_column_type(i) != ColumnType::Numeric {
            return Err(ValidationError::new(format!(
                "column '{}' must contain numeric values",
                REQUIRED_SCORE_COLUMN
            )));
        }
    }
    Ok(())
}

/// Check that scores and counts define the same variants in every shared
/// HGVS column (order-independent).
pub fn validate_variant_column_agreement(
    scores: &Table,
    counts: &Table,
) -> Result<(), ValidationError> {
    for name in HGVS_COLUMNS {
        let (Some(s), Some(c)) = (scores.column_index(name), counts.column_index(name)) else {
            continue;
        };
        let score_values: Vec<Option<&str>> = scores.column_values(s).sorted().collect();
        let count_values: Vec<Option<&str>> = counts.column_values(c).sorted().collect();
        if score_values != count_values {
            return Err(ValidationError::new(
                "your score and counts files do not define the same variants; check that the \
                 hgvs columns in both files match",
            ));
        }
    }
    Ok(())
}

/// Names of the non-HGVS (data) columns of a table, in order.
pub fn columns_for_dataset(table: &Table) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|c| !HGVS_COLUMNS.contains(&c.to_ascii_lowercase().as_str()))
        .cloned()
        .collect()
}

/// Run the full validation pipeline over a scores table and an optional
/// counts table, returning standardized tables plus dataset column metadata.
pub fn validate_and_standardize_dataframe_pair(
    scores: &Table,
    counts: Option<&Table>,
    score_columns_metadata: Option<IndexMap<String, serde_json::Value>>,
    count_columns_metadata: Option<IndexMap<String, serde_json::Value>>,
    target: Option<&TargetSeqInfo>,
) -> Result<ValidatedDatasets, ValidationError> {
    if scores.is_empty() {
        return Err(ValidationError::new("scores data frame must not be empty"));
    }

    let scores = standardize_table(scores);
    validate_column_names(&scores, DatasetKind::Scores)?;
    validate_no_null_rows(&scores)?;
    validate_no_null_data_columns(&scores)?;
    validate_table_variants(&scores, target)?;
    validate_data_columns(&scores)?;

    let counts = counts
        .map(|counts| -> Result<Table, ValidationError> {
            let counts = standardize_table(counts);
            validate_column_names(&counts, DatasetKind::Counts)?;
            validate_no_null_rows(&counts)?;
            validate_no_null_data_columns(&counts)?;
            validate_table_variants(&counts, target)?;
            validate_variant_column_agreement(&scores, &counts)?;
            Ok(counts)
        })
        .transpose()?;

    let index_column = scores.columns()[choose_index_column(&scores)?].clone();
    let dataset_columns = DatasetColumns {
        score_columns: columns_for_dataset(&scores),
        count_columns: counts.as_ref().map(columns_for_dataset).unwrap_or_default(),
        score_columns_metadata: score_columns_metadata.unwrap_or_default(),
        count_columns_metadata: count_columns_metadata.unwrap_or_default(),
    };

    Ok(ValidatedDatasets {
        scores,
        counts,
        dataset_columns,
        index_column,
    })
}

/// Validate all HGVS columns of a standardized table, including the prefix
/// combination rule.
fn validate_table_variants(
    table: &Table,
    target: Option<&TargetSeqInfo>,
) -> Result<(), ValidationError> {
    let index = choose_index_column(table)?;

    let mut prefixes: IndexMap<&str, Option<char>> = IndexMap::new();
    for name in HGVS_COLUMNS {
        let Some(col) = table.column_index(name) else {
            continue;
        };
        if table.infer_column_type(col) == ColumnType::Empty {
            prefixes.insert(name, None);
            continue;
        }
        let prefix = validate_hgvs_column(table, col, col == index, target)?;
        prefixes.insert(name, prefix);
    }

    validate_hgvs_prefix_combinations(
        prefixes.get(HGVS_NT_COLUMN).copied().flatten(),
        prefixes.get(HGVS_SPLICE_COLUMN).copied().flatten(),
        prefixes.get(HGVS_PRO_COLUMN).copied().flatten(),
    )
}
