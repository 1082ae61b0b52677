//! Score set helpers: variant record construction from validated tables and
//! the CSV download surface.

use indexmap::IndexMap;

use crate::common::today;
use crate::error::{CoreError, ValidationError};
use crate::store::models::{Variant, VariantData};
use crate::store::StoreData;
use crate::tabular::{is_null_token, parse_numeric, ColumnType, Table};
use crate::validation::dataframe::{
    HGVS_NT_COLUMN, HGVS_PRO_COLUMN, HGVS_SPLICE_COLUMN,
};

/// Fixed leading columns of every scores/counts download.
pub const CSV_ACCESSION_COLUMNS: [&str; 4] =
    ["accession", HGVS_NT_COLUMN, HGVS_SPLICE_COLUMN, HGVS_PRO_COLUMN];

/// Which JSON payload of a variant a download renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvDataKind {
    ScoreData,
    CountData,
}

/// A variant record ready for insertion, minus its URN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantInput {
    pub hgvs_nt: Option<String>,
    pub hgvs_splice: Option<String>,
    pub hgvs_pro: Option<String>,
    pub data: VariantData,
}

/// Convert a cell to the JSON value stored in the variant payload: numbers
/// for numeric columns, strings otherwise, null for nulls.
fn cell_to_json(value: Option<&str>, numeric: bool) -> serde_json::Value {
    match value {
        None => serde_json::Value::Null,
        Some(v) if numeric => parse_numeric(v)
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(v) => serde_json::Value::String(v.to_owned()),
    }
}

/// Build per-row variant records from validated, standardized tables.
///
/// Assumes the pair has passed the full validation pipeline: the index
/// column is complete/unique and the counts table (if any) defines the same
/// variants.
pub fn create_variants_data(
    scores: &Table,
    counts: Option<&Table>,
    index_column: &str,
) -> Result<Vec<VariantInput>, ValidationError> {
    let index = scores.column_index(index_column).ok_or_else(|| {
        ValidationError::new(format!("index column '{}' not found", index_column))
    })?;

    // Per-column numeric-ness drives JSON coercion.
    let score_numeric: Vec<bool> = (0..scores.n_cols())
        .map(|i| scores.infer_column_type(i) == ColumnType::Numeric)
        .collect();

    let counts_by_index: IndexMap<&str, usize> = match counts {
        Some(counts) => {
            let counts_index = counts.column_index(index_column).ok_or_else(|| {
                ValidationError::new(format!(
                    "index column '{}' not found in counts",
                    index_column
                ))
            })?;
            counts
                .column_values(counts_index)
                .enumerate()
                .filter_map(|(row, value)| value.map(|v| (v, row)))
                .collect()
        }
        None => IndexMap::new(),
    };
    let count_numeric: Vec<bool> = counts
        .map(|counts| {
            (0..counts.n_cols())
                .map(|i| counts.infer_column_type(i) == ColumnType::Numeric)
                .collect()
        })
        .unwrap_or_default();

    let hgvs_value = |table: &Table, row: usize, name: &str| -> Option<String> {
        table
            .column_index(name)
            .and_then(|col| table.value(row, col))
            .filter(|v| !is_null_token(v))
            .map(str::to_owned)
    };

    let mut variants = Vec::with_capacity(scores.n_rows());
    for row in 0..scores.n_rows() {
        let mut score_data = serde_json::Map::new();
        for (col, name) in scores.columns().iter().enumerate() {
            if [HGVS_NT_COLUMN, HGVS_SPLICE_COLUMN, HGVS_PRO_COLUMN]
                .contains(&name.to_ascii_lowercase().as_str())
            {
                continue;
            }
            score_data.insert(
                name.clone(),
                cell_to_json(scores.value(row, col), score_numeric[col]),
            );
        }

        let mut count_data = serde_json::Map::new();
        if let Some(counts) = counts {
            let index_value = scores.value(row, index).ok_or_else(|| {
                ValidationError::new(format!("index column contains a null at row {}", row))
            })?;
            let count_row = *counts_by_index.get(index_value).ok_or_else(|| {
                ValidationError::new(format!(
                    "counts table is missing variant '{}'",
                    index_value
                ))
            })?;
            for (col, name) in counts.columns().iter().enumerate() {
                if [HGVS_NT_COLUMN, HGVS_SPLICE_COLUMN, HGVS_PRO_COLUMN]
                    .contains(&name.to_ascii_lowercase().as_str())
                {
                    continue;
                }
                count_data.insert(
                    name.clone(),
                    cell_to_json(counts.value(count_row, col), count_numeric[col]),
                );
            }
        }

        variants.push(VariantInput {
            hgvs_nt: hgvs_value(scores, row, HGVS_NT_COLUMN),
            hgvs_splice: hgvs_value(scores, row, HGVS_SPLICE_COLUMN),
            hgvs_pro: hgvs_value(scores, row, HGVS_PRO_COLUMN),
            data: VariantData {
                score_data,
                count_data,
            },
        });
    }

    Ok(variants)
}

/// Assign temporary child URNs `<score_set_urn>#<n>` for `n` new variants,
/// updating the score set's variant counter.
pub fn bulk_create_urns(
    data: &mut StoreData,
    score_set_id: i64,
    n: usize,
    reset_counter: bool,
) -> Result<Vec<String>, CoreError> {
    let score_set = data.score_set_mut(score_set_id)?;
    let start = if reset_counter {
        0
    } else {
        score_set.num_variants
    };
    let urns = (0..n)
        .map(|i| format!("{}#{}", score_set.urn, start + i as i64 + 1))
        .collect();
    score_set.num_variants = start + n as i64;
    Ok(urns)
}

/// Create variant rows for a score set from prepared inputs; returns the
/// number created.
pub fn create_variants(
    data: &mut StoreData,
    score_set_id: i64,
    variants_data: Vec<VariantInput>,
) -> Result<usize, CoreError> {
    let urns = bulk_create_urns(data, score_set_id, variants_data.len(), true)?;
    let variants = urns
        .into_iter()
        .zip(variants_data)
        .map(|(urn, input)| Variant {
            id: 0,
            urn,
            score_set_id,
            hgvs_nt: input.hgvs_nt,
            hgvs_splice: input.hgvs_splice,
            hgvs_pro: input.hgvs_pro,
            data: input.data,
            creation_date: today(),
            modification_date: today(),
        })
        .collect();
    let ids = data.insert_variants(variants)?;
    Ok(ids.len())
}

fn json_to_csv_value(value: Option<&serde_json::Value>, na_rep: &str) -> String {
    let rendered = match value {
        None | Some(serde_json::Value::Null) => return na_rep.to_owned(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if is_null_token(&rendered) {
        na_rep.to_owned()
    } else {
        rendered
    }
}

/// Format one variant into a row over the requested columns.
pub fn variant_to_csv_row(
    variant: &Variant,
    columns: &[String],
    kind: CsvDataKind,
    na_rep: &str,
) -> IndexMap<String, String> {
    let payload = match kind {
        CsvDataKind::ScoreData => &variant.data.score_data,
        CsvDataKind::CountData => &variant.data.count_data,
    };
    let mut row = IndexMap::with_capacity(columns.len());
    for column in columns {
        let value = match column.as_str() {
            "accession" => variant.urn.clone(),
            HGVS_NT_COLUMN => variant.hgvs_nt.clone().unwrap_or_else(|| na_rep.to_owned()),
            HGVS_SPLICE_COLUMN => variant
                .hgvs_splice
                .clone()
                .unwrap_or_else(|| na_rep.to_owned()),
            HGVS_PRO_COLUMN => variant.hgvs_pro.clone().unwrap_or_else(|| na_rep.to_owned()),
            other => json_to_csv_value(payload.get(other), na_rep),
        };
        row.insert(column.clone(), value);
    }
    row
}

/// Lazily format variants into CSV rows; the writer consumes one pass.
pub fn variants_to_csv_rows<'a>(
    variants: &'a [&'a Variant],
    columns: &'a [String],
    kind: CsvDataKind,
    na_rep: &'a str,
) -> impl Iterator<Item = IndexMap<String, String>> + 'a {
    variants
        .iter()
        .map(move |v| variant_to_csv_row(v, columns, kind, na_rep))
}

/// Drop HGVS columns that are entirely null across the rendered rows.
pub fn drop_na_columns_from_csv_rows(
    rows: Vec<IndexMap<String, String>>,
    columns: Vec<String>,
) -> (Vec<IndexMap<String, String>>, Vec<String>) {
    let mut rows = rows;
    let to_remove: Vec<String> = [HGVS_NT_COLUMN, HGVS_SPLICE_COLUMN, HGVS_PRO_COLUMN]
        .iter()
        .filter(|name| {
            rows.iter().all(|row| {
                row.get(**name)
                    .map(|v| is_null_token(v) || v == "NA")
                    .unwrap_or(true)
            })
        })
        .map(|name| (*name).to_owned())
        .collect();

    for row in &mut rows {
        for name in &to_remove {
            row.shift_remove(name);
        }
    }
    let columns = columns
        .into_iter()
        .filter(|c| !to_remove.contains(c))
        .collect();
    (rows, columns)
}

fn render_csv(
    data: &StoreData,
    score_set_id: i64,
    data_columns: Vec<String>,
    kind: CsvDataKind,
    start: Option<usize>,
    limit: Option<usize>,
    drop_na_columns: bool,
) -> Result<String, CoreError> {
    let columns: Vec<String> = CSV_ACCESSION_COLUMNS
        .iter()
        .map(|c| (*c).to_owned())
        .chain(data_columns)
        .collect();

    // Rows are ordered by the numeric URN suffix.
    let mut variants = data.variants_for_score_set(score_set_id);
    variants.sort_by_key(|v| v.urn_suffix().unwrap_or(u64::MAX));
    let variants: Vec<&Variant> = variants
        .into_iter()
        .skip(start.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    let mut rows: Vec<IndexMap<String, String>> =
        variants_to_csv_rows(&variants, &columns, kind, "NA").collect();
    let mut columns = columns;
    if drop_na_columns {
        (rows, columns) = drop_na_columns_from_csv_rows(rows, columns);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&columns)
        .map_err(|e| CoreError::Internal(format!("CSV write failed: {}", e)))?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| row[c].as_str()))
            .map_err(|e| CoreError::Internal(format!("CSV write failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CoreError::Internal(format!("CSV write failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| CoreError::Internal(format!("CSV is not UTF-8: {}", e)))
}

/// Render a score set's variants and declared score columns as CSV.
pub fn get_score_set_scores_as_csv(
    data: &StoreData,
    score_set_id: i64,
    start: Option<usize>,
    limit: Option<usize>,
    drop_na_columns: bool,
) -> Result<String, CoreError> {
    let score_columns = data.score_set(score_set_id)?.dataset_columns.score_columns.clone();
    render_csv(
        data,
        score_set_id,
        score_columns,
        CsvDataKind::ScoreData,
        start,
        limit,
        drop_na_columns,
    )
}

/// Render a score set's variants and declared count columns as CSV.
pub fn get_score_set_counts_as_csv(
    data: &StoreData,
    score_set_id: i64,
    start: Option<usize>,
    limit: Option<usize>,
    drop_na_columns: bool,
) -> Result<String, CoreError> {
    let count_columns = data.score_set(score_set_id)?.dataset_columns.count_columns.clone();
    render_csv(
        data,
        score_set_id,
        count_columns,
        CsvDataKind::CountData,
        start,
        limit,
        drop_na_columns,
    )
}
