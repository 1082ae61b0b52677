//! Owned tabular data model for uploaded score and count files.
//!
//! Uploaded datasets are small enough to hold in memory; this module provides
//! an ordered-column table with the CSV dialect and null-token handling used
//! for submissions (comma separated, UTF-8, single-quote quoting, header row
//! required).

use std::io::Read;

use crate::error::ValidationError;

/// Strings treated as null during ingestion (case-insensitive); pure
/// whitespace is also null.
pub const NULL_TOKENS: &[&str] = &["", "na", "n/a", "null", "none", "nan", "undefined", "nil"];

/// Whether a raw CSV cell represents a null value.
pub fn is_null_token(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || NULL_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Parse a cell as a numeric value, if possible.
pub fn parse_numeric(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Inferred content type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ColumnType {
    /// Every value is null.
    Empty,
    /// Every non-null value parses as a number.
    Numeric,
    /// No non-null value parses as a number.
    String,
    /// Some, but not all, non-null values parse as numbers.
    Mixed,
}

/// An in-memory table with ordered, named columns.
///
/// Cells are held as raw strings post null-token normalization; typed
/// interpretation (numeric coercion) happens during validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Read a table from CSV using the submission dialect.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, ValidationError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .quote(b'\'')
            .has_headers(true)
            .from_reader(reader);

        let columns = csv_reader
            .headers()
            .map_err(|e| ValidationError::new(format!("unable to parse CSV header: {}", e)))?
            .iter()
            .map(|h| h.to_owned())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for (i, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| {
                ValidationError::new(format!("unable to parse CSV record at row {}: {}", i, e))
            })?;
            if record.len() != columns.len() {
                return Err(ValidationError::new(format!(
                    "row {} has {} fields but the header defines {} columns",
                    i,
                    record.len(),
                    columns.len()
                )));
            }
            rows.push(
                record
                    .iter()
                    .map(|value| {
                        if is_null_token(value) {
                            None
                        } else {
                            Some(value.to_owned())
                        }
                    })
                    .collect(),
            );
        }

        Ok(Self { columns, rows })
    }

    /// Read a table from an in-memory CSV string.
    pub fn from_csv_str(data: &str) -> Result<Self, ValidationError> {
        Self::from_csv_reader(data.as_bytes())
    }

    /// Append a row; the arity must match the column count.
    pub fn push_row(&mut self, row: Vec<Option<String>>) -> Result<(), ValidationError> {
        if row.len() != self.columns.len() {
            return Err(ValidationError::new(format!(
                "row has {} fields but the table defines {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// Index of the column with exactly this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of the column matching this name case-insensitively.
    pub fn column_index_ci(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// The cell at `(row, col)`, with nulls flattened.
    pub fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|v| v.as_deref())
    }

    /// Iterate the values of one column.
    pub fn column_values(&self, col: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows.iter().map(move |r| r[col].as_deref())
    }

    /// Replace the column names, preserving data.
    pub fn set_columns(&mut self, columns: Vec<String>) {
        assert_eq!(columns.len(), self.columns.len());
        self.columns = columns;
    }

    /// A new table with columns reordered according to `order` (indices into
    /// the current columns).
    pub fn select(&self, order: &[usize]) -> Self {
        let columns = order.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| order.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Self { columns, rows }
    }

    /// Whether every cell of the row is null.
    pub fn row_is_null(&self, row: usize) -> bool {
        self.rows[row].iter().all(|v| v.is_none())
    }

    /// Infer the content type of a column.
    pub fn infer_column_type(&self, col: usize) -> ColumnType {
        let mut any = false;
        let mut numeric = 0usize;
        let mut non_numeric = 0usize;
        for value in self.column_values(col).flatten() {
            any = true;
            if parse_numeric(value).is_some() {
                numeric += 1;
            } else {
                non_numeric += 1;
            }
        }
        if !any {
            ColumnType::Empty
        } else if non_numeric == 0 {
            ColumnType::Numeric
        } else if numeric == 0 {
            ColumnType::String
        } else {
            ColumnType::Mixed
        }
    }
}
