//! Tabular result sets built from raw query results.

use crate::service::ResultField;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Field the service uses as a continuation pointer; never exposed as a column.
pub const POINTER_FIELD: &str = "@ptr";

/// Field whose values are converted to instants when they parse.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Format of `@timestamp` values; fractional seconds are optional.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Errors that can occur while reading rows from a result set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowsError {
    /// The requested row does not exist.
    #[error("row {index} out of range: result set has {len} rows")]
    OutOfRange {
        /// The requested row index.
        index: usize,
        /// Number of rows in the result set.
        len: usize,
    },

    /// The destination buffer does not match the number of columns.
    #[error("destination has {actual} slots but rows have {expected} columns")]
    ShortBuffer {
        /// Number of columns.
        expected: usize,
        /// Length of the destination buffer.
        actual: usize,
    },
}

/// One cell of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// The row carried no value for this column.
    Null,
    /// Text as returned by the service.
    Text(String),
    /// A parsed `@timestamp` value.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns the text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the instant, if this is a timestamp value.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(time) => Some(*time),
            _ => None,
        }
    }

    /// Returns `true` if the row carried no value for this column.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(text) => f.write_str(text),
            Self::Timestamp(time) => {
                f.write_str(&time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// Immutable result of one completed query.
///
/// Columns come from the first result row; every row holds one value per column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Returns the column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns all rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the position of the named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Returns the row at `index`.
    ///
    /// # Errors
    ///
    /// Returns `RowsError::OutOfRange` if there is no such row.
    pub fn row(&self, index: usize) -> Result<&[Value], RowsError> {
        self.rows
            .get(index)
            .map(Vec::as_slice)
            .ok_or(RowsError::OutOfRange {
                index,
                len: self.rows.len(),
            })
    }

    /// Returns a forward-only cursor over the rows.
    #[must_use]
    pub fn cursor(&self) -> Rows<'_> {
        Rows {
            result: self,
            position: 0,
        }
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a [Value];
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.cursor()
    }
}

/// Forward-only cursor over the rows of a [`ResultSet`].
#[derive(Debug, Clone)]
pub struct Rows<'a> {
    result: &'a ResultSet,
    position: usize,
}

impl Rows<'_> {
    /// Copies the next row into `dest` and advances.
    ///
    /// Returns `Ok(false)` once every row has been read.
    ///
    /// # Errors
    ///
    /// Returns `RowsError::ShortBuffer` if `dest` does not have exactly one
    /// slot per column; the cursor does not advance in that case.
    pub fn next_into(&mut self, dest: &mut [Value]) -> Result<bool, RowsError> {
        let Some(row) = self.result.rows.get(self.position) else {
            return Ok(false);
        };
        if row.len() != dest.len() {
            return Err(RowsError::ShortBuffer {
                expected: row.len(),
                actual: dest.len(),
            });
        }
        dest.clone_from_slice(row);
        self.position += 1;
        Ok(true)
    }
}

impl<'a> Iterator for Rows<'a> {
    type Item = &'a [Value];

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.result.rows.get(self.position)?;
        self.position += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.result.rows.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Rows<'_> {}

/// Builds a result set from the raw rows of a completed query.
///
/// Columns are the field names of the first row in order, without the
/// pointer field. `@timestamp` values that parse become instants; all other
/// values, and timestamps that do not parse, stay text.
///
/// # Example
///
/// ```
/// use driver::query::{materialize, Value};
/// use driver::service::ResultField;
///
/// let result = materialize(vec![vec![
///     ResultField::new("@message", "hi"),
///     ResultField::new("@ptr", "CmEKJgoi"),
/// ]]);
///
/// assert_eq!(result.columns(), ["@message"]);
/// assert_eq!(result.row(0).unwrap(), [Value::Text("hi".to_string())]);
/// ```
#[must_use]
pub fn materialize(results: Vec<Vec<ResultField>>) -> ResultSet {
    let Some(first) = results.first() else {
        return ResultSet::default();
    };

    let mut columns: Vec<String> = Vec::with_capacity(first.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(first.len());
    for field in first {
        if field.field == POINTER_FIELD || index.contains_key(&field.field) {
            continue;
        }
        index.insert(field.field.clone(), columns.len());
        columns.push(field.field.clone());
    }

    let rows = results
        .into_iter()
        .map(|row| {
            let mut values = vec![Value::Null; columns.len()];
            for field in row {
                if field.field == POINTER_FIELD {
                    continue;
                }
                if let Some(&position) = index.get(&field.field) {
                    values[position] = convert_value(&field.field, field.value);
                }
            }
            values
        })
        .collect();

    ResultSet { columns, rows }
}

fn convert_value(name: &str, value: String) -> Value {
    if name == TIMESTAMP_FIELD {
        if let Ok(time) = NaiveDateTime::parse_from_str(&value, TIMESTAMP_FORMAT) {
            return Value::Timestamp(time.and_utc());
        }
    }
    Value::Text(value)
}
