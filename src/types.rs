//! Storage-neutral tabular model.
//!
//! Typed observations (see [`crate::model`]) are converted to and from a [`DataSet`] at the
//! storage boundary. The dataset keeps one [`Value`] per [`Field`] of its [`Schema`], in order.

use chrono::NaiveDate;

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Calendar day, serialized as `YYYY-MM-DD`.
    Date,
    /// 64-bit floating point number.
    Float64,
    /// UTF-8 string.
    Utf8,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
    /// Whether the column must be present in a stored file.
    ///
    /// Values of a required column may still be null; this only governs the header.
    pub required: bool,
}

impl Field {
    /// Create a required field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: true,
        }
    }

    /// Create an optional (extended) field.
    pub fn optional(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: false,
        }
    }
}

/// A list of fields describing the shape of a canonical dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// Calendar day.
    Date(NaiveDate),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    /// Wrap an optional measure.
    pub fn from_f64(v: Option<f64>) -> Self {
        v.map_or(Self::Null, Self::Float64)
    }

    /// Wrap an optional string; empty strings become null.
    pub fn from_text(v: Option<&str>) -> Self {
        match v {
            Some(s) if !s.is_empty() => Self::Utf8(s.to_owned()),
            _ => Self::Null,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Create a new dataset containing only rows that match `predicate`.
    ///
    /// The returned dataset preserves the original schema.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        Self {
            schema: self.schema.clone(),
            rows,
        }
    }

    /// Distinct non-null string values of `column`, in first-seen order.
    pub fn distinct_text(&self, column: &str) -> Vec<String> {
        let Some(idx) = self.schema.index_of(column) else {
            return Vec::new();
        };
        let mut out: Vec<String> = Vec::new();
        for row in &self.rows {
            if let Some(Value::Utf8(s)) = row.get(idx) {
                if !out.iter().any(|seen| seen == s) {
                    out.push(s.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{DataSet, DataType, Field, Schema, Value};

    fn sample_dataset() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("zona", DataType::Utf8),
            Field::optional("rff_real", DataType::Float64),
        ]);
        DataSet::new(
            schema,
            vec![
                vec![Value::Utf8("MLB".to_string()), Value::Float64(10.0)],
                vec![Value::Utf8("Sinú".to_string()), Value::Null],
                vec![Value::Utf8("MLB".to_string()), Value::Float64(5.0)],
            ],
        )
    }

    #[test]
    fn schema_index_of_works() {
        let ds = sample_dataset();
        assert_eq!(ds.schema.index_of("zona"), Some(0));
        assert_eq!(ds.schema.index_of("rff_real"), Some(1));
        assert_eq!(ds.schema.index_of("missing"), None);
        assert!(!ds.schema.fields[1].required);
    }

    #[test]
    fn filter_rows_preserves_schema() {
        let ds = sample_dataset();
        let out = ds.filter_rows(|row| matches!(row.first(), Some(Value::Utf8(s)) if s == "MLB"));
        assert_eq!(out.schema, ds.schema);
        assert_eq!(out.row_count(), 2);
        assert_eq!(ds.row_count(), 3);
    }

    #[test]
    fn distinct_text_keeps_first_seen_order() {
        let ds = sample_dataset();
        assert_eq!(ds.distinct_text("zona"), vec!["MLB".to_string(), "Sinú".to_string()]);
        assert!(ds.distinct_text("nope").is_empty());
    }

    #[test]
    fn value_helpers() {
        assert_eq!(Value::from_f64(None), Value::Null);
        assert_eq!(Value::from_text(Some("")), Value::Null);
        assert_eq!(Value::Float64(2.5).as_f64(), Some(2.5));
        assert!(Value::Null.is_null());
    }
}
