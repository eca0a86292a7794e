//! CSV storage.

use std::io::{Read, Write};

use super::{ColumnMap, normalize_header};
use crate::error::{EtlError, EtlResult};
use crate::extract::dates::parse_date_str;
use crate::types::{DataSet, DataType, Schema, Value};

/// Read CSV data following `schema` from an existing CSV reader.
///
/// Rules:
///
/// - CSV must have headers; names are compared after [`normalize_header`].
/// - Required schema fields must be present (order can differ); absent optional fields read as
///   null.
/// - Empty cells are null; `nan` (as pandas writes it) is null too.
pub fn read_csv_from_reader<R: Read>(
    rdr: &mut csv::Reader<R>,
    schema: &Schema,
) -> EtlResult<DataSet> {
    let headers: Vec<String> = rdr.headers()?.iter().map(normalize_header).collect();
    let columns = ColumnMap::resolve(schema, &headers)?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (row_idx0, result) in rdr.records().enumerate() {
        // 1-based for users, and the header is row 1.
        let user_row = row_idx0 + 2;
        let record = result?;

        let mut row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, csv_idx) in schema.fields.iter().zip(columns.indexes()) {
            let raw = csv_idx.and_then(|i| record.get(i)).unwrap_or("");
            row.push(parse_typed_value(user_row, &field.name, field.data_type, raw)?);
        }
        rows.push(row);
    }

    Ok(DataSet::new(schema.clone(), rows))
}

fn parse_typed_value(row: usize, column: &str, data_type: DataType, raw: &str) -> EtlResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let error = |message: &str| EtlError::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message: message.to_owned(),
    };
    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Float64 => {
            let v = trimmed
                .parse::<f64>()
                .map_err(|e| error(&e.to_string()))?;
            Ok(if v.is_nan() { Value::Null } else { Value::Float64(v) })
        }
        DataType::Date => parse_date_str(trimmed)
            .map(Value::Date)
            .ok_or_else(|| error("expected YYYY-MM-DD or DD/MM/YYYY")),
    }
}

/// Write a dataset as CSV with a header row in schema order.
pub fn write_csv<W: Write>(writer: W, dataset: &DataSet) -> EtlResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(dataset.schema.field_names())?;
    for row in &dataset.rows {
        wtr.write_record(row.iter().map(format_value))?;
    }
    wtr.flush()?;
    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Utf8(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{read_csv_from_reader, write_csv};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("fecha", DataType::Date),
            Field::new("zona", DataType::Utf8),
            Field::new("rff_real", DataType::Float64),
            Field::optional("tanque_1", DataType::Float64),
        ])
    }

    fn read(text: &str) -> crate::error::EtlResult<DataSet> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());
        read_csv_from_reader(&mut rdr, &schema())
    }

    #[test]
    fn headers_are_normalized_and_optional_columns_filled() {
        let ds = read(" Fecha ,ZONA,RFF Real\n01/12/2025,MLB,\n2025-12-02,Sinú,410.5\n").unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[0][0], Value::Date(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()));
        assert_eq!(ds.rows[0][2], Value::Null);
        assert_eq!(ds.rows[1][2], Value::Float64(410.5));
        assert_eq!(ds.rows[1][3], Value::Null);
    }

    #[test]
    fn missing_required_column_is_a_schema_error() {
        let err = read("fecha,rff_real\n2025-12-01,1\n").unwrap_err();
        assert!(err.to_string().contains("missing required column 'zona'"));
    }

    #[test]
    fn bad_number_reports_row_and_column() {
        let err = read("fecha,zona,rff_real\n2025-12-01,MLB,abc\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("row 2"));
        assert!(msg.contains("column 'rff_real'"));
    }

    #[test]
    fn written_csv_reads_back() {
        let ds = DataSet::new(
            schema(),
            vec![vec![
                Value::Date(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()),
                Value::Utf8("A&G".to_string()),
                Value::Float64(21.0),
                Value::Null,
            ]],
        );
        let mut buf = Vec::new();
        write_csv(&mut buf, &ds).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("fecha,zona,rff_real,tanque_1\n2025-12-01,A&G,21,\n"));
        assert_eq!(read(&text).unwrap(), ds);
    }
}
