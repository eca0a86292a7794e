//! Parquet storage.
//!
//! Measures are `OPTIONAL DOUBLE`; dates, keys and text are `OPTIONAL BINARY (UTF8)`, with dates
//! written as `YYYY-MM-DD`. Everything goes into a single row group.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{ChunkReader, FileReader};
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::file::writer::SerializedFileWriter;
use parquet::record::Field as PqField;
use parquet::schema::parser::parse_message_type;

use super::{ColumnMap, normalize_header};
use crate::error::{EtlError, EtlResult};
use crate::extract::dates::parse_date_str;
use crate::types::{DataSet, DataType, Schema, Value};

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn message_type(schema: &Schema) -> String {
    let mut message = String::from("message schema {\n");
    for field in &schema.fields {
        let physical = match field.data_type {
            DataType::Float64 => "DOUBLE",
            DataType::Date | DataType::Utf8 => "BINARY",
        };
        let logical = match field.data_type {
            DataType::Float64 => "",
            DataType::Date | DataType::Utf8 => " (UTF8)",
        };
        let _ = writeln!(message, "  OPTIONAL {physical} {}{logical};", field.name);
    }
    message.push('}');
    message
}

/// Write `dataset` as one row group.
pub fn write_parquet<W: Write + Send>(writer: W, dataset: &DataSet) -> EtlResult<()> {
    let schema = Arc::new(parse_message_type(&message_type(&dataset.schema))?);
    let props = Arc::new(WriterProperties::builder().build());
    let mut writer = SerializedFileWriter::new(writer, schema, props)?;

    let mut rg = writer.next_row_group()?;
    let mut col_idx: usize = 0;
    while let Some(mut col) = rg.next_column()? {
        let cells = dataset
            .rows
            .iter()
            .map(|row| row.get(col_idx).unwrap_or(&Value::Null));
        let mut levels: Vec<i16> = Vec::with_capacity(dataset.row_count());
        match col.untyped() {
            ColumnWriter::DoubleColumnWriter(w) => {
                let mut values: Vec<f64> = Vec::new();
                for cell in cells {
                    match cell.as_f64() {
                        Some(v) => {
                            values.push(v);
                            levels.push(1);
                        }
                        None => levels.push(0),
                    }
                }
                w.write_batch(&values, Some(&levels), None)?;
            }
            ColumnWriter::ByteArrayColumnWriter(w) => {
                let mut values: Vec<ByteArray> = Vec::new();
                for cell in cells {
                    let text = match cell {
                        Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
                        Value::Utf8(s) => Some(s.clone()),
                        Value::Float64(v) => Some(v.to_string()),
                        Value::Null => None,
                    };
                    match text {
                        Some(t) => {
                            values.push(ByteArray::from(t.into_bytes()));
                            levels.push(1);
                        }
                        None => levels.push(0),
                    }
                }
                w.write_batch(&values, Some(&levels), None)?;
            }
            _ => {
                return Err(EtlError::SchemaMismatch {
                    message: format!("unexpected parquet column writer at column {col_idx}"),
                });
            }
        }
        col.close()?;
        col_idx += 1;
    }
    rg.close()?;
    writer.close()?;
    Ok(())
}

/// Read a Parquet file following `schema`, by normalized leaf column name.
pub fn read_parquet_from_path(path: impl AsRef<Path>, schema: &Schema) -> EtlResult<DataSet> {
    let reader = SerializedFileReader::try_from(path.as_ref())?;
    let headers = leaf_column_names(&reader);
    let columns = ColumnMap::resolve(schema, &headers)?;
    let indexes: Vec<Option<usize>> = columns.indexes().collect();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx0, row_res) in reader.into_iter().enumerate() {
        let row_num = idx0 + 1;
        let row = row_res?;
        let cells: Vec<&PqField> = row.get_column_iter().map(|(_, f)| f).collect();

        let mut out_row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, idx) in schema.fields.iter().zip(&indexes) {
            let value = match idx.and_then(|i| cells.get(i)) {
                Some(cell) => convert_parquet_field(row_num, &field.name, field.data_type, cell)?,
                None => Value::Null,
            };
            out_row.push(value);
        }
        rows.push(out_row);
    }

    Ok(DataSet::new(schema.clone(), rows))
}

/// Normalized leaf column names, in file order.
pub fn parquet_column_names(path: impl AsRef<Path>) -> EtlResult<Vec<String>> {
    let reader = SerializedFileReader::try_from(path.as_ref())?;
    Ok(leaf_column_names(&reader))
}

fn leaf_column_names<R: ChunkReader + 'static>(reader: &SerializedFileReader<R>) -> Vec<String> {
    reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| normalize_header(&c.path().string()))
        .collect()
}

fn convert_parquet_field(
    row: usize,
    column: &str,
    data_type: DataType,
    f: &PqField,
) -> EtlResult<Value> {
    if matches!(f, PqField::Null) {
        return Ok(Value::Null);
    }
    let error = |message: &str| EtlError::ParseError {
        row,
        column: column.to_string(),
        raw: f.to_string(),
        message: message.to_string(),
    };

    match data_type {
        DataType::Utf8 => match f {
            PqField::Str(s) if s.trim().is_empty() => Ok(Value::Null),
            PqField::Str(s) => Ok(Value::Utf8(s.trim().to_string())),
            _ => Err(error("expected string")),
        },
        DataType::Float64 => {
            let v = match f {
                PqField::Double(v) => *v,
                PqField::Float(v) => f64::from(*v),
                PqField::Int(v) => f64::from(*v),
                // Integral columns written by other tools; precision loss beyond 2^53 is accepted.
                PqField::Long(v) => *v as f64,
                _ => return Err(error("expected number")),
            };
            Ok(if v.is_nan() { Value::Null } else { Value::Float64(v) })
        }
        DataType::Date => match f {
            PqField::Str(s) => parse_date_str(s.trim())
                .map(Value::Date)
                .ok_or_else(|| error("expected YYYY-MM-DD or DD/MM/YYYY")),
            PqField::Date(days) => days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map(Value::Date)
                .ok_or_else(|| error("date out of range")),
            _ => Err(error("expected date")),
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{message_type, read_parquet_from_path, write_parquet};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("fecha", DataType::Date),
            Field::new("zona", DataType::Utf8),
            Field::new("cpo_real", DataType::Float64),
            Field::optional("tanque_1", DataType::Float64),
        ])
    }

    #[test]
    fn message_type_marks_every_column_optional() {
        let message = message_type(&schema());
        assert!(message.contains("OPTIONAL BINARY fecha (UTF8);"));
        assert!(message.contains("OPTIONAL DOUBLE cpo_real;"));
    }

    #[test]
    fn nulls_survive_a_parquet_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.parquet");
        let ds = DataSet::new(
            schema(),
            vec![
                vec![
                    Value::Date(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()),
                    Value::Utf8("Codazzi".to_string()),
                    Value::Float64(0.0),
                    Value::Null,
                ],
                vec![
                    Value::Date(NaiveDate::from_ymd_opt(2025, 12, 2).unwrap()),
                    Value::Utf8("Codazzi".to_string()),
                    Value::Null,
                    Value::Float64(812.4),
                ],
            ],
        );
        let file = std::fs::File::create(&path).unwrap();
        write_parquet(file, &ds).unwrap();
        assert_eq!(read_parquet_from_path(&path, &schema()).unwrap(), ds);
    }

    #[test]
    fn missing_required_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.parquet");
        let short = Schema::new(vec![Field::new("fecha", DataType::Date)]);
        let ds = DataSet::new(
            short,
            vec![vec![Value::Date(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap())]],
        );
        write_parquet(std::fs::File::create(&path).unwrap(), &ds).unwrap();

        let err = read_parquet_from_path(&path, &schema()).unwrap_err();
        assert!(err.to_string().contains("missing required column 'zona'"));
    }
}
