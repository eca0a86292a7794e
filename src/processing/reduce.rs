//! Column reductions over a [`crate::types::DataSet`].

use crate::types::{DataSet, DataType, Value};

/// Built-in reduction operations over a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Count non-null values.
    Count,
    /// Sum numeric values, ignoring nulls.
    Sum,
    /// Minimum numeric value, ignoring nulls.
    Min,
    /// Maximum numeric value, ignoring nulls.
    Max,
    /// Arithmetic mean, ignoring nulls.
    Mean,
}

/// Reduce a column using a built-in [`ReduceOp`].
///
/// - Returns `None` if `column` does not exist in the schema.
/// - `Count` works on any column and returns `Value::Float64(n)`.
/// - Other ops return `Some(Value::Null)` for non-numeric columns or when every value is null.
pub fn reduce(dataset: &DataSet, column: &str, op: ReduceOp) -> Option<Value> {
    let idx = dataset.schema.index_of(column)?;

    if op == ReduceOp::Count {
        let n = dataset
            .rows
            .iter()
            .filter(|row| row.get(idx).is_some_and(|v| !v.is_null()))
            .count();
        return Some(Value::Float64(n as f64));
    }
    if dataset.schema.fields.get(idx)?.data_type != DataType::Float64 {
        return Some(Value::Null);
    }

    let values = dataset.rows.iter().filter_map(|row| row.get(idx)?.as_f64());
    let mut acc: Option<f64> = None;
    let mut n = 0usize;
    for v in values {
        n += 1;
        acc = Some(match (op, acc) {
            (ReduceOp::Min, Some(a)) => a.min(v),
            (ReduceOp::Max, Some(a)) => a.max(v),
            (ReduceOp::Sum | ReduceOp::Mean, Some(a)) => a + v,
            (_, None) => v,
            (ReduceOp::Count, Some(a)) => a,
        });
    }
    let result = match (op, acc) {
        (ReduceOp::Mean, Some(total)) => Some(total / n as f64),
        (_, acc) => acc,
    };
    Some(Value::from_f64(result))
}

#[cfg(test)]
mod tests {
    use super::{ReduceOp, reduce};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn numeric_dataset_with_nulls() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("zona", DataType::Utf8),
            Field::new("cpo_real", DataType::Float64),
        ]);

        let rows = vec![
            vec![Value::Utf8("MLB".to_string()), Value::Float64(10.0)],
            vec![Value::Utf8("MLB".to_string()), Value::Null],
            vec![Value::Null, Value::Float64(5.5)],
        ];

        DataSet::new(schema, rows)
    }

    #[test]
    fn count_skips_nulls() {
        let ds = numeric_dataset_with_nulls();
        assert_eq!(reduce(&ds, "cpo_real", ReduceOp::Count), Some(Value::Float64(2.0)));
        assert_eq!(reduce(&ds, "zona", ReduceOp::Count), Some(Value::Float64(2.0)));
    }

    #[test]
    fn numeric_ops_ignore_nulls() {
        let ds = numeric_dataset_with_nulls();
        assert_eq!(reduce(&ds, "cpo_real", ReduceOp::Sum), Some(Value::Float64(15.5)));
        assert_eq!(reduce(&ds, "cpo_real", ReduceOp::Min), Some(Value::Float64(5.5)));
        assert_eq!(reduce(&ds, "cpo_real", ReduceOp::Max), Some(Value::Float64(10.0)));
        assert_eq!(reduce(&ds, "cpo_real", ReduceOp::Mean), Some(Value::Float64(7.75)));
        assert_eq!(reduce(&ds, "zona", ReduceOp::Sum), Some(Value::Null));
    }

    #[test]
    fn missing_column_and_all_null() {
        let ds = numeric_dataset_with_nulls();
        assert_eq!(reduce(&ds, "missing", ReduceOp::Count), None);

        let schema = Schema::new(vec![Field::new("cpo_real", DataType::Float64)]);
        let ds = DataSet::new(schema, vec![vec![Value::Null], vec![Value::Null]]);
        assert_eq!(reduce(&ds, "cpo_real", ReduceOp::Mean), Some(Value::Null));
        assert_eq!(reduce(&ds, "cpo_real", ReduceOp::Count), Some(Value::Float64(0.0)));
    }
}
