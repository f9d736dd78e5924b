//! Typed extraction of DataFrame columns

use crate::error::{BuilderError, Result};
use polars::prelude::*;

/// Values of one column, split by inferred kind
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Integer, float or boolean column; NaN and infinities are read as missing
    Numeric(Vec<Option<f64>>),
    /// Anything else, string-cast
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    /// Read `name` out of `df`
    pub fn from_frame(df: &DataFrame, name: &str) -> Result<Self> {
        let column = df
            .column(name)
            .map_err(|_| BuilderError::InvalidInput(format!("Column '{}' not found", name)))?;
        let series = column.as_materialized_series();

        if is_numeric_dtype(series.dtype()) {
            let cast = series.cast(&DataType::Float64)?;
            let values = cast
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            Ok(ColumnValues::Numeric(values))
        } else {
            Ok(ColumnValues::Text(string_values(series)?))
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnValues::Numeric(v) => v[row].is_none(),
            ColumnValues::Text(v) => v[row].is_none(),
        }
    }

    /// Keep only the rows whose index is in `rows`, in that order
    pub fn select(&self, rows: &[usize]) -> Self {
        match self {
            ColumnValues::Numeric(v) => ColumnValues::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnValues::Text(v) => ColumnValues::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// Cast any column to strings, the way a label column is read
pub fn string_values(series: &Series) -> Result<Vec<Option<String>>> {
    let cast = series.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_text_columns() {
        let df = df! {
            "age" => &[Some(30i64), None, Some(50)],
            "city" => &[Some("Paris"), Some("Rome"), None],
        }
        .unwrap();

        let age = ColumnValues::from_frame(&df, "age").unwrap();
        assert_eq!(age, ColumnValues::Numeric(vec![Some(30.0), None, Some(50.0)]));

        let city = ColumnValues::from_frame(&df, "city").unwrap();
        assert!(matches!(city, ColumnValues::Text(_)));
        assert!(city.is_missing(2));
    }

    #[test]
    fn test_non_finite_is_missing() {
        let df = df! { "x" => &[1.0f64, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] }.unwrap();
        let x = ColumnValues::from_frame(&df, "x").unwrap();
        assert_eq!(x, ColumnValues::Numeric(vec![Some(1.0), None, None, None]));
    }

    #[test]
    fn test_unknown_column() {
        let df = df! { "x" => &[1.0f64] }.unwrap();
        assert!(ColumnValues::from_frame(&df, "y").is_err());
    }
}
