//! CSV loading with separator detection

use crate::error::{BuilderError, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Separators tried, in order, when the sniffed one yields a single column
const FALLBACK_SEPARATORS: [u8; 3] = [b';', b',', b'\t'];

/// Cell spellings read as missing values
const NULL_TOKENS: [&str; 6] = ["NA", "N/A", "NaN", "nan", "null", "NULL"];

/// Loader for delimited text uploads
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows scanned for schema inference (`None` scans the whole file)
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: None,
        }
    }

    /// Limit schema inference to the first `n` rows
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = Some(n);
        self
    }

    /// Load a CSV file from disk
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let bytes = std::fs::read(path.as_ref())?;
        self.load_csv_bytes(&bytes)
    }

    /// Parse CSV bytes, detecting the separator and normalising header names.
    ///
    /// The separator comes from [`sniff_separator`] on the first line. When that
    /// produces a single column, `;`, `,` and tab are retried in turn and the
    /// first parse with more than one column is kept.
    pub fn load_csv_bytes(&self, bytes: &[u8]) -> Result<DataFrame> {
        let first_line = first_line(bytes);
        let detected = sniff_separator(&first_line);
        debug!(separator = %(detected as char).escape_default(), "Detected CSV separator");

        let primary = self.read_with_separator(bytes, detected);
        let mut df = match primary {
            Ok(df) if df.width() > 1 => df,
            other => {
                let retried = FALLBACK_SEPARATORS
                    .iter()
                    .filter(|&&sep| sep != detected)
                    .filter_map(|&sep| self.read_with_separator(bytes, sep).ok())
                    .find(|df| df.width() > 1);
                match (retried, other) {
                    (Some(df), _) => df,
                    (None, Ok(df)) => df,
                    (None, Err(e)) => return Err(e),
                }
            }
        };

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| normalize_header(name.as_str()))
            .collect();
        df.set_column_names(names)?;
        Ok(df)
    }

    fn read_with_separator(&self, bytes: &[u8], separator: u8) -> Result<DataFrame> {
        let null_values = NullValues::AllColumns(NULL_TOKENS.iter().map(|t| (*t).into()).collect());
        let parse_opts = CsvParseOptions::default()
            .with_separator(separator)
            .with_null_values(Some(null_values));

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| BuilderError::Data(e.to_string()))
    }
}

/// Pick a separator from the header line: `;` when it outnumbers `,`,
/// tab when present, `,` otherwise.
pub fn sniff_separator(first_line: &str) -> u8 {
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons > 0 && semicolons > commas {
        b';'
    } else if first_line.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

/// Strip surrounding whitespace, then quote characters, from a header name
pub fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}')
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_string()
}

fn first_line(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_separator() {
        assert_eq!(sniff_separator("a;b;c"), b';');
        assert_eq!(sniff_separator("a,b;c"), b',');
        assert_eq!(sniff_separator("a\tb\tc"), b'\t');
        assert_eq!(sniff_separator("a,b,c"), b',');
        assert_eq!(sniff_separator("single"), b',');
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  age "), "age");
        assert_eq!(normalize_header("\"income\""), "income");
        assert_eq!(normalize_header(" 'city' "), "city");
    }

    #[test]
    fn test_load_semicolon_csv() {
        let csv = b"age;income;label\n30;1000;yes\n40;2000;no\n";
        let df = DataLoader::new().load_csv_bytes(csv).unwrap();
        assert_eq!(df.width(), 3);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_header_whitespace_is_stripped() {
        let csv = b" age , income \n1,2\n3,4\n";
        let df = DataLoader::new().load_csv_bytes(csv).unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["age".to_string(), "income".to_string()]);
    }

    #[test]
    fn test_null_tokens_are_missing() {
        let csv = b"a,b\n1,x\nNA,y\n3,NA\n";
        let df = DataLoader::new().load_csv_bytes(csv).unwrap();
        assert_eq!(df.column("a").unwrap().null_count(), 1);
        assert_eq!(df.column("b").unwrap().null_count(), 1);
    }

    #[test]
    fn test_single_column_parse_retries_other_separators() {
        // The quoted comma makes the header sniff as `,`, which leaves one column
        let csv = b"\"a,b\";c\n1;2\n3;4\n";
        assert_eq!(sniff_separator(&first_line(csv)), b',');

        let df = DataLoader::new().load_csv_bytes(csv).unwrap();
        assert_eq!(df.width(), 2);
        assert_eq!(df.height(), 2);
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["a,b".to_string(), "c".to_string()]);
    }
}
