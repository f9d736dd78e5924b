//! Categorical label encoding

use crate::error::{BuilderError, Result};
use serde::{Deserialize, Serialize};

/// How many vocabulary entries an "unknown value" error lists before truncating
const MAX_LISTED_CLASSES: usize = 20;

/// Maps string categories to integer codes.
///
/// The vocabulary is sorted, so codes are stable for a given set of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit an encoder over every value in `values`
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = values.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// The sorted vocabulary
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Code for a value seen during fitting
    pub fn encode(&self, value: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    /// Encode a value or fail with an error naming the column and the valid values
    pub fn encode_checked(&self, column: &str, value: &str) -> Result<usize> {
        self.encode(value).ok_or_else(|| {
            BuilderError::InvalidInput(format!(
                "Unknown value '{}' for feature '{}'. Valid values: {}",
                value,
                column,
                self.describe_vocabulary()
            ))
        })
    }

    /// Original label for a code
    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    /// Comma-separated vocabulary, truncated for large encoders
    pub fn describe_vocabulary(&self) -> String {
        let shown: Vec<&str> = self
            .classes
            .iter()
            .take(MAX_LISTED_CLASSES)
            .map(String::as_str)
            .collect();
        let mut listed = format!("[{}]", shown.join(", "));
        if self.classes.len() > MAX_LISTED_CLASSES {
            listed.push_str(&format!(
                " (and {} more)",
                self.classes.len() - MAX_LISTED_CLASSES
            ));
        }
        listed
    }
}
