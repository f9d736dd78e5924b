//! Missing value imputation

use super::column::ColumnValues;
use std::collections::BTreeMap;

/// Placeholder used when a text column has no observed value at all
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Fills gaps in a column: median for numeric columns, most frequent value for text
#[derive(Debug, Clone, Default)]
pub struct Imputer;

impl Imputer {
    pub fn new() -> Self {
        Self
    }

    /// Return a copy of `values` with missing cells filled.
    ///
    /// A numeric column with no observed value has no median and stays missing.
    pub fn fill(&self, values: &ColumnValues) -> ColumnValues {
        match values {
            ColumnValues::Numeric(cells) => {
                let observed: Vec<f64> = cells.iter().flatten().copied().collect();
                match median(&observed) {
                    Some(m) => ColumnValues::Numeric(cells.iter().map(|c| Some(c.unwrap_or(m))).collect()),
                    None => values.clone(),
                }
            }
            ColumnValues::Text(cells) => {
                let fill = mode(cells.iter().flatten().map(String::as_str))
                    .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
                ColumnValues::Text(
                    cells
                        .iter()
                        .map(|c| Some(c.clone().unwrap_or_else(|| fill.clone())))
                        .collect(),
                )
            }
        }
    }
}

/// Median of the observed values (mean of the two middle values for even counts)
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent value; ties go to the lexicographically smallest
pub fn mode<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let best = counts.values().copied().max()?;
    counts
        .into_iter()
        .find(|(_, c)| *c == best)
        .map(|(v, _)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_mode_tie_breaks_lexicographically() {
        let values = ["b", "a", "b", "a", "c"];
        assert_eq!(mode(values.iter().copied()), Some("a".to_string()));
    }

    #[test]
    fn test_fill_numeric_with_median() {
        let col = ColumnValues::Numeric(vec![Some(1.0), None, Some(3.0), Some(10.0)]);
        let filled = Imputer::new().fill(&col);
        assert_eq!(
            filled,
            ColumnValues::Numeric(vec![Some(1.0), Some(3.0), Some(3.0), Some(10.0)])
        );
    }

    #[test]
    fn test_fill_text_with_mode_or_unknown() {
        let col = ColumnValues::Text(vec![Some("x".into()), None, Some("x".into()), Some("y".into())]);
        let filled = Imputer::new().fill(&col);
        assert_eq!(
            filled,
            ColumnValues::Text(vec![
                Some("x".into()),
                Some("x".into()),
                Some("x".into()),
                Some("y".into())
            ])
        );

        let empty = ColumnValues::Text(vec![None, None]);
        assert_eq!(
            Imputer::new().fill(&empty),
            ColumnValues::Text(vec![Some("Unknown".into()), Some("Unknown".into())])
        );
    }

    #[test]
    fn test_all_missing_numeric_stays_missing() {
        let col = ColumnValues::Numeric(vec![None, None]);
        assert_eq!(Imputer::new().fill(&col), col);
    }
}
