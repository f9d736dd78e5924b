//! Integration test: Preprocessing from raw tables to train/test matrices

use model_builder::preprocessing::Preprocessor;
use model_builder::training::ProblemType;
use model_builder::utils::DataLoader;
use model_builder::BuilderError;
use polars::prelude::*;

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn customers_df() -> DataFrame {
    let n = 30;
    let age: Vec<Option<f64>> = (0..n)
        .map(|i| if i % 11 == 4 { None } else { Some(20.0 + i as f64 * 1.5) })
        .collect();
    let income: Vec<f64> = (0..n).map(|i| 20_000.0 + (i * 1_700 % 40_000) as f64).collect();
    let city: Vec<Option<&str>> = (0..n)
        .map(|i| match i % 4 {
            0 => Some("paris"),
            1 => Some("rome"),
            2 => Some("oslo"),
            _ if i % 7 == 0 => None,
            _ => Some("paris"),
        })
        .collect();
    let label: Vec<Option<&str>> = (0..n)
        .map(|i| if i == 9 { None } else if i % 3 == 0 { Some("yes") } else { Some("no") })
        .collect();

    df!(
        "age" => age,
        "income" => income,
        "city" => city,
        "label" => label,
    )
    .unwrap()
}

#[test]
fn test_split_covers_every_cleaned_row() {
    let df = customers_df();
    let prepared = Preprocessor::new()
        .run(&df, &columns(&["age", "income", "city"]), "label", ProblemType::Classification)
        .unwrap();

    // One row dropped for the missing label
    assert_eq!(prepared.x_train.nrows() + prepared.x_test.nrows(), 29);
    assert_eq!(prepared.x_train.nrows(), prepared.y_train.len());
    assert_eq!(prepared.x_test.nrows(), prepared.y_test.len());
    assert_eq!(prepared.x_train.ncols(), 3);
    assert!(prepared.x_train.iter().chain(prepared.x_test.iter()).all(|v| v.is_finite()));
}

#[test]
fn test_encoders_only_for_text_columns() {
    let df = customers_df();
    let prepared = Preprocessor::new()
        .run(&df, &columns(&["age", "income", "city"]), "label", ProblemType::Classification)
        .unwrap();

    assert_eq!(prepared.encoders.len(), 1);
    let city = &prepared.encoders["city"];
    assert_eq!(city.classes(), &["oslo", "paris", "rome"]);

    let target = prepared.target_encoder.as_ref().unwrap();
    assert_eq!(target.classes(), &["no", "yes"]);
    assert_eq!(target.decode(target.encode("yes").unwrap()), Some("yes"));
}

#[test]
fn test_stratified_split_keeps_both_classes_in_train() {
    let df = customers_df();
    let prepared = Preprocessor::new()
        .run(&df, &columns(&["age", "income"]), "label", ProblemType::Classification)
        .unwrap();

    assert!(prepared.y_train.iter().any(|&y| y == 0.0));
    assert!(prepared.y_train.iter().any(|&y| y == 1.0));
}

#[test]
fn test_same_seed_same_split() {
    let df = customers_df();
    let inputs = columns(&["age", "income", "city"]);
    let a = Preprocessor::new()
        .run(&df, &inputs, "label", ProblemType::Classification)
        .unwrap();
    let b = Preprocessor::new()
        .run(&df, &inputs, "label", ProblemType::Classification)
        .unwrap();

    assert_eq!(a.x_train, b.x_train);
    assert_eq!(a.y_test, b.y_test);
}

#[test]
fn test_regression_drops_unparseable_targets() {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        "y" => &["1.5", "3.0", "oops", "6.1", "7.4", "9.0"],
    )
    .unwrap();

    let prepared = Preprocessor::new()
        .run(&df, &columns(&["x"]), "y", ProblemType::Regression)
        .unwrap();
    assert_eq!(prepared.n_samples(), 5);
    assert!(prepared.target_encoder.is_none());
}

#[test]
fn test_garbage_regression_target_is_a_validation_error() {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0, 4.0],
        "score" => &["high", "low", "medium", "low"],
    )
    .unwrap();

    let err = Preprocessor::new()
        .run(&df, &columns(&["x"]), "score", ProblemType::Regression)
        .unwrap_err();
    assert!(matches!(err, BuilderError::Validation(_)));
    assert!(err.to_string().contains("score"));
}

#[test]
fn test_loader_feeds_preprocessor() {
    let csv = "\"age\";\"city\";\"label\"\n31;paris;yes\n45;rome;no\n22;paris;yes\n50;oslo;no\n38;rome;yes\n29;oslo;no\n";
    let df = DataLoader::new().load_csv_bytes(csv.as_bytes()).unwrap();
    let names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
    assert_eq!(names, vec!["age", "city", "label"]);

    let prepared = Preprocessor::new()
        .run(&df, &columns(&["age", "city"]), "label", ProblemType::Classification)
        .unwrap();
    assert_eq!(prepared.n_samples(), 6);
}

#[test]
fn test_infinite_cells_are_treated_as_missing() {
    let n = 40;
    let mut csv = String::from("x,z,y\n");
    for i in 0..n {
        let x = if i == 3 { "inf".to_string() } else { format!("{}.5", i) };
        let y = if i == 7 { "-inf".to_string() } else { (i * 2).to_string() };
        csv.push_str(&format!("{},{},{}\n", x, i % 5, y));
    }
    let df = DataLoader::new().load_csv_bytes(csv.as_bytes()).unwrap();

    let prepared = Preprocessor::new()
        .run(&df, &columns(&["x", "z"]), "y", ProblemType::Regression)
        .unwrap();

    // Row 7 has no usable target; row 3 keeps an imputed x
    assert_eq!(prepared.n_samples(), n - 1);
    assert!(prepared.x_train.iter().chain(prepared.x_test.iter()).all(|v| v.is_finite()));
    assert!(prepared.y_train.iter().chain(prepared.y_test.iter()).all(|v| v.is_finite()));
}
