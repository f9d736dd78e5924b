//! Data preprocessing module
//!
//! Turns a raw uploaded table into numeric matrices:
//! - Missing value imputation (median / most frequent)
//! - Categorical label encoding
//! - Standard scaling
//! - Seeded, optionally stratified train/test split

mod column;
mod encoder;
mod imputer;
mod pipeline;
mod scaler;
mod split;

pub use column::{string_values, ColumnValues};
pub use encoder::LabelEncoder;
pub use imputer::{median, mode, Imputer, UNKNOWN_CATEGORY};
pub use pipeline::{PreparedData, Preprocessor};
pub use scaler::StandardScaler;
pub use split::{train_test_split, TrainTestSplit};
