//! Dataset ingestion for jyrest: tab-separated files with a three-line
//! header, parsed into immutable column-major views with interned class labels.

mod dataset;
mod error;
mod options;
mod reader;

pub use dataset::{DatasetView, Schema};
pub use error::DataError;
pub use options::LoadOptions;
pub use reader::{DatasetReader, MIN_LOADED_COVARIATES};
