//! Domain model types shared across the pipeline

pub mod matching;
pub mod row;
pub mod task;

pub use matching::{CatalogProduct, Customer, MatchResult, MatchType};
pub use row::{
    ErrorLevel, ErrorRecord, ErrorStatus, ErrorType, ProcessedRow, RawRow, RecognizedFields,
    RowOutcome,
};
pub use task::{IngestionTask, TaskProgress, TaskStatus};
