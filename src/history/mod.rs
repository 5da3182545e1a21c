mod error;
mod source;
mod types;

pub use error::HistoryError;
pub use source::{FileHistorySource, HistorySource};
pub use types::History;
