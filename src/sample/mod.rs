mod error;
mod parsing;
mod types;

pub use error::SampleError;
pub use parsing::PositionEvent;
pub use types::{seconds_between, FieldOrder, HeadingUnits, PositionSample};
