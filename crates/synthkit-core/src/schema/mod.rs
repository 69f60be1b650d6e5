pub mod ingest;
pub mod types;
pub mod value;

pub use types::{DataType, Row, SourceDomain};
pub use value::Value;
