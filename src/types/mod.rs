//! Value types shared by storage and the sandbox boundary.

mod value;

pub use value::{json_type_name, DataType, JsonValue, PrimaryKeyValue, Row, Value};
