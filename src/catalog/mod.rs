//! Table schemas.

mod schema;

pub use schema::{ColumnDef, TableSchema};
