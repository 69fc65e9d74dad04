mod catalog;
mod column;
mod schema;

pub use catalog::{Catalog, TableMetadata};
pub use column::Column;
pub use schema::Schema;
