mod connection;
mod schema;

pub use connection::{build_connect_string, ConnectionManager};
pub use schema::{init_schema, schema_version, DdlClass, SCHEMA_VERSION};
