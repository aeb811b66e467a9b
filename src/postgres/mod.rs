// ABOUTME: PostgreSQL utilities module
// ABOUTME: Exports connection management and catalog checks for preflight

pub mod connection;
pub mod privileges;
pub mod schema;

pub use connection::{connect, connect_with_retry};
pub use privileges::{check_source_privileges, check_target_privileges, PrivilegeCheck};
pub use schema::{find_table, format_bytes, schema_exists, TableInfo};
