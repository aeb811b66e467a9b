// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports the move and validate commands

pub mod move_table;
pub mod validate;

pub use move_table::move_table;
pub use validate::validate;
