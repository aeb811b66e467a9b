// ABOUTME: Library module for postgres-table-mover
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod interactive;
pub mod mover;
pub mod postgres;
pub mod utils;
