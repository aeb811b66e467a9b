// ABOUTME: Interactive terminal prompts for table move parameters
// ABOUTME: Asks for missing identifiers and confirms before touching the target

use crate::config::ConnectionConfig;
use crate::mover::{validate_identifier, BackupJob};
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};

/// Prompt for one identifier, re-asking until it is valid
///
/// `kind` is used both as the prompt label and in validation messages.
pub fn prompt_identifier(kind: &'static str, default: Option<&str>) -> Result<String> {
    let theme = ColorfulTheme::default();
    let mut input = Input::<String>::with_theme(&theme)
        .with_prompt(format!("Enter the {}", kind))
        .validate_with(move |value: &String| -> Result<(), String> {
            validate_identifier(kind, value.trim()).map_err(|e| e.to_string())
        });
    if let Some(default) = default {
        input = input.default(default.to_string());
    }

    let value = input
        .interact_text()
        .with_context(|| format!("Failed to read {}", kind))?;
    Ok(value.trim().to_string())
}

/// Fill in whichever identifiers were not given on the command line
pub fn complete_job(
    table: Option<String>,
    source_schema: Option<String>,
    target_schema: Option<String>,
) -> Result<BackupJob> {
    let table = match table {
        Some(table) => table,
        None => prompt_identifier("table name", None)?,
    };
    let source_schema = match source_schema {
        Some(schema) => schema,
        None => prompt_identifier("source schema", Some("public"))?,
    };
    let target_schema = match target_schema {
        Some(schema) => schema,
        None => prompt_identifier("target schema", Some("public_test"))?,
    };

    BackupJob::new(source_schema, target_schema, table).context("Invalid table move parameters")
}

/// Show what is about to happen and ask for confirmation
///
/// The apply stage is not idempotent, so the default answer is no.
pub fn confirm_move(
    job: &BackupJob,
    source: &ConnectionConfig,
    target: &ConnectionConfig,
) -> Result<bool> {
    println!();
    println!("Table move summary:");
    println!("  Source: {} on {}", job.source_qualified(), source);
    println!("  Target: {} on {}", job.target_qualified(), target);
    println!();
    println!("⚠ The restore is not rolled back on failure. If it stops partway, the");
    println!("  target table may be partially created or loaded.");
    println!();

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Proceed with the move?")
        .default(false)
        .interact()
        .context("Failed to get confirmation")
}
