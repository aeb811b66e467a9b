// ABOUTME: Backup job identifiers and the artifact paths derived from them
// ABOUTME: Validates schema and table names before any stage runs

use crate::error::InvalidJob;
use std::path::{Path, PathBuf};

/// PostgreSQL truncates identifiers beyond NAMEDATALEN - 1 bytes
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Check that `value` is a plain, unquoted identifier
///
/// Allowed: lower-case ASCII letters, digits and underscores, not starting
/// with a digit. Anything else could escape the working directory through the
/// artifact file names or need quoting inside the dump. Upper case is refused
/// because pg_dump folds unquoted `--table` patterns to lower case, so the
/// dump would never contain the mixed-case name the rewrite looks for.
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<(), InvalidJob> {
    let reject = |reason| {
        Err(InvalidJob::Identifier {
            kind,
            value: crate::utils::sanitize_identifier(value),
            reason,
        })
    };

    let Some(first) = value.chars().next() else {
        return reject("must not be empty");
    };
    if value.len() > MAX_IDENTIFIER_LEN {
        return reject("longer than 63 characters");
    }
    if first.is_ascii_digit() {
        return reject("must not start with a digit");
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return reject("only letters, digits and underscores are allowed");
    }
    if value.chars().any(|c| c.is_ascii_uppercase()) {
        return reject("must be lower case (PostgreSQL folds unquoted names)");
    }
    Ok(())
}

/// One table move from `source_schema` to `target_schema`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    source_schema: String,
    target_schema: String,
    table_name: String,
}

impl BackupJob {
    pub fn new(
        source_schema: impl Into<String>,
        target_schema: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Result<Self, InvalidJob> {
        let job = Self {
            source_schema: source_schema.into(),
            target_schema: target_schema.into(),
            table_name: table_name.into(),
        };

        validate_identifier("source schema", &job.source_schema)?;
        validate_identifier("target schema", &job.target_schema)?;
        validate_identifier("table name", &job.table_name)?;
        if job.source_schema == job.target_schema {
            return Err(InvalidJob::SameSchema(job.source_schema));
        }

        Ok(job)
    }

    pub fn source_schema(&self) -> &str {
        &self.source_schema
    }

    pub fn target_schema(&self) -> &str {
        &self.target_schema
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// `source_schema.table_name`, the pattern replaced in the dump
    pub fn source_qualified(&self) -> String {
        format!("{}.{}", self.source_schema, self.table_name)
    }

    /// `target_schema.table_name`, the replacement text
    pub fn target_qualified(&self) -> String {
        format!("{}.{}", self.target_schema, self.table_name)
    }

    /// Artifact locations inside `work_dir`
    ///
    /// Names depend only on the table, so two jobs for the same table in the
    /// same directory overwrite each other's files.
    pub fn artifacts_in(&self, work_dir: &Path) -> ArtifactPaths {
        ArtifactPaths {
            dump: work_dir.join(format!("{}_backup.backup", self.table_name)),
            rewritten: work_dir.join(format!("{}_restore.sql", self.table_name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Raw pg_dump output
    pub dump: PathBuf,
    /// Dump with the schema qualifier rewritten
    pub rewritten: PathBuf,
}

impl ArtifactPaths {
    pub fn all(&self) -> [&Path; 2] {
        [self.dump.as_path(), self.rewritten.as_path()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_accepts_plain_identifiers() {
        let job = BackupJob::new("public", "public_test", "readings").unwrap();
        assert_eq!(job.source_qualified(), "public.readings");
        assert_eq!(job.target_qualified(), "public_test.readings");
        assert_eq!(job.table_name(), "readings");
    }

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("table name", "readings_2024").is_ok());
        assert!(validate_identifier("table name", "_staging").is_ok());
        assert!(validate_identifier("table name", "").is_err());
        assert!(validate_identifier("table name", "2024_readings").is_err());
        assert!(validate_identifier("table name", "read-ings").is_err());
        assert!(validate_identifier("table name", "../etc/passwd").is_err());
        assert!(validate_identifier("table name", "readings; DROP TABLE x").is_err());
        assert!(validate_identifier("table name", "lecturas_añejas").is_err());
        assert!(validate_identifier("table name", &"a".repeat(63)).is_ok());
        assert!(validate_identifier("table name", &"a".repeat(64)).is_err());
    }

    #[test]
    fn test_mixed_case_identifiers_rejected() {
        let err = BackupJob::new("public", "public_test", "Readings").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid table name 'Readings': must be lower case (PostgreSQL folds unquoted names)"
        );
        assert!(BackupJob::new("Public", "public_test", "readings").is_err());
        assert!(BackupJob::new("public", "PUBLIC_TEST", "readings").is_err());
    }

    #[test]
    fn test_invalid_identifier_message_names_field() {
        let err = BackupJob::new("public", "public test", "readings").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid target schema 'public test': only letters, digits and underscores are allowed"
        );
    }

    #[test]
    fn test_same_schema_rejected() {
        let err = BackupJob::new("public", "public", "readings").unwrap_err();
        assert_eq!(err, InvalidJob::SameSchema("public".to_string()));
    }

    #[test]
    fn test_artifact_paths_are_deterministic() {
        let job = BackupJob::new("public", "public_test", "readings").unwrap();
        let paths = job.artifacts_in(Path::new("/tmp/work"));
        assert_eq!(paths.dump, PathBuf::from("/tmp/work/readings_backup.backup"));
        assert_eq!(paths.rewritten, PathBuf::from("/tmp/work/readings_restore.sql"));
        assert_eq!(paths, job.artifacts_in(Path::new("/tmp/work")));
    }
}
