// ABOUTME: Literal schema-qualifier substitution inside a pg_dump artifact
// ABOUTME: Streams the dump line by line, replacing source.table with target.table

use crate::error::MoveError;
use crate::mover::job::{ArtifactPaths, BackupJob};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub replacements: usize,
    pub bytes_written: u64,
}

/// Replace every non-overlapping occurrence of `from` with `to`
///
/// Works on raw bytes so dumps in any server encoding pass through intact.
/// Returns the rewritten buffer and the number of replacements.
pub fn replace_literal(haystack: &[u8], from: &[u8], to: &[u8]) -> (Vec<u8>, usize) {
    if from.is_empty() || haystack.len() < from.len() {
        return (haystack.to_vec(), 0);
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut count = 0;
    let mut i = 0;
    while i + from.len() <= haystack.len() {
        if &haystack[i..i + from.len()] == from {
            out.extend_from_slice(to);
            i += from.len();
            count += 1;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out.extend_from_slice(&haystack[i..]);
    (out, count)
}

/// Rewrite the dump artifact into the restore artifact
///
/// This is a blind text substitution, not SQL-aware: the pattern also matches
/// longer names sharing the prefix (`public.readings_2024`) and string
/// literals that happen to contain it. Validated identifiers never contain a
/// newline, so matching per line finds exactly the occurrences a whole-file
/// pass would.
///
/// A dump without a single occurrence of the source name is an error: applying
/// it would replay statements against the source schema.
pub async fn rewrite_schema(
    job: &BackupJob,
    paths: &ArtifactPaths,
) -> Result<RewriteOutcome, MoveError> {
    let from = job.source_qualified();
    let to = job.target_qualified();
    tracing::info!(
        "Rewriting '{}' to '{}' in {}",
        from,
        to,
        paths.dump.display()
    );

    let outcome = rewrite_file(&paths.dump, &paths.rewritten, from.as_bytes(), to.as_bytes()).await?;

    if outcome.replacements == 0 {
        return Err(MoveError::NothingToRewrite {
            path: paths.dump.clone(),
            pattern: from,
        });
    }

    tracing::info!(
        "✓ Replaced {} occurrence(s), wrote {}",
        outcome.replacements,
        paths.rewritten.display()
    );
    Ok(outcome)
}

async fn rewrite_file(
    input: &Path,
    output: &Path,
    from: &[u8],
    to: &[u8],
) -> Result<RewriteOutcome, MoveError> {
    let read_err = |source| MoveError::Rewrite {
        path: input.to_path_buf(),
        source,
    };
    let write_err = |source| MoveError::Rewrite {
        path: output.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(input).await.map_err(read_err)?);
    let mut writer = BufWriter::new(File::create(output).await.map_err(write_err)?);

    let mut line = Vec::new();
    let mut replacements = 0;
    let mut bytes_written = 0u64;
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await.map_err(read_err)?;
        if read == 0 {
            break;
        }
        let (rewritten, count) = replace_literal(&line, from, to);
        replacements += count;
        bytes_written += rewritten.len() as u64;
        writer.write_all(&rewritten).await.map_err(write_err)?;
    }
    writer.flush().await.map_err(write_err)?;

    Ok(RewriteOutcome {
        replacements,
        bytes_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_replace_literal_counts() {
        let (out, n) = replace_literal(
            b"ALTER TABLE public.readings; SELECT * FROM public.readings",
            b"public.readings",
            b"public_test.readings",
        );
        assert_eq!(n, 2);
        assert_eq!(
            out,
            b"ALTER TABLE public_test.readings; SELECT * FROM public_test.readings".to_vec()
        );
    }

    #[test]
    fn test_replace_literal_is_blind_to_prefixes() {
        let (out, n) = replace_literal(
            b"public.readings_2024 'see public.readings'",
            b"public.readings",
            b"public_test.readings",
        );
        assert_eq!(n, 2);
        assert_eq!(out, b"public_test.readings_2024 'see public_test.readings'".to_vec());
    }

    #[test]
    fn test_replace_literal_no_match_and_edges() {
        assert_eq!(replace_literal(b"", b"a.b", b"c.b"), (Vec::new(), 0));
        assert_eq!(replace_literal(b"a.", b"a.b", b"c.b"), (b"a.".to_vec(), 0));
        assert_eq!(replace_literal(b"a.b", b"a.b", b"c.b"), (b"c.b".to_vec(), 1));
        assert_eq!(replace_literal(b"xyz", b"", b"q"), (b"xyz".to_vec(), 0));
        // Replacement text containing the pattern is not rescanned
        assert_eq!(replace_literal(b"a.b", b"a.b", b"a.b.a.b"), (b"a.b.a.b".to_vec(), 1));
    }

    #[test]
    fn test_replace_literal_keeps_non_utf8_bytes() {
        let input = [0xff, b'p', b'.', b't', 0xfe];
        let (out, n) = replace_literal(&input, b"p.t", b"q.t");
        assert_eq!(n, 1);
        assert_eq!(out, vec![0xff, b'q', b'.', b't', 0xfe]);
    }

    #[tokio::test]
    async fn test_rewrite_readings_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let job = BackupJob::new("public", "public_test", "readings").unwrap();
        let paths = job.artifacts_in(dir.path());

        let dump = "\
CREATE TABLE public.readings (\n    meter_id integer,\n    value numeric\n);\n\
ALTER TABLE public.readings OWNER TO analytics;\n\
COPY public.readings (meter_id, value) FROM stdin;\n\
1\t10.5\n\\.\n";
        std::fs::write(&paths.dump, dump).unwrap();

        let outcome = rewrite_schema(&job, &paths).await.unwrap();

        let rewritten = std::fs::read_to_string(&paths.rewritten).unwrap();
        assert_eq!(outcome.replacements, 3);
        assert_eq!(count(&rewritten, "public_test.readings"), 3);
        assert_eq!(count(&rewritten, "public.readings"), 0);
        assert_eq!(outcome.bytes_written, rewritten.len() as u64);
        assert!(rewritten.ends_with("1\t10.5\n\\.\n"));
    }

    #[tokio::test]
    async fn test_rewrite_preserves_missing_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let job = BackupJob::new("public", "public_test", "readings").unwrap();
        let paths = job.artifacts_in(dir.path());
        std::fs::write(&paths.dump, "line one\nDROP TABLE public.readings").unwrap();

        rewrite_schema(&job, &paths).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&paths.rewritten).unwrap(),
            "line one\nDROP TABLE public_test.readings"
        );
    }

    #[tokio::test]
    async fn test_rewrite_without_source_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        let job = BackupJob::new("public", "public_test", "readings").unwrap();
        let paths = job.artifacts_in(dir.path());
        std::fs::write(
            &paths.dump,
            "CREATE TABLE public.other (id int);\nCOPY public.other (id) FROM stdin;\n",
        )
        .unwrap();

        let err = rewrite_schema(&job, &paths).await.unwrap_err();

        assert!(err.is_rewrite());
        assert!(matches!(
            &err,
            MoveError::NothingToRewrite { pattern, .. } if pattern == "public.readings"
        ));
    }

    #[tokio::test]
    async fn test_rewrite_missing_dump_is_rewrite_error() {
        let dir = tempfile::tempdir().unwrap();
        let job = BackupJob::new("public", "public_test", "readings").unwrap();
        let paths = job.artifacts_in(dir.path());

        let err = rewrite_schema(&job, &paths).await.unwrap_err();

        assert!(err.is_rewrite());
        assert!(err.to_string().contains("readings_backup.backup"));
        assert!(!paths.rewritten.exists());
    }
}
