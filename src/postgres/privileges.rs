// ABOUTME: Privilege checking utilities for table move prerequisites
// ABOUTME: Validates the source table is readable and the target schema writable

use anyhow::{Context, Result};
use tokio_postgres::Client;

/// What the connected user may do with the tables involved in a move
pub struct PrivilegeCheck {
    /// SELECT on the source table (pg_dump needs it)
    pub can_select: bool,
    /// CREATE on the target schema (the restore creates the table)
    pub can_create: bool,
    /// User is a superuser (bypasses other privilege requirements)
    pub is_superuser: bool,
}

/// Check the connected user can read `schema.table`
///
/// The table must exist; `has_table_privilege` raises an error otherwise.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use postgres_table_mover::config::ConnectionConfig;
/// # use postgres_table_mover::postgres::{connect, check_source_privileges};
/// # async fn example() -> Result<()> {
/// let client = connect(&ConnectionConfig::default()).await?;
/// let privs = check_source_privileges(&client, "public", "readings").await?;
/// assert!(privs.can_select || privs.is_superuser);
/// # Ok(())
/// # }
/// ```
pub async fn check_source_privileges(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<PrivilegeCheck> {
    let qualified = format!("{}.{}", schema, table);
    let row = client
        .query_one(
            "SELECT
                pg_catalog.has_table_privilege(current_user, $1, 'SELECT'),
                rolsuper
             FROM pg_catalog.pg_roles
             WHERE rolname = current_user",
            &[&qualified],
        )
        .await
        .with_context(|| format!("Failed to query privileges on {}", qualified))?;

    Ok(PrivilegeCheck {
        can_select: row.get(0),
        can_create: false,
        is_superuser: row.get(1),
    })
}

/// Check the connected user can create objects in `schema`
///
/// The schema must exist; `has_schema_privilege` raises an error otherwise.
pub async fn check_target_privileges(client: &Client, schema: &str) -> Result<PrivilegeCheck> {
    let row = client
        .query_one(
            "SELECT
                pg_catalog.has_schema_privilege(current_user, $1, 'CREATE'),
                rolsuper
             FROM pg_catalog.pg_roles
             WHERE rolname = current_user",
            &[&schema],
        )
        .await
        .with_context(|| format!("Failed to query privileges on schema {}", schema))?;

    Ok(PrivilegeCheck {
        can_select: false,
        can_create: row.get(0),
        is_superuser: row.get(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, ConnectionOverrides};
    use crate::postgres::connect;

    async fn env_client() -> Client {
        let mut conn = ConnectionConfig::default();
        ConnectionOverrides::from_env().unwrap().apply_to(&mut conn);
        connect(&conn).await.unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_check_source_privileges() {
        let client = env_client().await;

        let privileges = check_source_privileges(&client, "pg_catalog", "pg_class")
            .await
            .unwrap();

        assert!(privileges.can_select || privileges.is_superuser);
    }

    #[tokio::test]
    #[ignore]
    async fn test_check_target_privileges() {
        let client = env_client().await;

        let privileges = check_target_privileges(&client, "pg_catalog").await.unwrap();

        // Nobody but a superuser may create objects in pg_catalog
        assert_eq!(privileges.can_create, privileges.is_superuser);
    }
}
