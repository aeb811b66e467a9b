// ABOUTME: PostgreSQL connection utilities for preflight checks
// ABOUTME: Handles TLS setup, friendly error messages, and connection retry

use crate::config::ConnectionConfig;
use crate::utils;
use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

/// Connect to PostgreSQL with TLS support
///
/// TLS is negotiated when the server offers it (`sslmode=prefer`), so plain
/// on-premise servers work too.
pub async fn connect(conn: &ConnectionConfig) -> Result<Client> {
    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(tls_connector);

    let mut config = conn.to_pg_config();
    config.connect_timeout(Duration::from_secs(10));

    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| explain_connect_error(conn, &e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    Ok(client)
}

fn explain_connect_error(conn: &ConnectionConfig, error_msg: &str) -> anyhow::Error {
    if error_msg.contains("password authentication failed") {
        anyhow::anyhow!(
            "Authentication failed for {}: Invalid username or password.\n\
             Please verify PG_USER and PGPASSWORD.",
            conn
        )
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        anyhow::anyhow!(
            "Database does not exist: {}\n\
             Please check PG_DB or --dbname.",
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect")
    {
        anyhow::anyhow!(
            "Connection refused: Unable to reach {}.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            conn,
            error_msg
        )
    } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
        anyhow::anyhow!(
            "Connection timeout: {} did not respond in time.\n\
             Error: {}",
            conn,
            error_msg
        )
    } else if error_msg.contains("no pg_hba.conf entry") {
        anyhow::anyhow!(
            "Access denied: No pg_hba.conf entry for this host.\n\
             Contact your database administrator to update pg_hba.conf.\n\
             Error: {}",
            error_msg
        )
    } else {
        anyhow::anyhow!("Failed to connect to {}: {}", conn, error_msg)
    }
}

/// Connect with automatic retry for transient failures
pub async fn connect_with_retry(conn: &ConnectionConfig) -> Result<Client> {
    utils::retry_with_backoff(
        || connect(conn),
        3,                      // Max 3 retries
        Duration::from_secs(1), // Start with 1 second delay
    )
    .await
    .context("Failed to connect after retries")
}
