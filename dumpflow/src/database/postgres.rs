//! `sqlx` backed introspection and administration.

use super::{validate_database_name, DatabaseAdmin, ManifestSource};
use crate::config::PostgresSettings;
use crate::context::Manifest;
use crate::errors::StageError;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Installed components and their versions.
pub const SQL_SELECT_MODULES: &str =
    "SELECT name, latest_version FROM ir_module_module WHERE state = 'installed'";

fn connect_options(settings: &PostgresSettings, database: &str) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .database(database);
    if let Some(user) = &settings.user {
        options = options.username(user);
    }
    if let Some(password) = &settings.password {
        options = options.password(password);
    }
    options
}

async fn connect(settings: &PostgresSettings, database: &str) -> Result<PgConnection, StageError> {
    PgConnection::connect_with(&connect_options(settings, database))
        .await
        .map_err(|e| {
            StageError::connectivity(format!(
                "could not connect to database '{database}' on {}:{}: {e}",
                settings.host, settings.port
            ))
        })
}

fn query_error(err: sqlx::Error) -> StageError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StageError::connectivity(err.to_string())
        }
        other => StageError::failure(format!("query failed: {other}")),
    }
}

/// Reads manifests over a direct connection.
#[derive(Debug, Clone)]
pub struct PostgresIntrospector {
    settings: PostgresSettings,
}

impl PostgresIntrospector {
    /// Creates an introspector.
    #[must_use]
    pub fn new(settings: PostgresSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ManifestSource for PostgresIntrospector {
    async fn introspect(&self, db_name: &str) -> Result<Manifest, StageError> {
        let mut conn = connect(&self.settings, db_name).await?;

        let server_version: String = sqlx::query_scalar("SHOW server_version_num")
            .fetch_one(&mut conn)
            .await
            .map_err(query_error)?;
        let server_version_num = server_version
            .trim()
            .parse::<i64>()
            .map_err(|e| StageError::failure(format!("bad server_version_num '{server_version}': {e}")))?;

        let current: String = sqlx::query_scalar("SELECT current_database()")
            .fetch_one(&mut conn)
            .await
            .map_err(query_error)?;

        let rows: Vec<(String, Option<String>)> = sqlx::query_as(SQL_SELECT_MODULES)
            .fetch_all(&mut conn)
            .await
            .map_err(query_error)?;
        let modules: BTreeMap<String, String> = rows
            .into_iter()
            .map(|(name, version)| (name, version.unwrap_or_default()))
            .collect();

        if let Err(err) = conn.close().await {
            debug!(error = %err, "Closing introspection connection failed");
        }

        debug!(db_name = %current, modules = modules.len(), server_version_num, "Introspected database");
        Ok(Manifest::new(current, server_version_num, modules))
    }
}

/// Creates databases through the maintenance database.
#[derive(Debug, Clone)]
pub struct PostgresAdmin {
    settings: PostgresSettings,
}

impl PostgresAdmin {
    /// Creates an admin client.
    #[must_use]
    pub fn new(settings: PostgresSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DatabaseAdmin for PostgresAdmin {
    async fn create_database(&self, name: &str) -> Result<(), StageError> {
        validate_database_name(name)?;

        let mut conn = connect(&self.settings, &self.settings.maintenance_db).await?;
        let statement = format!("CREATE DATABASE \"{name}\"");
        sqlx::query(&statement)
            .execute(&mut conn)
            .await
            .map_err(query_error)?;

        if let Err(err) = conn.close().await {
            debug!(error = %err, "Closing admin connection failed");
        }

        info!(database = name, "Created database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_database_rejects_bad_name_before_connecting() {
        let admin = PostgresAdmin::new(PostgresSettings {
            host: "invalid.localdomain".to_string(),
            ..PostgresSettings::default()
        });
        let err = admin.create_database("x\"; --").await.unwrap_err();
        assert_eq!(err.kind(), "StageFailure");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_connectivity_error() {
        let introspector = PostgresIntrospector::new(PostgresSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..PostgresSettings::default()
        });
        let err = introspector.introspect("erp").await.unwrap_err();
        assert_eq!(err.kind(), "ConnectivityError");
    }
}
