// ABOUTME: Store factory selecting the backend from the configured database URL
// ABOUTME: Memory maps for development, SQLite for persistence across restarts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use gatekeeper_core::errors::{AppError, AppResult};
use tracing::info;

use super::{MemoryStore, SqliteStore, Stores};
use crate::config::environment::DatabaseUrl;

/// Build the store bundle for `database`
///
/// # Errors
/// Returns error if the SQLite database cannot be opened or migrated
pub async fn create_stores(database: &DatabaseUrl) -> AppResult<Stores> {
    match database {
        DatabaseUrl::Memory => {
            info!("Using in-memory stores");
            Ok(Stores::from_backend(Arc::new(MemoryStore::new())))
        }
        DatabaseUrl::SQLite { path } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::database(format!(
                        "Cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            info!(path = %path.display(), "Using SQLite stores");
            // mode=rwc creates the file on first start
            let connection = format!("{}?mode=rwc", database.to_connection_string());
            Ok(Stores::from_backend(Arc::new(
                SqliteStore::connect(&connection).await?,
            )))
        }
        DatabaseUrl::SQLiteMemory => {
            info!("Using in-memory SQLite stores");
            Ok(Stores::from_backend(Arc::new(
                SqliteStore::connect(&database.to_connection_string()).await?,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatekeeper_core::models::RefreshTokenRecord;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_file_database_persists_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let database = DatabaseUrl::SQLite {
            path: dir.path().join("nested/gatekeeper.db"),
        };
        let now = Utc::now();
        let record = RefreshTokenRecord {
            jti: "jti-1".to_owned(),
            user_id: Uuid::new_v4(),
            client_id: "client".to_owned(),
            scope: "openid".to_owned(),
            issued_at: now,
            expires_at: now + chrono::Duration::days(1),
        };

        let first = create_stores(&database).await.unwrap();
        first.refresh_tokens.store_refresh_token(&record).await.unwrap();
        drop(first);

        let second = create_stores(&database).await.unwrap();
        let found = second.refresh_tokens.consume_refresh_token("jti-1").await.unwrap();
        assert_eq!(found.map(|r| r.user_id), Some(record.user_id));
    }
}
