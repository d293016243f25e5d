//! Connection configuration and store connectors.
//!
//! A [`ConnectionConfig`] names a store target without prescribing how to
//! reach it; a [`StoreConnector`] turns a config into a live store
//! handle. Connection establishment is the only operation this layer ever
//! retries (see [`crate::metadata::Metadata::connect`]): concurrent
//! processes racing to run first-time schema DDL can make it fail
//! transiently.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::interface::{MetadataStore, StoreError};
use super::memory::InMemoryMetadataStore;

/// Open mode for a file-backed store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteConnectionMode {
    /// Open an existing database read-only.
    ReadOnly,
    /// Open an existing database read-write.
    ReadWrite,
    /// Open read-write, creating the database when absent.
    ReadWriteOpenCreate,
}

/// Configuration for reaching a metadata store.
///
/// Opaque to the rest of this layer beyond being handed to a
/// [`StoreConnector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionConfig {
    /// A local embedded-database file.
    Sqlite {
        /// Path to the database file.
        filename_uri: String,
        /// Open mode.
        connection_mode: SqliteConnectionMode,
    },
    /// A network database target.
    Mysql {
        /// The name or network address of the database instance.
        host: String,
        /// The port the database listens on.
        port: u16,
        /// The name of the database to use.
        database: String,
        /// The login account.
        username: String,
        /// The password for the account.
        password: String,
    },
}

impl ConnectionConfig {
    /// Convenience constructor for a file-based store config.
    ///
    /// The parent directory of `metadata_db_uri` is created if missing,
    /// and the database is opened read/write-create.
    pub fn sqlite(metadata_db_uri: impl Into<String>) -> std::io::Result<Self> {
        let filename_uri = metadata_db_uri.into();
        if let Some(parent) = Path::new(&filename_uri).parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::Sqlite {
            filename_uri,
            connection_mode: SqliteConnectionMode::ReadWriteOpenCreate,
        })
    }

    /// Convenience constructor for a network database config.
    #[must_use]
    pub fn mysql(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::Mysql {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// A stable key identifying the database this config reaches.
    ///
    /// Two configs with the same target key address the same store.
    #[must_use]
    pub fn target_key(&self) -> String {
        match self {
            Self::Sqlite { filename_uri, .. } => format!("sqlite:{filename_uri}"),
            Self::Mysql {
                host,
                port,
                database,
                ..
            } => format!("mysql:{host}:{port}/{database}"),
        }
    }
}

/// Opens metadata stores for connection configs.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Opens (or joins) the store the config addresses.
    ///
    /// A transient failure is reported as [`StoreError::Unavailable`];
    /// anything else is terminal.
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn MetadataStore>, StoreError>;
}

/// A connector that keeps one shared [`InMemoryMetadataStore`] per
/// config target.
///
/// Clones share the registry, so concurrent "connections" to the same
/// target observe the same store state, the same sharing a real
/// database would give.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    databases: Arc<DashMap<String, Arc<InMemoryMetadataStore>>>,
}

impl InMemoryConnector {
    /// Creates a connector with an empty database registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct targets opened so far.
    #[must_use]
    pub fn database_count(&self) -> usize {
        self.databases.len()
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn MetadataStore>, StoreError> {
        let store = self
            .databases
            .entry(config.target_key())
            .or_insert_with(|| Arc::new(InMemoryMetadataStore::new()))
            .clone();
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_config_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/metadata.db");
        let config = ConnectionConfig::sqlite(db_path.to_string_lossy()).unwrap();
        assert!(db_path.parent().unwrap().is_dir());
        assert!(matches!(
            config,
            ConnectionConfig::Sqlite {
                connection_mode: SqliteConnectionMode::ReadWriteOpenCreate,
                ..
            }
        ));
    }

    #[test]
    fn test_target_keys() {
        let sqlite = ConnectionConfig::Sqlite {
            filename_uri: "/tmp/m.db".to_string(),
            connection_mode: SqliteConnectionMode::ReadWriteOpenCreate,
        };
        assert_eq!(sqlite.target_key(), "sqlite:/tmp/m.db");

        let mysql = ConnectionConfig::mysql("db.internal", 3306, "metadata", "svc", "secret");
        assert_eq!(mysql.target_key(), "mysql:db.internal:3306/metadata");
    }

    #[tokio::test]
    async fn test_same_target_shares_store() {
        let connector = InMemoryConnector::new();
        let config = ConnectionConfig::mysql("db", 3306, "metadata", "svc", "secret");
        let first = connector.open(&config).await.unwrap();
        let second = connector.open(&config).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.database_count(), 1);
    }

    #[tokio::test]
    async fn test_different_targets_are_isolated() {
        let connector = InMemoryConnector::new();
        let a = connector
            .open(&ConnectionConfig::mysql("db", 3306, "a", "svc", "s"))
            .await
            .unwrap();
        let b = connector
            .open(&ConnectionConfig::mysql("db", 3306, "b", "svc", "s"))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(connector.database_count(), 2);
    }
}
