//! LanceDB connection wrapper for table lifecycle.
//!
//! Provides `LanceVectorStore` which wraps a `lancedb::Connection` and offers
//! helper methods for table lifecycle (create, open, drop) using Arrow schemas.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_schema::Schema;
use tether_types::memory::UserId;

/// Result of [`LanceVectorStore::create_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Created,
    /// Another creator got there first; the existing table was opened.
    Existing,
}

/// LanceDB vector store wrapper for connection and table management.
///
/// Manages a single LanceDB connection at a filesystem path.
/// Each user gets an intervention table (`interventions_{user_id}`) and
/// a reflection table (`reflections_{user_id}`).
pub struct LanceVectorStore {
    db: lancedb::Connection,
    base_path: PathBuf,
}

impl LanceVectorStore {
    /// Open or create a LanceDB vector store at the given path.
    ///
    /// Creates the directory if it does not exist.
    pub async fn new(base_path: PathBuf) -> Result<Self, lancedb::Error> {
        std::fs::create_dir_all(&base_path).map_err(|e| lancedb::Error::CreateDir {
            path: base_path.display().to_string(),
            source: e,
        })?;

        let uri = base_path
            .to_str()
            .ok_or_else(|| lancedb::Error::InvalidInput {
                message: format!("Path contains invalid UTF-8: {}", base_path.display()),
            })?;

        let db = lancedb::connect(uri).execute().await?;

        Ok(Self { db, base_path })
    }

    /// Open the store under `{data_dir}/vector_store`.
    pub async fn in_data_dir(data_dir: &Path) -> Result<Self, lancedb::Error> {
        Self::new(data_dir.join("vector_store")).await
    }

    /// Create an empty table, treating "already exists" as success.
    ///
    /// Concurrent creators race on the engine's create; the first wins and
    /// everyone else opens the winner's table.
    pub async fn create_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<(lancedb::Table, TableStatus), lancedb::Error> {
        match self.db.create_empty_table(table_name, schema).execute().await {
            Ok(table) => Ok((table, TableStatus::Created)),
            Err(lancedb::Error::TableAlreadyExists { .. }) => {
                let table = self.db.open_table(table_name).execute().await?;
                Ok((table, TableStatus::Existing))
            }
            Err(e) => Err(e),
        }
    }

    /// Open a table, creating it empty if missing.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<lancedb::Table, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                self.create_table(table_name, schema).await.map(|(t, _)| t)
            }
            Err(e) => Err(e),
        }
    }

    /// Open a table if it exists.
    pub async fn open_table(&self, table_name: &str) -> Result<Option<lancedb::Table>, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if a table exists in the database.
    pub async fn table_exists(&self, table_name: &str) -> bool {
        self.db.open_table(table_name).execute().await.is_ok()
    }

    /// Drop a table from the database.
    ///
    /// Returns Ok(()) even if the table does not exist (idempotent).
    pub async fn drop_table(&self, table_name: &str) -> Result<(), lancedb::Error> {
        match self.db.drop_table(table_name, &[]).await {
            Ok(()) => Ok(()),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// List all table names in the database.
    pub async fn table_names(&self) -> Result<Vec<String>, lancedb::Error> {
        self.db.table_names().execute().await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn interventions_table_name(user_id: &UserId) -> String {
        format!("interventions_{user_id}")
    }

    pub fn reflections_table_name(user_id: &UserId) -> String {
        format!("reflections_{user_id}")
    }
}
