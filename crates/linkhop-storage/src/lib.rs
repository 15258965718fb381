//! Storage backends for the linkhop registry.
//!
//! Three variants implement [`linkhop_core::Backend`]: a volatile map, an
//! append-only JSON-lines log and a MySQL store. [`BackendConfig`] picks one
//! once at startup.

pub mod file;
pub mod memory;
pub mod mysql;

use std::path::PathBuf;
use std::sync::Arc;

use linkhop_core::{Backend, Result};
use tracing::info;

pub use file::{FileLogBackend, ReplayStats};
pub use memory::InMemoryBackend;
pub use mysql::{MySqlBackend, MySqlBackendOptions};

/// Which backend variant to run, decided from configuration.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Memory,
    FileLog {
        path: PathBuf,
    },
    MySql {
        dsn: String,
        options: MySqlBackendOptions,
    },
}

impl BackendConfig {
    /// Selects a variant: a DSN wins over a file path, and with neither the
    /// links only live in memory. Blank values count as absent.
    pub fn from_options(
        database_dsn: Option<&str>,
        file_storage_path: Option<&str>,
        options: MySqlBackendOptions,
    ) -> Self {
        let present = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        if let Some(dsn) = present(database_dsn) {
            return Self::MySql { dsn, options };
        }
        if let Some(path) = present(file_storage_path) {
            return Self::FileLog { path: path.into() };
        }
        Self::Memory
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::FileLog { .. } => "file",
            Self::MySql { .. } => "mysql",
        }
    }

    /// Builds the backend. State is not loaded until [`Backend::restore`].
    pub async fn connect(&self) -> Result<Arc<dyn Backend>> {
        info!(backend = self.kind(), "connecting storage backend");

        let backend: Arc<dyn Backend> = match self {
            Self::Memory => Arc::new(InMemoryBackend::new()),
            Self::FileLog { path } => Arc::new(FileLogBackend::open(path).await?),
            Self::MySql { dsn, options } => {
                Arc::new(MySqlBackend::connect(dsn, options.clone()).await?)
            }
        };

        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_takes_precedence() {
        let config = BackendConfig::from_options(
            Some("mysql://u:p@localhost/db"),
            Some("/tmp/links.json"),
            MySqlBackendOptions::default(),
        );
        assert_eq!(config.kind(), "mysql");
    }

    #[test]
    fn file_path_selects_log() {
        let config =
            BackendConfig::from_options(Some("  "), Some("/tmp/links.json"), Default::default());
        assert!(matches!(config, BackendConfig::FileLog { ref path } if path.ends_with("links.json")));
    }

    #[test]
    fn falls_back_to_memory() {
        let config = BackendConfig::from_options(None, Some(""), Default::default());
        assert_eq!(config.kind(), "memory");
    }

    #[tokio::test]
    async fn connects_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig::FileLog {
            path: dir.path().join("links.json"),
        };

        let backend = config.connect().await.unwrap();
        backend.restore().await.unwrap();
        assert!(backend.health_check().await.unwrap_err().is_unsupported());
    }
}
