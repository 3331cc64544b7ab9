//! Configuration for the storage layer and server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Environment variable selecting the store location.
pub const DB_ENV: &str = "PATCHLOG_DB";

/// Environment variable selecting the listen port.
pub const PORT_ENV: &str = "PATCHLOG_PORT";

/// Storage configuration for persisted records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Conversation table name.
    pub conversation_table: String,
    /// Template table name.
    pub template_table: String,
    /// Object table name.
    pub object_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("patchlog.sqlite"),
            conversation_table: "conversations".to_string(),
            template_table: "templates".to_string(),
            object_table: "objects".to_string(),
        }
    }
}

impl StorageConfig {
    /// Build a configuration from the environment.
    ///
    /// Reads [`DB_ENV`] for the database path; everything else keeps its
    /// default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(DB_ENV) {
            config.sqlite_path = PathBuf::from(path);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_local_file() {
        let config = StorageConfig::default();
        assert_eq!(config.sqlite_path, PathBuf::from("patchlog.sqlite"));
        assert_eq!(config.conversation_table, "conversations");
    }
}
