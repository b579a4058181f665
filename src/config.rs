//! Engine configuration: defaults, then a TOML file, then `MIMICDB_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::document::{IdGenerator, ObjectIdGenerator, UuidGenerator};
use crate::errors::DbError;

/// How `_id` values are generated for documents inserted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    ObjectId,
    Uuid,
}

impl IdStrategy {
    fn parse(s: &str) -> Result<Self, DbError> {
        match s.to_ascii_lowercase().as_str() {
            "object_id" | "objectid" => Ok(Self::ObjectId),
            "uuid" => Ok(Self::Uuid),
            other => Err(DbError::Config(format!("unknown id strategy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling log files; console output when unset.
    pub dir: Option<PathBuf>,
    /// error|warn|info|debug|trace
    pub level: String,
    /// Number of rolled files to keep.
    pub retention: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: None, level: "info".to_string(), retention: 7 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub id_strategy: IdStrategy,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// # Errors
    /// Returns `DbError::Config` when the text is not a valid configuration.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        toml::from_str(s).map_err(|e| DbError::Config(e.to_string()))
    }

    /// Reads `path` and applies environment overrides on top.
    ///
    /// # Errors
    /// `DbError::Io` if the file cannot be read, `DbError::Config` if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)?;
        let mut cfg = Self::from_toml_str(&text)?;
        cfg.apply_env()?;
        log::debug!("configuration loaded from {}", path.display());
        Ok(cfg)
    }

    /// Overrides fields from `MIMICDB_ID_STRATEGY`, `MIMICDB_LOG_DIR`, `MIMICDB_LOG_LEVEL`
    /// and `MIMICDB_LOG_RETENTION`.
    ///
    /// # Errors
    /// Returns `DbError::Config` for an unparseable value.
    pub fn apply_env(&mut self) -> Result<(), DbError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), DbError> {
        if let Some(s) = var("MIMICDB_ID_STRATEGY") {
            self.id_strategy = IdStrategy::parse(&s)?;
        }
        if let Some(s) = var("MIMICDB_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(s));
        }
        if let Some(s) = var("MIMICDB_LOG_LEVEL") {
            self.logging.level = s;
        }
        if let Some(s) = var("MIMICDB_LOG_RETENTION") {
            self.logging.retention = s
                .parse()
                .map_err(|_| DbError::Config(format!("invalid MIMICDB_LOG_RETENTION '{s}'")))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn id_generator(&self) -> Box<dyn IdGenerator> {
        match self.id_strategy {
            IdStrategy::ObjectId => Box::new(ObjectIdGenerator),
            IdStrategy::Uuid => Box::new(UuidGenerator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;
    use std::collections::HashMap;

    #[test]
    fn defaults_and_partial_toml() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        let cfg = EngineConfig::from_toml_str("id_strategy = \"uuid\"\n[logging]\nlevel = \"debug\"")
            .unwrap();
        assert_eq!(cfg.id_strategy, IdStrategy::Uuid);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.retention, 7);
        assert!(matches!(cfg.id_generator().generate(), Bson::String(_)));
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("id_strategy = \"sequential\""),
            Err(DbError::Config(_))
        ));
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("MIMICDB_ID_STRATEGY", "uuid"),
            ("MIMICDB_LOG_DIR", "/tmp/logs"),
            ("MIMICDB_LOG_RETENTION", "3"),
        ]);
        let mut cfg = EngineConfig::default();
        cfg.apply_vars(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.id_strategy, IdStrategy::Uuid);
        assert_eq!(cfg.logging.dir, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(cfg.logging.retention, 3);
        assert!(cfg.apply_vars(|_| Some("many".to_string())).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mimicdb.toml");
        std::fs::write(&path, "[logging]\nretention = 2\n").unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.logging.retention, 2);
        assert!(matches!(EngineConfig::load(&dir.path().join("missing.toml")), Err(DbError::Io(_))));
    }
}
