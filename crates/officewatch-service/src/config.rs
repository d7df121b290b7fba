//! Service configuration.
//!
//! Loaded from a TOML file with environment overrides
//! (`OFFICEWATCH_*`), falling back to defaults when the file is
//! missing. `.env` files are honored via `dotenvy` in the binary.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ServiceError, ServiceResult};

/// Default subscription snapshot TTL, seconds.
const DEFAULT_CACHE_TTL_SECS: u64 = 60;

/// Default issued-token lifetime, seconds (30 minutes).
const DEFAULT_TOKEN_TTL_SECS: i64 = 1800;

/// Top-level service settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the database and uploads.
    pub data_dir: PathBuf,
    /// SQLite file path. Defaults to `<data_dir>/officewatch.db`.
    pub db_path: Option<PathBuf>,
    /// Upload staging area. Defaults to `<data_dir>/uploads`.
    pub upload_dir: Option<PathBuf>,
    /// Secret for credential signing. Override in any real deployment.
    pub token_secret: String,
    /// Issued-token lifetime, seconds.
    pub token_ttl_secs: i64,
    /// Snapshot cache entry lifetime, seconds.
    pub cache_ttl_secs: u64,
    /// Snapshot cache capacity, entries.
    pub cache_capacity: u64,
    /// Disable the snapshot cache entirely (always-miss mode).
    pub cache_disabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_path: None,
            upload_dir: None,
            token_secret: "change-me".to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_capacity: 1024,
            cache_disabled: false,
        }
    }
}

impl Config {
    /// Load from `path`, then apply `OFFICEWATCH_*` env overrides. A
    /// missing file yields the defaults; a malformed file is an error.
    pub fn load(path: &Path) -> ServiceResult<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ServiceError::Internal(format!("config parse failed ({}): {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(ServiceError::Internal(format!(
                    "config read failed ({}): {e}",
                    path.display()
                )));
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Effective database path.
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("officewatch.db"))
    }

    /// Effective upload staging directory.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("OFFICEWATCH_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("OFFICEWATCH_DB_PATH") {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("OFFICEWATCH_UPLOAD_DIR") {
            self.upload_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("OFFICEWATCH_TOKEN_SECRET") {
            self.token_secret = v;
        }
        if let Ok(v) = std::env::var("OFFICEWATCH_TOKEN_TTL_SECS")
            && let Ok(secs) = v.parse()
        {
            self.token_ttl_secs = secs;
        }
        if let Ok(v) = std::env::var("OFFICEWATCH_CACHE_TTL_SECS")
            && let Ok(secs) = v.parse()
        {
            self.cache_ttl_secs = secs;
        }
        if let Ok(v) = std::env::var("OFFICEWATCH_CACHE_DISABLED") {
            self.cache_disabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.db_path(), PathBuf::from("data/officewatch.db"));
        assert_eq!(config.upload_dir(), PathBuf::from("data/uploads"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("officewatch.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/var/lib/officewatch"
token_ttl_secs = 600
cache_capacity = 32
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/officewatch"));
        assert_eq!(config.token_ttl_secs, 600);
        assert_eq!(config.cache_capacity, 32);
        // Untouched keys keep their defaults.
        assert_eq!(config.cache_ttl_secs, 60);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "data_dir = [not toml").unwrap();

        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.toml");
        std::fs::write(&path, "cache_ttl_seconds = 10").unwrap();

        assert!(Config::load(&path).is_err());
    }
}
