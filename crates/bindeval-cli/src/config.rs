//! TOML configuration for the `bindeval` binary.
//!
//! Every field has a default reproducing the historical layout, so an empty
//! file (or no file at all) is a valid configuration for a directory remote.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bindeval_core::{JoinKey, BINDER_FASTA_FILE, LEDGER_FILE};
use bindeval_state::{DirRemoteStore, RemoteStore, S3LikeRemoteStore};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("remote credentials missing: environment variable {0} is not set")]
    MissingCredential(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKind {
    /// A mounted or synced directory tree.
    #[default]
    Dir,
    /// S3-compatible object store over HTTP.
    S3,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub kind: RemoteKind,
    /// Root directory for `kind = "dir"`.
    pub root: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    /// Environment variable holding the bearer token.
    pub token_env: Option<String>,
    /// Prefix below which every folder is a work unit.
    pub prefix: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kind: RemoteKind::Dir,
            root: None,
            endpoint: None,
            bucket: Some("bindcraft".to_string()),
            token_env: None,
            prefix: "snake-venom-binder/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Local mirror of the remote work units.
    pub work_dir: PathBuf,
    pub ledger: PathBuf,
    pub binder_fasta: PathBuf,
    pub job_inputs: PathBuf,
    pub results: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            ledger: PathBuf::from(LEDGER_FILE),
            binder_fasta: PathBuf::from(BINDER_FASTA_FILE),
            job_inputs: PathBuf::from("fasta_files_for_alphafold"),
            results: PathBuf::from("alphafold_results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Argument vector; `{input}`, `{out_dir}` and `{name}` are substituted.
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    /// Age after which another submitter's claim is considered abandoned.
    pub claim_stale_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: [
                "modal",
                "run",
                "./modal_alphafold.py",
                "--input-fasta",
                "{input}",
                "--out-dir",
                "{out_dir}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            env: BTreeMap::from([("GPU".to_string(), "H100".to_string())]),
            timeout_secs: 20 * 60,
            max_concurrent_jobs: 1,
            claim_stale_secs: 2 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_parallel_units: usize,
    pub join_key: JoinKey,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_units: 1,
            join_key: JoinKey::BinderSequence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub remote: RemoteConfig,
    pub paths: PathsConfig,
    pub engine: EngineConfig,
    pub pipeline: PipelineConfig,
}

impl EvalConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file; using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.engine.command.iter().all(|a| a.trim().is_empty()) {
            return invalid("engine.command must not be empty");
        }
        if self.engine.max_concurrent_jobs == 0 {
            return invalid("engine.max_concurrent_jobs must be at least 1");
        }
        if self.engine.timeout_secs == 0 {
            return invalid("engine.timeout_secs must be at least 1");
        }
        if self.pipeline.max_parallel_units == 0 {
            return invalid("pipeline.max_parallel_units must be at least 1");
        }
        match self.remote.kind {
            RemoteKind::Dir if self.remote.root.is_none() => {
                invalid("remote.root is required for a dir remote")
            }
            RemoteKind::S3 if self.remote.endpoint.as_deref().unwrap_or("").is_empty() => {
                invalid("remote.endpoint is required for an s3 remote")
            }
            RemoteKind::S3 if self.remote.bucket.as_deref().unwrap_or("").is_empty() => {
                invalid("remote.bucket is required for an s3 remote")
            }
            _ => Ok(()),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.timeout_secs)
    }

    pub fn claim_stale_after(&self) -> Duration {
        Duration::from_secs(self.engine.claim_stale_secs)
    }

    /// Build the configured remote. Reads the bearer token from the
    /// environment; a named but unset variable is a configuration error.
    pub fn remote_store(&self) -> Result<Arc<dyn RemoteStore>, ConfigError> {
        self.validate()?;
        let remote = &self.remote;
        match remote.kind {
            RemoteKind::Dir => {
                let root = remote.root.clone().unwrap_or_default();
                Ok(Arc::new(DirRemoteStore::new(root)))
            }
            RemoteKind::S3 => {
                let token = match &remote.token_env {
                    Some(var) => Some(
                        std::env::var(var)
                            .map_err(|_| ConfigError::MissingCredential(var.clone()))?,
                    ),
                    None => None,
                };
                let store = S3LikeRemoteStore::new(
                    remote.endpoint.clone().unwrap_or_default(),
                    remote.bucket.clone().unwrap_or_default(),
                )
                .with_bearer_token(token);
                Ok(Arc::new(store))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_historical_defaults() {
        let config = EvalConfig::from_toml("").unwrap();
        assert_eq!(config.remote.prefix, "snake-venom-binder/");
        assert_eq!(config.paths.ledger, PathBuf::from("final_results.csv"));
        assert_eq!(
            config.paths.binder_fasta,
            PathBuf::from("all_binder_fastas.fasta")
        );
        assert_eq!(config.paths.results, PathBuf::from("alphafold_results"));
        assert_eq!(config.engine.timeout_secs, 1200);
        assert_eq!(config.pipeline.join_key, JoinKey::BinderSequence);
    }

    #[test]
    fn test_parses_full_file() {
        let config = EvalConfig::from_toml(
            r#"
            [remote]
            kind = "s3"
            endpoint = "https://objects.example.org"
            bucket = "bindcraft"
            token_env = "BINDEVAL_TEST_TOKEN"
            prefix = "runs/"

            [paths]
            work_dir = "/data/work"

            [engine]
            command = ["fold", "{input}", "{out_dir}"]
            timeout_secs = 60
            max_concurrent_jobs = 4

            [engine.env]
            GPU = "A100"

            [pipeline]
            max_parallel_units = 3
            join_key = "design_id"
            "#,
        )
        .unwrap();
        assert_eq!(config.remote.kind, RemoteKind::S3);
        assert_eq!(config.remote.prefix, "runs/");
        assert_eq!(config.paths.work_dir, PathBuf::from("/data/work"));
        assert_eq!(config.paths.ledger, PathBuf::from("final_results.csv"));
        assert_eq!(config.engine.env["GPU"], "A100");
        assert_eq!(config.pipeline.join_key, JoinKey::DesignId);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        let mut config = EvalConfig::default();
        config.remote.root = Some(PathBuf::from("/mnt/bucket"));
        config.validate().unwrap();

        let mut bad = config.clone();
        bad.engine.command.clear();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.engine.max_concurrent_jobs = 0;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.engine.timeout_secs = 0;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.remote.kind = RemoteKind::S3;
        assert!(bad.validate().is_err());

        let mut bad = config;
        bad.remote.root = None;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_unknown_remote_kind_is_a_parse_error() {
        let err = EvalConfig::from_toml("[remote]\nkind = \"ftp\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unset_token_variable_is_a_credential_error() {
        let mut config = EvalConfig::default();
        config.remote.kind = RemoteKind::S3;
        config.remote.endpoint = Some("https://objects.example.org".into());
        config.remote.token_env = Some("BINDEVAL_SURELY_UNSET_TOKEN_VAR".into());
        let err = config.remote_store().err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredential(_)));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvalConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EvalConfig::default());
    }
}
