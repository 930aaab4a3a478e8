//! Configuration management.
//!
//! A run is configured by one immutable [`PipelineConfig`], built from three
//! layers of [`ConfigFile`] values: the TOML config file, environment
//! variables, then command-line flags. Later layers win.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::{default_request_params, LlmConfig};
use crate::models::{CommentLang, ResultTableName, SqlDialect, DEFAULT_TABLE_PREFIX};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "sqlport.db";

/// Name config discovery looks for (`sqlport.toml`, `sqlport.json`, ...).
pub const APP_NAME: &str = "sqlport";

/// Conventional config file name.
pub const CONFIG_FILENAME: &str = "sqlport.toml";

const DEFAULT_CATALOG: &str = "main";
const DEFAULT_SCHEMA: &str = "sqlport";
const DEFAULT_TOKEN_COUNT_THRESHOLD: usize = 20000;
const DEFAULT_MAX_FIX_ATTEMPTS: usize = 1;
const DEFAULT_WORKERS: usize = 4;

/// Errors in configuration. Always fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Missing required parameter: {0}")]
    Missing(&'static str),
    #[error("Unrecognized SQL dialect: {0}")]
    UnknownDialect(String),
    #[error("Unrecognized comment language: {0}")]
    UnknownCommentLang(String),
    #[error("request_params must be a JSON object: {0}")]
    RequestParams(String),
    #[error("Invalid result table name '{0}': expected catalog.schema.table")]
    InvalidTableName(String),
    #[error("Unknown result table: {0}")]
    UnknownResultTable(String),
    #[error("{0} must be at least 1")]
    ZeroNotAllowed(&'static str),
}

/// One configuration layer. Every field is optional; unset fields fall
/// through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub database: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub result_catalog: Option<String>,
    pub result_schema: Option<String>,
    pub result_table_prefix: Option<String>,
    pub token_count_threshold: Option<usize>,
    pub existing_result_table: Option<String>,
    pub endpoint_name: Option<String>,
    pub fix_endpoint_name: Option<String>,
    pub endpoint_url: Option<String>,
    pub api_token: Option<String>,
    pub sql_dialect: Option<String>,
    pub comment_lang: Option<String>,
    pub request_params: Option<Value>,
    pub max_fix_attempts: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

macro_rules! overlay {
    ($base:ident, $top:ident, $($field:ident),+ $(,)?) => {
        $( if $top.$field.is_some() { $base.$field = $top.$field; } )+
    };
}

impl ConfigFile {
    /// Load the config file: `explicit` if given, otherwise the `sqlport`
    /// config that `prefer` discovers in its standard locations (working
    /// directory, then user config dirs).
    ///
    /// Relative paths inside the file resolve against the file's directory.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover_config_file().await,
        };
        match path {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load a TOML or JSON config file, chosen by extension.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            _ => toml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
        };
        tracing::debug!("Loaded config from {}", path.display());

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        file.resolve_paths(&base_dir);
        Ok(file)
    }

    /// Layer read from `SQLPORT_*` environment variables.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            database: var("SQLPORT_DATABASE").map(PathBuf::from),
            workers: var("SQLPORT_WORKERS").and_then(|v| v.parse().ok()),
            request_timeout_secs: var("SQLPORT_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()),
            ..Default::default()
        }
    }

    /// Put `top` over `self`.
    pub fn merge(mut self, top: ConfigFile) -> Self {
        overlay!(
            self,
            top,
            database,
            input_dir,
            result_catalog,
            result_schema,
            result_table_prefix,
            token_count_threshold,
            existing_result_table,
            endpoint_name,
            fix_endpoint_name,
            endpoint_url,
            api_token,
            sql_dialect,
            comment_lang,
            request_params,
            max_fix_attempts,
            output_dir,
            workers,
            request_timeout_secs,
        );
        self
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        for path in [&mut self.database, &mut self.input_dir, &mut self.output_dir]
            .into_iter()
            .flatten()
        {
            let resolved = resolve_path(&path.to_string_lossy(), base_dir);
            *path = resolved;
        }
    }
}

/// Resolve a path that may be relative.
/// - Paths starting with ~ are expanded
/// - Relative paths are joined to `base_dir`
pub fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(path_str);
    let path = Path::new(expanded.as_ref());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Path of the config file `prefer` finds for this app, if any.
async fn discover_config_file() -> Option<PathBuf> {
    let discovered = prefer::load(APP_NAME).await.ok()?;
    discovered.source_path().map(|path| path.to_path_buf())
}

/// One dot-free part of a new result table name.
fn table_name_part(value: Option<String>, default: &str) -> Result<String, ConfigError> {
    let Some(value) = value else {
        return Ok(default.to_string());
    };
    let part = value.trim();
    if part.is_empty() || part.contains('.') || part.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidTableName(value));
    }
    Ok(part.to_string())
}

/// Parse a `request_params` JSON string.
pub fn parse_request_params(json: &str) -> Result<Value, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::RequestParams(e.to_string()))
}

/// Immutable configuration handed to the orchestrator and every stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database: PathBuf,
    pub input_dir: Option<PathBuf>,
    pub result_catalog: String,
    pub result_schema: String,
    pub result_table_prefix: String,
    pub token_count_threshold: usize,
    /// Reuse this table instead of analyzing inputs
    pub existing_result_table: Option<ResultTableName>,
    pub sql_dialect: SqlDialect,
    pub comment_lang: CommentLang,
    pub max_fix_attempts: usize,
    pub output_dir: Option<PathBuf>,
    pub workers: usize,
    /// Endpoint used for conversion; also carries URL, token, timeout and request params
    pub llm: LlmConfig,
    pub fix_endpoint_name: Option<String>,
}

impl PipelineConfig {
    /// Build the final configuration from a merged layer, applying defaults.
    pub fn resolve(layer: ConfigFile) -> Result<Self, ConfigError> {
        let sql_dialect = match layer.sql_dialect {
            Some(s) => SqlDialect::from_str(&s).ok_or(ConfigError::UnknownDialect(s))?,
            None => SqlDialect::default(),
        };
        let comment_lang = match layer.comment_lang {
            Some(s) => CommentLang::from_str(&s).ok_or(ConfigError::UnknownCommentLang(s))?,
            None => CommentLang::default(),
        };
        let request_params: Map<String, Value> = match layer.request_params {
            Some(Value::Object(map)) => map,
            Some(other) => return Err(ConfigError::RequestParams(other.to_string())),
            None => default_request_params(),
        };
        let existing_result_table = layer
            .existing_result_table
            .filter(|s| !s.trim().is_empty())
            .map(|s| ResultTableName::parse(&s).ok_or(ConfigError::InvalidTableName(s)))
            .transpose()?;

        let workers = layer.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ConfigError::ZeroNotAllowed("workers"));
        }

        let mut llm = LlmConfig::base_default().with_env_overrides();
        llm.endpoint_name = layer.endpoint_name.unwrap_or_default();
        llm.request_params = request_params;
        if let Some(url) = layer.endpoint_url {
            llm.endpoint_url = url;
        }
        if layer.api_token.is_some() {
            llm.api_token = layer.api_token;
        }
        if let Some(secs) = layer.request_timeout_secs {
            if secs == 0 {
                return Err(ConfigError::ZeroNotAllowed("request_timeout_secs"));
            }
            llm.request_timeout_secs = secs;
        }

        Ok(Self {
            database: layer
                .database
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILENAME)),
            input_dir: layer.input_dir,
            result_catalog: table_name_part(layer.result_catalog, DEFAULT_CATALOG)?,
            result_schema: table_name_part(layer.result_schema, DEFAULT_SCHEMA)?,
            result_table_prefix: table_name_part(layer.result_table_prefix, DEFAULT_TABLE_PREFIX)?,
            token_count_threshold: layer
                .token_count_threshold
                .unwrap_or(DEFAULT_TOKEN_COUNT_THRESHOLD),
            existing_result_table,
            sql_dialect,
            comment_lang,
            max_fix_attempts: layer.max_fix_attempts.unwrap_or(DEFAULT_MAX_FIX_ATTEMPTS),
            output_dir: layer.output_dir,
            workers,
            llm,
            fix_endpoint_name: layer.fix_endpoint_name.filter(|s| !s.is_empty()),
        })
    }

    pub fn require_input_dir(&self) -> Result<&Path, ConfigError> {
        self.input_dir
            .as_deref()
            .ok_or(ConfigError::Missing("input_dir"))
    }

    pub fn require_output_dir(&self) -> Result<&Path, ConfigError> {
        self.output_dir
            .as_deref()
            .ok_or(ConfigError::Missing("output_dir"))
    }

    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        if self.llm.endpoint_name.is_empty() {
            return Err(ConfigError::Missing("endpoint_name"));
        }
        Ok(&self.llm.endpoint_name)
    }

    /// Check everything a full run needs before any stage starts.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        if self.existing_result_table.is_none() {
            self.require_input_dir()?;
        }
        self.require_endpoint()?;
        self.require_output_dir()?;
        Ok(())
    }

    /// Endpoint config for fix requests. Defaults to the conversion endpoint.
    pub fn fix_llm(&self) -> LlmConfig {
        match &self.fix_endpoint_name {
            Some(name) => self.llm.clone().with_endpoint_name(name),
            None => self.llm.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.request_timeout_secs)
    }
}
