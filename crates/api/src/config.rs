use std::path::PathBuf;
use std::str::FromStr;

use annotator_core::assets::DEFAULT_ASSET_TEMPLATE;
use annotator_core::navigation::BoundaryPolicy;
use axum::http::HeaderValue;

use crate::auth::jwt::JwtConfig;

/// Invalid or missing environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Where annotation records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// A JSONL (or JSON array) file, rewritten on every change.
    Jsonl { path: PathBuf },
    /// A SQLite database.
    Sqlite { url: String },
}

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub store: StoreBackend,
    /// Field schema JSON file; the built-in object attribute schema when unset.
    pub schema_path: Option<PathBuf>,
    /// Root directory for preview assets; previews are disabled when unset.
    pub asset_base_path: Option<PathBuf>,
    pub asset_template: String,
    pub boundary: BoundaryPolicy,
    /// JSON file listing annotator accounts.
    pub users_path: PathBuf,
    pub export_dir: PathBuf,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                          |
    /// |------------------------|----------------------------------|
    /// | `HOST`                 | `0.0.0.0`                        |
    /// | `PORT`                 | `3000`                           |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`          |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                             |
    /// | `STORE_BACKEND`        | `jsonl` (or `sqlite`)            |
    /// | `STORE_PATH`           | `data/annotations.jsonl`         |
    /// | `DATABASE_URL`         | `sqlite:data/annotations.db`     |
    /// | `SCHEMA_PATH`          | --                               |
    /// | `ASSET_BASE_PATH`      | --                               |
    /// | `ASSET_TEMPLATE`       | merged-views GIF layout          |
    /// | `NAV_BOUNDARY`         | `clamp` (or `wrap`)              |
    /// | `USERS_PATH`           | `data/users.json`                |
    /// | `EXPORT_DIR`           | `data/exports`                   |
    ///
    /// See [`JwtConfig::from_env`] for the token settings.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "0.0.0.0");
        let port: u16 = parse_env("PORT", "3000")?;

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for origin in &cors_origins {
            if let Err(e) = origin.parse::<HeaderValue>() {
                return Err(ConfigError::Invalid {
                    var: "CORS_ORIGINS",
                    value: origin.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let request_timeout_secs: u64 = parse_env("REQUEST_TIMEOUT_SECS", "30")?;

        let backend = env_or("STORE_BACKEND", "jsonl");
        let store = match backend.as_str() {
            "jsonl" => StoreBackend::Jsonl {
                path: env_or("STORE_PATH", "data/annotations.jsonl").into(),
            },
            "sqlite" => StoreBackend::Sqlite {
                url: env_or("DATABASE_URL", "sqlite:data/annotations.db"),
            },
            _ => {
                return Err(ConfigError::Invalid {
                    var: "STORE_BACKEND",
                    value: backend,
                    reason: "must be one of: jsonl, sqlite".into(),
                })
            }
        };

        let boundary_raw = env_or("NAV_BOUNDARY", "clamp");
        let boundary =
            BoundaryPolicy::from_str(&boundary_raw).map_err(|e| ConfigError::Invalid {
                var: "NAV_BOUNDARY",
                value: boundary_raw.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            store,
            schema_path: env_opt("SCHEMA_PATH").map(PathBuf::from),
            asset_base_path: env_opt("ASSET_BASE_PATH").map(PathBuf::from),
            asset_template: env_or("ASSET_TEMPLATE", DEFAULT_ASSET_TEMPLATE),
            boundary,
            users_path: env_or("USERS_PATH", "data/users.json").into(),
            export_dir: env_or("EXPORT_DIR", "data/exports").into(),
            jwt: JwtConfig::from_env()?,
        })
    }
}

/// Read `var`, treating an empty value as unset.
pub(crate) fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_or(var: &str, default: &str) -> String {
    env_opt(var).unwrap_or_else(|| default.to_string())
}

/// Parse `var` (or `default` when unset) into `T`.
pub(crate) fn parse_env<T>(var: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_or(var, default);
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })
}
