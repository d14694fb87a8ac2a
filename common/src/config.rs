//! Application configuration.
//!
//! Configuration is read once at startup from the process environment (after
//! loading an optional `.env` file) and then passed around explicitly.

use std::fmt;
use std::str::FromStr;

use axum::http::HeaderValue;

use crate::errors::{AppError, AppResult};
use crate::utils::statement::StatementPolicy;

/// Model used when `GROQ_MODEL` is not set.
pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
/// Groq's OpenAI-compatible API root.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_PG_PORT: u16 = 5432;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name reported in logs and response metadata.
    pub service_name: String,
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Remote model settings.
    pub llm: LlmSettings,
    /// Target database settings.
    pub database: DatabaseSettings,
    /// Statement kinds the executor may run for generated SQL.
    pub statement_policy: StatementPolicy,
    /// Statement kinds accepted by the raw `/api/execute` route.
    pub execute_policy: StatementPolicy,
    /// Browser origins allowed to call the API cross-origin. Empty means
    /// same-origin only.
    pub cors_allowed_origins: Vec<HeaderValue>,
}

/// Settings for the remote chat-completion model.
#[derive(Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

/// Connection parameters for the target PostgreSQL database.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            timeout_secs: 30,
            temperature: 0.7,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PG_PORT,
            database: None,
            user: None,
            password: None,
            connect_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Loads configuration for the named service from `.env` and the
    /// process environment. Variables already present in the environment
    /// take precedence over the `.env` file.
    pub fn load_with_service(service_name: &str) -> AppResult<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(AppError::Configuration(format!("invalid .env file: {}", e))),
        }
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_defaults = LlmSettings::default();
        let llm = LlmSettings {
            api_key: get("GROQ_API_KEY"),
            model: get("GROQ_MODEL").unwrap_or(llm_defaults.model),
            base_url: get("GROQ_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(llm_defaults.base_url),
            timeout_secs: parse_or(&get, "LLM_TIMEOUT_SECS", llm_defaults.timeout_secs)?,
            temperature: parse_or(&get, "LLM_TEMPERATURE", llm_defaults.temperature)?,
        };

        let db_defaults = DatabaseSettings::default();
        let database = DatabaseSettings {
            host: get("PG_HOST").unwrap_or(db_defaults.host),
            port: parse_or(&get, "PG_PORT", db_defaults.port)?,
            database: get("PG_DATABASE"),
            user: get("PG_USER"),
            password: get("PG_PASSWORD"),
            connect_timeout_secs: parse_or(
                &get,
                "DB_CONNECT_TIMEOUT_SECS",
                db_defaults.connect_timeout_secs,
            )?,
        };

        let statement_policy = match get("SQL_ALLOWED_STATEMENTS") {
            Some(list) => StatementPolicy::from_str(&list)?,
            None => StatementPolicy::allow_all(),
        };
        let execute_policy = match get("SQL_EXECUTE_ALLOWED_STATEMENTS") {
            Some(list) => StatementPolicy::from_str(&list)?,
            None => StatementPolicy::read_only(),
        };
        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|list| parse_origins(&list))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            service_name: service_name.to_string(),
            host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "SERVER_PORT", 8501)?,
            llm,
            database,
            statement_policy,
            execute_policy,
            cors_allowed_origins,
        })
    }
}

fn parse_origins(list: &str) -> AppResult<Vec<HeaderValue>> {
    list.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|e| {
                AppError::Configuration(format!("CORS_ALLOWED_ORIGINS has invalid origin '{}': {}", origin, e))
            })
        })
        .collect()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Configuration(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::statement::StatementKind;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppResult<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup("text2sql-service", |key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.base_url, DEFAULT_LLM_BASE_URL);
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.port, 8501);
        assert!(config.statement_policy.allows(StatementKind::Update));
        assert!(!config.execute_policy.permits_writes());
        assert!(config.cors_allowed_origins.is_empty());
    }

    #[test]
    fn test_execute_policy_and_origins_from_env() {
        let config = config_from(&[
            ("SQL_EXECUTE_ALLOWED_STATEMENTS", "select,insert"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:3000, https://school.example"),
        ])
        .unwrap();
        assert!(config.execute_policy.allows(StatementKind::Insert));
        assert!(!config.execute_policy.allows(StatementKind::Ddl));
        assert_eq!(
            config.cors_allowed_origins,
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("https://school.example"),
            ]
        );
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        let err = config_from(&[("CORS_ALLOWED_ORIGINS", "http://bad\norigin")]).unwrap_err();
        assert!(matches!(err, AppError::Configuration(msg) if msg.contains("CORS_ALLOWED_ORIGINS")));
    }

    #[test]
    fn test_reads_database_settings() {
        let config = config_from(&[
            ("PG_HOST", "db.internal"),
            ("PG_PORT", "6543"),
            ("PG_DATABASE", "school"),
            ("PG_USER", "registrar"),
            ("PG_PASSWORD", "secret"),
        ])
        .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.database.as_deref(), Some("school"));
        assert_eq!(config.database.user.as_deref(), Some("registrar"));
        assert_eq!(config.database.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_empty_value_is_unset() {
        let config = config_from(&[("PG_PORT", ""), ("GROQ_API_KEY", "  ")]).unwrap();
        assert_eq!(config.database.port, 5432);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = config_from(&[("PG_PORT", "five")]).unwrap_err();
        assert!(matches!(err, AppError::Configuration(msg) if msg.contains("PG_PORT")));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = config_from(&[("GROQ_BASE_URL", "http://127.0.0.1:9000/v1/")]).unwrap();
        assert_eq!(config.llm.base_url, "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn test_statement_policy_from_env() {
        let config = config_from(&[("SQL_ALLOWED_STATEMENTS", "select")]).unwrap();
        assert!(config.statement_policy.allows(StatementKind::Select));
        assert!(!config.statement_policy.allows(StatementKind::Delete));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&[("GROQ_API_KEY", "gsk_live"), ("PG_PASSWORD", "hunter2")]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("gsk_live"));
        assert!(!rendered.contains("hunter2"));
    }
}
