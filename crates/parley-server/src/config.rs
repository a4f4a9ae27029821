use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use parley_api::completion::OPENAI_API_BASE;

/// Placeholder secrets that are tolerated for local use but never in earnest.
pub const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "yoursecretkey"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub completion_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same parsing as `from_env`, against any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let openai_api_key = lookup("OPENAI_API_KEY").unwrap_or_default();
        if openai_api_key.is_empty() {
            bail!("OPENAI_API_KEY is not set");
        }

        let ttl_days: i64 = parse(&lookup, "PARLEY_TOKEN_TTL_DAYS", 30)?;
        if ttl_days <= 0 {
            bail!("PARLEY_TOKEN_TTL_DAYS must be positive, got {}", ttl_days);
        }

        Ok(Self {
            host: get("PARLEY_HOST", "0.0.0.0"),
            port: parse(&lookup, "PARLEY_PORT", 10000)?,
            db_path: get("PARLEY_DB_PATH", "parley.db").into(),
            jwt_secret: get("PARLEY_JWT_SECRET", "dev-secret-change-me"),
            token_ttl: chrono::Duration::days(ttl_days),
            openai_api_key,
            openai_model: get("PARLEY_OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: get("PARLEY_OPENAI_BASE_URL", OPENAI_API_BASE),
            completion_timeout: Duration::from_secs(parse(
                &lookup,
                "PARLEY_COMPLETION_TIMEOUT_SECS",
                60,
            )?),
        })
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        self.jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 10000);
        assert_eq!(config.db_path, PathBuf::from("parley.db"));
        assert_eq!(config.token_ttl, chrono::Duration::days(30));
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.openai_base_url, OPENAI_API_BASE);
        assert_eq!(config.completion_timeout, Duration::from_secs(60));
        assert!(config.uses_placeholder_secret());
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PARLEY_PORT", "8080"),
            ("PARLEY_JWT_SECRET", "a-real-secret"),
            ("PARLEY_TOKEN_TTL_DAYS", "7"),
            ("PARLEY_COMPLETION_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.token_ttl, chrono::Duration::days(7));
        assert_eq!(config.completion_timeout, Duration::from_secs(5));
        assert!(!config.uses_placeholder_secret());
    }

    #[test]
    fn api_key_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("OPENAI_API_KEY", "")]).is_err());
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config_from(&[("OPENAI_API_KEY", "k"), ("PARLEY_PORT", "http")]).is_err());
        assert!(config_from(&[("OPENAI_API_KEY", "k"), ("PARLEY_TOKEN_TTL_DAYS", "0")]).is_err());
    }
}
