//! Engine configuration: defaults, persisted settings, environment.

use serde::Serialize;

use crate::{
    config_db::ConfigDb,
    error::{Error, QueryError, Result},
};

/// Settings keys that tune the engine.
pub const ENGINE_KEYS: &[&str] = &[
    "max_features",
    "max_df",
    "max_query_length",
    "top_k",
    "context_lines",
];

/// Setting holding the default root for `docsift index`.
pub const DOCUMENTS_DIR_KEY: &str = "documents_dir";

/// TF-IDF fitting parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorizerConfig {
    /// Upper bound on the vocabulary size.
    pub max_features: usize,
    /// Terms present in more than this fraction of documents are dropped.
    pub max_df: f32,
    /// Terms present in fewer documents than this are dropped.
    pub min_df: usize,
    /// Longest word n-gram to index.
    pub ngram_max: usize,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: 5000,
            max_df: 0.95,
            min_df: 1,
            ngram_max: 2,
        }
    }
}

/// Limits applied to incoming queries before they reach the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLimits {
    pub max_query_length: usize,
    pub default_k: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_query_length: 500,
            default_k: 5,
        }
    }
}

impl QueryLimits {
    /// Trim `raw` and reject it if it is empty or too long.
    pub fn validate<'a>(
        &self,
        raw: &'a str,
    ) -> std::result::Result<&'a str, QueryError> {
        let query = raw.trim();
        if query.is_empty() {
            return Err(QueryError::Empty);
        }
        let length = query.chars().count();
        if length > self.max_query_length {
            return Err(QueryError::TooLong {
                length,
                max: self.max_query_length,
            });
        }
        Ok(query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub vectorizer: VectorizerConfig,
    pub limits: QueryLimits,
    /// Lines of context per exact match, counting the match line.
    pub context_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vectorizer: VectorizerConfig::default(),
            limits: QueryLimits::default(),
            context_lines: 2,
        }
    }
}

impl EngineConfig {
    /// Apply one `key = value` setting on top of the current values.
    pub fn overlay(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "max_features" => {
                self.vectorizer.max_features = parse_at_least(key, value, 1)?;
            }
            "max_df" => {
                let max_df: f32 = parse(key, value)?;
                if !(max_df > 0.0 && max_df <= 1.0) {
                    return Err(Error::Config(format!(
                        "{key} must be in (0, 1], got {value}"
                    )));
                }
                self.vectorizer.max_df = max_df;
            }
            "max_query_length" => {
                self.limits.max_query_length = parse_at_least(key, value, 1)?;
            }
            "top_k" => {
                self.limits.default_k = parse_at_least(key, value, 1)?;
            }
            "context_lines" => {
                self.context_lines = parse_at_least(key, value, 2)?;
            }
            _ => {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Current value of an engine setting, formatted for display.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "max_features" => self.vectorizer.max_features.to_string(),
            "max_df" => self.vectorizer.max_df.to_string(),
            "max_query_length" => self.limits.max_query_length.to_string(),
            "top_k" => self.limits.default_k.to_string(),
            "context_lines" => self.context_lines.to_string(),
            _ => return None,
        };
        Some(value)
    }
}

/// Environment variable that overrides `key`, e.g. `DOCSIFT_TOP_K`.
pub fn env_var_name(key: &str) -> String {
    format!("DOCSIFT_{}", key.to_ascii_uppercase())
}

/// Resolve the engine configuration from the settings store and the
/// process environment.
pub fn resolve(config_db: &ConfigDb) -> Result<EngineConfig> {
    resolve_from(
        |key| config_db.get_setting(key),
        |name| std::env::var(name).ok(),
    )
}

/// Layer defaults, then stored settings, then environment variables.
pub fn resolve_from(
    setting: impl Fn(&str) -> Result<Option<String>>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<EngineConfig> {
    let mut config = EngineConfig::default();
    for key in ENGINE_KEYS {
        if let Some(value) = setting(key)? {
            config.overlay(key, &value)?;
        }
    }
    for key in ENGINE_KEYS {
        if let Some(value) = env(&env_var_name(key)) {
            config.overlay(key, &value).map_err(|e| {
                Error::Config(format!("{}: {e}", env_var_name(key)))
            })?;
        }
    }
    Ok(config)
}

/// Check that `key` is a known setting and `value` parses for it.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    if key == DOCUMENTS_DIR_KEY {
        if value.trim().is_empty() {
            return Err(Error::Config(format!("{key} must not be empty")));
        }
        return Ok(());
    }
    EngineConfig::default().overlay(key, value)
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {value:?}")))
}

fn parse_at_least(key: &str, value: &str, min: usize) -> Result<usize> {
    let parsed: usize = parse(key, value)?;
    if parsed < min {
        return Err(Error::Config(format!(
            "{key} must be at least {min}, got {parsed}"
        )));
    }
    Ok(parsed)
}
