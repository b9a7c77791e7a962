//! API key resolution.
//!
//! The key comes from the process environment (a `.env` file is loaded into it
//! at startup) or, failing that, from a TOML secrets file provided by the
//! hosting platform. Nothing is served without one.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::constants;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "{var} missing.\n\n\
         \u{2022} Locally: create a .env file with {var}=...\n\
         \u{2022} On a hosted deployment: add {var} to the secrets file at {secrets}."
    )]
    MissingApiKey { var: &'static str, secrets: String },

    #[error("Failed to read secrets file {path}: {source}")]
    SecretsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse secrets file {path}: {source}")]
    SecretsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    SecretsFile,
}

/// A resolved credential. `Debug` never prints the key itself.
#[derive(Clone)]
pub struct ApiKey {
    value: String,
    source: KeySource,
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

/// Resolves the key using the process environment and the configured secrets file.
pub fn load_api_key() -> Result<ApiKey, ConfigError> {
    resolve_api_key(
        std::env::var(constants::API_KEY_VAR).ok(),
        Path::new(constants::SECRETS_FILE.as_str()),
    )
}

/// Environment value first, then the secrets file. Blank values count as absent.
pub fn resolve_api_key(env_value: Option<String>, secrets_path: &Path) -> Result<ApiKey, ConfigError> {
    if let Some(value) = non_blank(env_value) {
        info!("Using API key from environment");
        return Ok(ApiKey {
            value,
            source: KeySource::Environment,
        });
    }

    if let Some(value) = read_secrets_file(secrets_path)? {
        info!(path = %secrets_path.display(), "Using API key from secrets file");
        return Ok(ApiKey {
            value,
            source: KeySource::SecretsFile,
        });
    }

    Err(ConfigError::MissingApiKey {
        var: constants::API_KEY_VAR,
        secrets: secrets_path.display().to_string(),
    })
}

fn read_secrets_file(path: &Path) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "No secrets file");
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::SecretsRead {
        path: path.to_path_buf(),
        source,
    })?;
    let table: toml::Table = toml::from_str(&contents).map_err(|source| ConfigError::SecretsParse {
        path: path.to_path_buf(),
        source,
    })?;
    let value = table
        .get(constants::API_KEY_VAR)
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Ok(non_blank(value))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_secrets(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("secrets.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_environment_wins_over_secrets_file() {
        let dir = TempDir::new().unwrap();
        let path = write_secrets(&dir, "OPENAI_API_KEY = \"from-file\"\n");

        let key = resolve_api_key(Some("from-env".to_string()), &path).unwrap();
        assert_eq!(key.expose(), "from-env");
        assert_eq!(key.source(), KeySource::Environment);
    }

    #[test]
    fn test_falls_back_to_secrets_file() {
        let dir = TempDir::new().unwrap();
        let path = write_secrets(&dir, "OPENAI_API_KEY = \"sk-file\"\nOTHER = 1\n");

        let key = resolve_api_key(None, &path).unwrap();
        assert_eq!(key.expose(), "sk-file");
        assert_eq!(key.source(), KeySource::SecretsFile);

        let key = resolve_api_key(Some("   ".to_string()), &path).unwrap();
        assert_eq!(key.source(), KeySource::SecretsFile);
    }

    #[test]
    fn test_missing_everywhere_gives_setup_instructions() {
        let dir = TempDir::new().unwrap();
        let err = resolve_api_key(None, &dir.path().join("absent.toml")).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ConfigError::MissingApiKey { .. }));
        assert!(message.starts_with("OPENAI_API_KEY missing."));
        assert!(message.contains("create a .env file with OPENAI_API_KEY=..."));
        assert!(message.contains("absent.toml"));
    }

    #[test]
    fn test_blank_key_in_file_is_missing() {
        let dir = TempDir::new().unwrap();
        let path = write_secrets(&dir, "OPENAI_API_KEY = \"\"\n");
        assert!(matches!(
            resolve_api_key(None, &path),
            Err(ConfigError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_unparseable_secrets_file() {
        let dir = TempDir::new().unwrap();
        let path = write_secrets(&dir, "OPENAI_API_KEY = ");
        assert!(matches!(
            resolve_api_key(None, &path),
            Err(ConfigError::SecretsParse { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = resolve_api_key(Some("sk-secret".to_string()), Path::new("unused")).unwrap();
        assert!(!format!("{:?}", key).contains("sk-secret"));
    }
}
