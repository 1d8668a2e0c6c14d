//! Shared-secret resolution and public token generation.
//!
//! Operational secrets (the worker trigger secret and the direct-upload key)
//! are resolved from one of three sources, in priority order:
//!
//! 1. `{"value": "dev"}` for local runs
//! 2. `{"file": "/run/secrets/coa_worker"}` for mounted secrets
//! 3. `{"env": "COA_WORKER_SECRET"}`
//!
//! Public result tokens are 256-bit random values, URL-safe base64 without
//! padding, so they cannot be enumerated or guessed.

use base64::Engine;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;

/// Number of random bytes behind a public token.
pub const TOKEN_BYTES: usize = 32;

/// Encoded length of a public token (43 chars for 32 bytes, unpadded).
pub const TOKEN_LEN: usize = 43;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("no secret source configured (set value, file or env)")]
    NoSourceProvided,

    #[error("cannot read secret file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("environment variable '{name}' is not set")]
    EnvVarNotSet { name: String },

    #[error("environment variable '{name}' is not valid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("secret is empty")]
    Empty,

    #[error("random source failed: {0}")]
    Random(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where to find a secret. When several fields are set the first of
/// `value`, `file`, `env` wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

enum Source<'a> {
    Value(&'a str),
    File(&'a str),
    Env(&'a str),
}

impl SecretRef {
    pub fn from_env(name: &str) -> Self {
        Self {
            env: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn direct(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::default()
        }
    }

    /// Resolves the secret. An empty result is an error.
    pub fn resolve(&self) -> Result<SecretString> {
        resolve_secret(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env.as_deref(),
        )
    }

    pub fn has_source(&self) -> bool {
        pick_source(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env.as_deref(),
        )
        .is_some()
    }
}

fn pick_source<'a>(
    value: Option<&'a str>,
    file: Option<&'a str>,
    env: Option<&'a str>,
) -> Option<Source<'a>> {
    let set = |s: Option<&'a str>| s.filter(|s| !s.is_empty());
    set(value)
        .map(Source::Value)
        .or_else(|| set(file).map(Source::File))
        .or_else(|| set(env).map(Source::Env))
}

/// Resolves a secret from the first non-empty source. File and env
/// contents are trimmed; a blank result is [`SecretError::Empty`].
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    let raw = match pick_source(direct, file_path, env_var) {
        None => return Err(SecretError::NoSourceProvided),
        Some(Source::Value(value)) => value.to_string(),
        Some(Source::File(path)) => {
            let path = expand_home(path);
            fs::read_to_string(&path)
                .map_err(|source| SecretError::FileReadError { path, source })?
                .trim()
                .to_string()
        }
        Some(Source::Env(name)) => match std::env::var(name) {
            Ok(value) => value.trim().to_string(),
            Err(std::env::VarError::NotPresent) => {
                return Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                })
            }
            Err(std::env::VarError::NotUnicode(_)) => {
                return Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                })
            }
        },
    };
    if raw.is_empty() {
        return Err(SecretError::Empty);
    }
    Ok(SecretString::from(raw))
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            format!("{}{}", home.display(), rest)
        }
        _ => path.to_string(),
    }
}

/// Generates a fresh public result token.
pub fn generate_public_token() -> Result<String> {
    let bytes = rand_bytes::<TOKEN_BYTES>()?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Cheap shape check run before any token reaches the database.
pub fn is_well_formed_token(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn rand_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|e| SecretError::Random(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_direct_value_takes_priority() {
        std::env::set_var("COA_TEST_SECRET_1", "env_value");
        let result =
            resolve_secret(Some("direct_value"), None, Some("COA_TEST_SECRET_1")).unwrap();
        assert_eq!(result.expose_secret(), "direct_value");
        std::env::remove_var("COA_TEST_SECRET_1");
    }

    #[test]
    #[serial]
    fn test_file_takes_priority_over_env() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "file_value").unwrap();

        std::env::set_var("COA_TEST_SECRET_2", "env_value");
        let result = resolve_secret(
            None,
            Some(temp_file.path().to_str().unwrap()),
            Some("COA_TEST_SECRET_2"),
        )
        .unwrap();
        assert_eq!(result.expose_secret(), "file_value");
        std::env::remove_var("COA_TEST_SECRET_2");
    }

    #[test]
    #[serial]
    fn test_env_var_fallback_is_trimmed() {
        std::env::set_var("COA_TEST_SECRET_3", "env_value\n");
        let secret = SecretRef::from_env("COA_TEST_SECRET_3").resolve().unwrap();
        assert_eq!(secret.expose_secret(), "env_value");
        std::env::remove_var("COA_TEST_SECRET_3");
    }

    #[test]
    fn test_no_source_error() {
        let result = SecretRef::default().resolve();
        assert!(matches!(result, Err(SecretError::NoSourceProvided)));
    }

    #[test]
    fn test_file_not_found_error() {
        let result = resolve_secret(None, Some("/nonexistent/path/to/secret"), None);
        assert!(matches!(result, Err(SecretError::FileReadError { .. })));
    }

    #[test]
    fn test_env_var_not_set_error() {
        let result = SecretRef::from_env("COA_DEFINITELY_NOT_SET_12345").resolve();
        assert!(matches!(result, Err(SecretError::EnvVarNotSet { .. })));
    }

    #[test]
    fn test_blank_file_is_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "   ").unwrap();
        let secret = SecretRef {
            file: Some(temp_file.path().to_string_lossy().into_owned()),
            ..SecretRef::default()
        };
        assert!(matches!(secret.resolve(), Err(SecretError::Empty)));
    }

    #[test]
    fn test_has_source() {
        assert!(SecretRef::direct("x").has_source());
        assert!(SecretRef::from_env("X").has_source());
        assert!(!SecretRef::default().has_source());
        let blank = SecretRef {
            value: Some(String::new()),
            file: Some(String::new()),
            env: Some(String::new()),
        };
        assert!(!blank.has_source());
    }

    #[test]
    fn test_blank_direct_value_falls_through_to_env() {
        let result = resolve_secret(Some(""), None, Some("COA_DEFINITELY_NOT_SET_67890"));
        assert!(matches!(result, Err(SecretError::EnvVarNotSet { .. })));
    }

    #[test]
    fn test_expand_home_leaves_other_paths() {
        assert_eq!(expand_home("/absolute/path"), "/absolute/path");
        assert_eq!(expand_home("relative/path"), "relative/path");
        assert_eq!(expand_home("~user/path"), "~user/path");
    }

    #[test]
    fn test_public_tokens_are_unique_and_well_formed() {
        let a = generate_public_token().unwrap();
        let b = generate_public_token().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(is_well_formed_token(&a));
        assert!(is_well_formed_token(&b));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(!is_well_formed_token(""));
        assert!(!is_well_formed_token("short"));
        assert!(!is_well_formed_token(&"a".repeat(TOKEN_LEN + 1)));
        assert!(!is_well_formed_token(&format!("{}=", "a".repeat(TOKEN_LEN - 1))));
        assert!(!is_well_formed_token(&"/".repeat(TOKEN_LEN)));
    }
}
