//! Typed secret resolution for configuration values.
//!
//! A configuration value of the form `secret:<path>:<field>[:option...]` is a
//! reference into a secret store rather than a literal. Resolution happens once
//! at startup, over the known secret fields of [`crate::config::AppConfig`].
//!
//! Supported options:
//! - `decodeBase64`: the stored value is standard base64 and is decoded to UTF-8.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;

const SENTINEL_PREFIX: &str = "secret:";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Malformed secret reference: {0}")]
    Malformed(String),

    #[error("Unknown secret option: {0}")]
    UnknownOption(String),

    #[error("Secret not found: {path}:{field}")]
    NotFound { path: String, field: String },

    #[error("Failed to read secret {path}:{field}: {message}")]
    Read {
        path: String,
        field: String,
        message: String,
    },

    #[error("Failed to decode secret {path}:{field}")]
    Decode { path: String, field: String },
}

/// Backend that can look up a single secret field.
pub trait SecretSource {
    fn get(&self, path: &str, field: &str) -> Result<String, SecretError>;
}

/// Reads secrets from a mounted directory laid out as `<dir>/<path>/<field>`.
pub struct FileSecretSource {
    root: PathBuf,
}

impl FileSecretSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SecretSource for FileSecretSource {
    fn get(&self, path: &str, field: &str) -> Result<String, SecretError> {
        let file = self.root.join(path).join(field);

        match std::fs::read_to_string(&file) {
            Ok(content) => Ok(content.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SecretError::NotFound {
                path: path.to_string(),
                field: field.to_string(),
            }),
            Err(e) => Err(SecretError::Read {
                path: path.to_string(),
                field: field.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Returns true when `value` is a secret reference.
pub fn is_reference(value: &str) -> bool {
    value.starts_with(SENTINEL_PREFIX)
}

/// Resolves `value` if it is a secret reference, otherwise returns it unchanged.
pub fn resolve(value: &str, source: &impl SecretSource) -> Result<String, SecretError> {
    let Some(reference) = value.strip_prefix(SENTINEL_PREFIX) else {
        return Ok(value.to_string());
    };

    let mut parts = reference.split(':');
    let path = parts.next().filter(|p| !p.is_empty());
    let field = parts.next().filter(|f| !f.is_empty());
    let (Some(path), Some(field)) = (path, field) else {
        return Err(SecretError::Malformed(value.to_string()));
    };

    let mut secret = source.get(path, field)?;

    for option in parts {
        match option {
            "decodeBase64" => {
                let bytes = STANDARD.decode(secret.trim()).map_err(|_| SecretError::Decode {
                    path: path.to_string(),
                    field: field.to_string(),
                })?;
                secret = String::from_utf8(bytes).map_err(|_| SecretError::Decode {
                    path: path.to_string(),
                    field: field.to_string(),
                })?;
            }
            other => return Err(SecretError::UnknownOption(other.to_string())),
        }
    }

    tracing::debug!(path, field, "Secret reference resolved");
    Ok(secret)
}
