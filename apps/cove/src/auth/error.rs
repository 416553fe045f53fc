use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for AuthError {
    fn from(value: toml::de::Error) -> Self {
        AuthError::Toml(value.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(value: toml::ser::Error) -> Self {
        AuthError::Toml(value.to_string())
    }
}
