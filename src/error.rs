use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Serial error: {0}")]
    SerialError(#[from] tokio_serial::Error),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<&str> for CoordinatorError {
    fn from(error: &str) -> Self {
        CoordinatorError::RuntimeError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
