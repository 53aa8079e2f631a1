use std::path::PathBuf;

use thiserror::Error;

// Error handling
#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No ABI file for contract {contract} in {dir}")]
    AbiNotFound { contract: String, dir: PathBuf },

    #[error("Environment variable {0} must be set")]
    MissingEnv(String),

    #[error("Unknown network '{0}' (expected homestead or goerli)")]
    UnknownNetwork(String),

    #[error("RPC endpoint for {network} reports chain ID {actual}, expected {expected}")]
    ChainMismatch {
        network: String,
        expected: u64,
        actual: String,
    },

    #[error("Address parse error: {0}")]
    InvalidAddress(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl AppError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        AppError::Json {
            path: path.into(),
            source,
        }
    }
}

impl From<ethers::providers::ProviderError> for AppError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        AppError::Provider(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Provider(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
