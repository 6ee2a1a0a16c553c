use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error. {0}")]
    Io(#[from] std::io::Error),
    #[error("Error serializing channel data. {0}")]
    Serialization(#[from] ron::Error),
    #[error("Error reading {}. {source}", .path.display())]
    Deserialization { path: PathBuf, source: ron::error::SpannedError },
    #[error("The store contains corrupt data. {0}")]
    Corrupt(String),
    #[error("The store is unavailable. {0}")]
    Unavailable(String),
}
