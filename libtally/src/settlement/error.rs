use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, Serialize, Deserialize)]
pub enum SettlementError {
    #[error("The settlement layer rejected the intent: {0}")]
    Rejected(String),
    #[error("The settlement layer is unavailable: {0}")]
    Unavailable(String),
}
