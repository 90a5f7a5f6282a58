use crate::domain::money::Money;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Unknown payment reference: {0}")]
    UnknownReference(String),
    #[error("Payment reference already exists: {0}")]
    DuplicateReference(String),
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Amount mismatch for {reference}: expected {expected}, gateway reported {reported}")]
    AmountMismatch {
        reference: String,
        expected: Money,
        reported: Money,
    },
    #[error("Nothing to pay out for referrer {0}")]
    NothingToPayout(String),
    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),
    #[error("Unknown referrer: {0}")]
    UnknownReferrer(String),
    #[error("Unknown enrollment: {0}")]
    UnknownEnrollment(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, SettlementError>;
