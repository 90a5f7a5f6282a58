//! Adapters for the domain ports: ledger storage backends and the payment
//! gateway stand-in.

pub mod gateway;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
