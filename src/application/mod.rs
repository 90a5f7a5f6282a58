//! Application layer containing the settlement orchestration.
//!
//! This module defines the `SettlementEngine`, the single entry point the
//! checkout, payment-callback, content and referrer-dashboard collaborators
//! call into. Each operation runs as one store transaction.

pub mod commission;
pub mod engine;
pub mod enrollment;
pub mod ledger;
pub mod payout;
pub mod referrers;
