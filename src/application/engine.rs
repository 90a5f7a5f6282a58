use crate::config::SettlementConfig;
use crate::domain::enrollment::Enrollment;
use crate::domain::payment::{PaymentAttempt, PaymentStatus};
use crate::domain::ports::{LedgerStoreBox, LedgerTransactionBox, PaymentGatewayBox};
use crate::error::{Result, SettlementError};
use serde::Serialize;
use uuid::Uuid;

/// The settlement core of the storefront.
///
/// `SettlementEngine` turns verified payments into course access and referral
/// commission, and referral commission into payout batches. Every mutation
/// runs inside one [`LedgerTransaction`](crate::domain::ports::LedgerTransaction),
/// so each operation either applies completely or not at all.
///
/// The operations are split by component across the sibling modules:
/// [`ledger`](super::ledger), [`enrollment`](super::enrollment),
/// [`commission`](super::commission), [`payout`](super::payout) and
/// [`referrers`](super::referrers).
pub struct SettlementEngine {
    pub(super) store: LedgerStoreBox,
    pub(super) gateway: PaymentGatewayBox,
    pub(super) config: SettlementConfig,
}

/// Returned to checkout: where to send the buyer, and the reference to verify later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInit {
    pub reference: String,
    pub authorization_url: String,
}

/// Outcome of verifying a payment.
///
/// `enrollments` is only populated for `success`; the payment callback page
/// renders it directly instead of re-querying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub reference: String,
    pub status: PaymentStatus,
    pub enrollments: Vec<Enrollment>,
}

impl Verification {
    pub(super) fn of(attempt: &PaymentAttempt, enrollments: Vec<Enrollment>) -> Self {
        Self {
            reference: attempt.reference.clone(),
            status: attempt.status,
            enrollments,
        }
    }
}

impl SettlementEngine {
    /// Creates a new `SettlementEngine`.
    ///
    /// # Arguments
    ///
    /// * `store` - Durable storage for all settlement records.
    /// * `gateway` - The hosted payment provider.
    /// * `config` - Timeouts and reference format.
    pub fn new(store: LedgerStoreBox, gateway: PaymentGatewayBox, config: SettlementConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub(super) async fn begin(&self) -> Result<LedgerTransactionBox> {
        self.store.begin().await
    }

    pub(super) fn new_reference(&self) -> String {
        format!("{}-{}", self.config.reference_prefix, Uuid::new_v4().simple())
    }
}

/// Rejects blank identifiers before they reach the store.
pub(super) fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(SettlementError::ValidationError(format!(
            "{what} must not be blank"
        )))
    } else {
        Ok(())
    }
}
