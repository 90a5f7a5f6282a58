use super::enrollment::{Enrollment, EnrollmentKey};
use super::money::Money;
use super::payment::{ChargeStatus, PaymentAttempt};
use super::referral::{BuyerProfile, CommissionEntry, EntryKey, PayoutBatch, ReferrerAccount};
use crate::error::Result;
use async_trait::async_trait;

/// Durable storage for every settlement record.
///
/// All reads and writes go through a [`LedgerTransaction`]. Transactions on
/// the same store are serialized, and nothing staged on one is visible to
/// others until it commits.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<LedgerTransactionBox>;
}

/// A unit of work against a [`LedgerStore`].
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// every write staged on it.
pub trait LedgerTransaction: Send {
    fn attempt(&self, reference: &str) -> Result<Option<PaymentAttempt>>;
    fn put_attempt(&mut self, attempt: PaymentAttempt) -> Result<()>;
    fn attempts(&self) -> Result<Vec<PaymentAttempt>>;

    fn buyer(&self, buyer_id: &str) -> Result<Option<BuyerProfile>>;
    fn put_buyer(&mut self, profile: BuyerProfile) -> Result<()>;

    fn enrollment(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>>;
    fn put_enrollment(&mut self, enrollment: Enrollment) -> Result<()>;
    fn enrollments_for(&self, buyer_id: &str) -> Result<Vec<Enrollment>>;

    fn referrer(&self, referrer_id: &str) -> Result<Option<ReferrerAccount>>;
    fn put_referrer(&mut self, account: ReferrerAccount) -> Result<()>;
    fn referrers(&self) -> Result<Vec<ReferrerAccount>>;

    fn entry(&self, key: &EntryKey) -> Result<Option<CommissionEntry>>;
    fn put_entry(&mut self, entry: CommissionEntry) -> Result<()>;
    fn entries_for(&self, referrer_id: &str) -> Result<Vec<CommissionEntry>>;

    fn put_batch(&mut self, batch: PayoutBatch) -> Result<()>;
    fn batches_for(&self, referrer_id: &str) -> Result<Vec<PayoutBatch>>;

    fn commit(self: Box<Self>) -> Result<()>;
}

/// The hosted payment provider. Its answers are untrusted and may lag behind
/// what the buyer sees.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a charge and returns the URL the buyer is sent to.
    async fn init_charge(&self, amount: Money, reference: &str, callback_url: &str)
    -> Result<String>;
    async fn charge_status(&self, reference: &str) -> Result<ChargeStatus>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type LedgerTransactionBox = Box<dyn LedgerTransaction>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
