use crate::domain::enrollment::{Enrollment, EnrollmentKey};
use crate::domain::payment::PaymentAttempt;
use crate::domain::ports::{LedgerStore, LedgerTransaction, LedgerTransactionBox};
use crate::domain::referral::{
    BuyerProfile, CommissionEntry, EntryKey, PayoutBatch, ReferrerAccount,
};
use crate::error::Result;
use async_trait::async_trait;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    attempts: BTreeMap<String, PaymentAttempt>,
    buyers: BTreeMap<String, BuyerProfile>,
    enrollments: BTreeMap<EnrollmentKey, Enrollment>,
    referrers: BTreeMap<String, ReferrerAccount>,
    entries: BTreeMap<EntryKey, CommissionEntry>,
    batches: BTreeMap<Uuid, PayoutBatch>,
}

impl Tables {
    fn apply(&mut self, staged: Tables) {
        self.attempts.extend(staged.attempts);
        self.buyers.extend(staged.buyers);
        self.enrollments.extend(staged.enrollments);
        self.referrers.extend(staged.referrers);
        self.entries.extend(staged.entries);
        self.batches.extend(staged.batches);
    }
}

/// A thread-safe in-memory ledger store.
///
/// Uses `Arc<Mutex<_>>` so clones share the same tables. A transaction owns
/// the lock for its whole lifetime, which makes transactions serializable.
/// Ideal for testing or small deployments where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<LedgerTransactionBox> {
        let committed = self.tables.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            committed,
            staged: Tables::default(),
        }))
    }
}

/// Writes are staged beside the committed tables and merged on commit.
struct InMemoryTransaction {
    committed: OwnedMutexGuard<Tables>,
    staged: Tables,
}

fn read<K, Q, V>(committed: &BTreeMap<K, V>, staged: &BTreeMap<K, V>, key: &Q) -> Option<V>
where
    K: Borrow<Q> + Ord,
    Q: Ord + ?Sized,
    V: Clone,
{
    staged.get(key).or_else(|| committed.get(key)).cloned()
}

fn merged<'a, K: Ord, V>(
    committed: &'a BTreeMap<K, V>,
    staged: &'a BTreeMap<K, V>,
) -> impl Iterator<Item = &'a V> + 'a {
    committed
        .iter()
        .filter(|(key, _)| !staged.contains_key(*key))
        .map(|(_, value)| value)
        .chain(staged.values())
}

impl LedgerTransaction for InMemoryTransaction {
    fn attempt(&self, reference: &str) -> Result<Option<PaymentAttempt>> {
        Ok(read(&self.committed.attempts, &self.staged.attempts, reference))
    }

    fn put_attempt(&mut self, attempt: PaymentAttempt) -> Result<()> {
        self.staged
            .attempts
            .insert(attempt.reference.clone(), attempt);
        Ok(())
    }

    fn attempts(&self) -> Result<Vec<PaymentAttempt>> {
        Ok(merged(&self.committed.attempts, &self.staged.attempts)
            .cloned()
            .collect())
    }

    fn buyer(&self, buyer_id: &str) -> Result<Option<BuyerProfile>> {
        Ok(read(&self.committed.buyers, &self.staged.buyers, buyer_id))
    }

    fn put_buyer(&mut self, profile: BuyerProfile) -> Result<()> {
        self.staged.buyers.insert(profile.buyer_id.clone(), profile);
        Ok(())
    }

    fn enrollment(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>> {
        Ok(read(
            &self.committed.enrollments,
            &self.staged.enrollments,
            key,
        ))
    }

    fn put_enrollment(&mut self, enrollment: Enrollment) -> Result<()> {
        self.staged
            .enrollments
            .insert(enrollment.key.clone(), enrollment);
        Ok(())
    }

    fn enrollments_for(&self, buyer_id: &str) -> Result<Vec<Enrollment>> {
        Ok(
            merged(&self.committed.enrollments, &self.staged.enrollments)
                .filter(|enrollment| enrollment.key.buyer_id == buyer_id)
                .cloned()
                .collect(),
        )
    }

    fn referrer(&self, referrer_id: &str) -> Result<Option<ReferrerAccount>> {
        Ok(read(
            &self.committed.referrers,
            &self.staged.referrers,
            referrer_id,
        ))
    }

    fn put_referrer(&mut self, account: ReferrerAccount) -> Result<()> {
        self.staged
            .referrers
            .insert(account.referrer_id.clone(), account);
        Ok(())
    }

    fn referrers(&self) -> Result<Vec<ReferrerAccount>> {
        Ok(merged(&self.committed.referrers, &self.staged.referrers)
            .cloned()
            .collect())
    }

    fn entry(&self, key: &EntryKey) -> Result<Option<CommissionEntry>> {
        Ok(read(&self.committed.entries, &self.staged.entries, key))
    }

    fn put_entry(&mut self, entry: CommissionEntry) -> Result<()> {
        self.staged.entries.insert(entry.key(), entry);
        Ok(())
    }

    fn entries_for(&self, referrer_id: &str) -> Result<Vec<CommissionEntry>> {
        Ok(merged(&self.committed.entries, &self.staged.entries)
            .filter(|entry| entry.referrer_id == referrer_id)
            .cloned()
            .collect())
    }

    fn put_batch(&mut self, batch: PayoutBatch) -> Result<()> {
        self.staged.batches.insert(batch.id, batch);
        Ok(())
    }

    fn batches_for(&self, referrer_id: &str) -> Result<Vec<PayoutBatch>> {
        Ok(merged(&self.committed.batches, &self.staged.batches)
            .filter(|batch| batch.referrer_id == referrer_id)
            .cloned()
            .collect())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction {
            mut committed,
            staged,
        } = *self;
        committed.apply(staged);
        Ok(())
    }
}
