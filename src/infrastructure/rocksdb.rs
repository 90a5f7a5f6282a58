use crate::domain::enrollment::{Enrollment, EnrollmentKey};
use crate::domain::payment::PaymentAttempt;
use crate::domain::ports::{LedgerStore, LedgerTransaction, LedgerTransactionBox};
use crate::domain::referral::{
    BuyerProfile, CommissionEntry, EntryKey, PayoutBatch, ReferrerAccount,
};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for payment attempts, keyed by reference.
pub const CF_ATTEMPTS: &str = "attempts";
/// Column Family for buyer referral attributions.
pub const CF_BUYERS: &str = "buyers";
/// Column Family for enrollments, keyed by buyer then course.
pub const CF_ENROLLMENTS: &str = "enrollments";
/// Column Family for referrer accounts.
pub const CF_REFERRERS: &str = "referrers";
/// Column Family for commission entries, keyed by referrer then payment.
pub const CF_ENTRIES: &str = "commission_entries";
/// Column Family for payout batches, keyed by referrer then batch id.
pub const CF_BATCHES: &str = "payout_batches";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_ATTEMPTS,
    CF_BUYERS,
    CF_ENROLLMENTS,
    CF_REFERRERS,
    CF_ENTRIES,
    CF_BATCHES,
];

/// Separates the components of composite keys. Never appears in identifiers
/// typed by users, so `ref-1` can not prefix-match `ref-10`.
const KEY_SEPARATOR: char = '\u{1f}';

fn composite_key(parts: &[&str]) -> Vec<u8> {
    let mut key = String::new();
    for part in parts {
        key.push_str(part);
        key.push(KEY_SEPARATOR);
    }
    key.into_bytes()
}

/// The term component is tagged so an absent term and an empty one differ.
fn enrollment_key(key: &EnrollmentKey) -> Vec<u8> {
    let term = match &key.term {
        Some(term) => format!("+{term}"),
        None => "-".to_string(),
    };
    composite_key(&[
        key.buyer_id.as_str(),
        key.subject.as_str(),
        key.grade.as_str(),
        term.as_str(),
    ])
}

fn entry_key(key: &EntryKey) -> Vec<u8> {
    composite_key(&[key.referrer_id.as_str(), key.payment_reference.as_str()])
}

/// A persistent ledger store backed by RocksDB.
///
/// Each record type lives in its own Column Family, serialized as JSON.
/// Transactions take a process-wide writer lock and stage their writes;
/// `commit` applies them as one atomic `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbLedgerStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDbLedgerStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedgerStore {
    async fn begin(&self) -> Result<LedgerTransactionBox> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(RocksDbTransaction {
            db: self.db.clone(),
            _guard: guard,
            staged: BTreeMap::new(),
        }))
    }
}

struct RocksDbTransaction {
    db: Arc<DB>,
    _guard: OwnedMutexGuard<()>,
    staged: BTreeMap<(&'static str, Vec<u8>), Vec<u8>>,
}

fn column_family<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name).ok_or_else(|| {
        SettlementError::InternalError(format!("{name} column family not found"))
    })
}

impl RocksDbTransaction {
    fn read<T: DeserializeOwned>(&self, cf: &'static str, key: Vec<u8>) -> Result<Option<T>> {
        let staged_key = (cf, key);
        if let Some(bytes) = self.staged.get(&staged_key) {
            return Ok(Some(serde_json::from_slice(bytes)?));
        }

        let handle = column_family(&self.db, cf)?;
        match self.db.get_cf(handle, &staged_key.1)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every row whose key starts with `prefix`, staged rows taking precedence.
    fn scan<T: DeserializeOwned>(&self, cf: &'static str, prefix: &[u8]) -> Result<Vec<T>> {
        let handle = column_family(&self.db, cf)?;
        let mut rows: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        let iter = self
            .db
            .iterator_cf(handle, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.insert(key.to_vec(), value.to_vec());
        }

        for ((name, key), value) in &self.staged {
            if *name == cf && key.starts_with(prefix) {
                rows.insert(key.clone(), value.clone());
            }
        }

        rows.values()
            .map(|bytes| serde_json::from_slice(bytes).map_err(SettlementError::from))
            .collect()
    }

    fn stage<T: Serialize>(&mut self, cf: &'static str, key: Vec<u8>, value: &T) -> Result<()> {
        self.staged.insert((cf, key), serde_json::to_vec(value)?);
        Ok(())
    }
}

impl LedgerTransaction for RocksDbTransaction {
    fn attempt(&self, reference: &str) -> Result<Option<PaymentAttempt>> {
        self.read(CF_ATTEMPTS, reference.as_bytes().to_vec())
    }

    fn put_attempt(&mut self, attempt: PaymentAttempt) -> Result<()> {
        let key = attempt.reference.as_bytes().to_vec();
        self.stage(CF_ATTEMPTS, key, &attempt)
    }

    fn attempts(&self) -> Result<Vec<PaymentAttempt>> {
        self.scan(CF_ATTEMPTS, &[])
    }

    fn buyer(&self, buyer_id: &str) -> Result<Option<BuyerProfile>> {
        self.read(CF_BUYERS, buyer_id.as_bytes().to_vec())
    }

    fn put_buyer(&mut self, profile: BuyerProfile) -> Result<()> {
        let key = profile.buyer_id.as_bytes().to_vec();
        self.stage(CF_BUYERS, key, &profile)
    }

    fn enrollment(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>> {
        self.read(CF_ENROLLMENTS, enrollment_key(key))
    }

    fn put_enrollment(&mut self, enrollment: Enrollment) -> Result<()> {
        let key = enrollment_key(&enrollment.key);
        self.stage(CF_ENROLLMENTS, key, &enrollment)
    }

    fn enrollments_for(&self, buyer_id: &str) -> Result<Vec<Enrollment>> {
        self.scan(CF_ENROLLMENTS, &composite_key(&[buyer_id]))
    }

    fn referrer(&self, referrer_id: &str) -> Result<Option<ReferrerAccount>> {
        self.read(CF_REFERRERS, referrer_id.as_bytes().to_vec())
    }

    fn put_referrer(&mut self, account: ReferrerAccount) -> Result<()> {
        let key = account.referrer_id.as_bytes().to_vec();
        self.stage(CF_REFERRERS, key, &account)
    }

    fn referrers(&self) -> Result<Vec<ReferrerAccount>> {
        self.scan(CF_REFERRERS, &[])
    }

    fn entry(&self, key: &EntryKey) -> Result<Option<CommissionEntry>> {
        self.read(CF_ENTRIES, entry_key(key))
    }

    fn put_entry(&mut self, entry: CommissionEntry) -> Result<()> {
        let key = entry_key(&entry.key());
        self.stage(CF_ENTRIES, key, &entry)
    }

    fn entries_for(&self, referrer_id: &str) -> Result<Vec<CommissionEntry>> {
        self.scan(CF_ENTRIES, &composite_key(&[referrer_id]))
    }

    fn put_batch(&mut self, batch: PayoutBatch) -> Result<()> {
        let batch_id = batch.id.to_string();
        let key = composite_key(&[batch.referrer_id.as_str(), batch_id.as_str()]);
        self.stage(CF_BATCHES, key, &batch)
    }

    fn batches_for(&self, referrer_id: &str) -> Result<Vec<PayoutBatch>> {
        self.scan(CF_BATCHES, &composite_key(&[referrer_id]))
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let RocksDbTransaction { db, staged, _guard } = *self;

        let mut batch = WriteBatch::default();
        for ((cf, key), value) in staged {
            let handle = column_family(&db, cf)?;
            batch.put_cf(handle, key, value);
        }
        db.write(batch)?;
        Ok(())
    }
}
