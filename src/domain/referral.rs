use super::money::{CommissionRate, Money};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

/// A referral partner and the running totals of what they have earned.
///
/// `pending_earnings` and `paid_out_earnings` summarise the partner's
/// [`CommissionEntry`] rows. They are only ever changed in the same store
/// transaction that writes those entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerAccount {
    pub referrer_id: String,
    pub commission_rate: CommissionRate,
    pub bank_details: Option<BankDetails>,
    pub pending_earnings: Money,
    pub paid_out_earnings: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReferrerAccount {
    pub fn new(
        referrer_id: String,
        commission_rate: CommissionRate,
        bank_details: Option<BankDetails>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            referrer_id,
            commission_rate,
            bank_details,
            pending_earnings: Money::ZERO,
            paid_out_earnings: Money::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn credit_pending(&mut self, amount: Money, now: DateTime<Utc>) -> Result<()> {
        self.pending_earnings = self.pending_earnings.checked_add(amount).ok_or_else(|| {
            SettlementError::LedgerInconsistency(format!(
                "pending earnings of {} overflow",
                self.referrer_id
            ))
        })?;
        self.updated_at = now;
        Ok(())
    }

    /// Moves exactly `amount` from pending to paid out.
    pub fn settle_payout(&mut self, amount: Money, now: DateTime<Utc>) -> Result<()> {
        let remaining = self.pending_earnings.checked_sub(amount).ok_or_else(|| {
            SettlementError::LedgerInconsistency(format!(
                "referrer {} has {} pending but {} is batched",
                self.referrer_id, self.pending_earnings, amount
            ))
        })?;
        let paid_out = self.paid_out_earnings.checked_add(amount).ok_or_else(|| {
            SettlementError::LedgerInconsistency(format!(
                "paid out earnings of {} overflow",
                self.referrer_id
            ))
        })?;
        self.pending_earnings = remaining;
        self.paid_out_earnings = paid_out;
        self.updated_at = now;
        Ok(())
    }
}

/// Partial update of the settings a referrer controls from their dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub bank_details: Option<BankDetails>,
    #[serde(default)]
    pub commission_rate: Option<CommissionRate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Paid,
}

/// Unique key of a commission entry: one per payment and referrer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub referrer_id: String,
    pub payment_reference: String,
}

impl EntryKey {
    pub fn new(referrer_id: &str, payment_reference: &str) -> Self {
        Self {
            referrer_id: referrer_id.to_string(),
            payment_reference: payment_reference.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionEntry {
    pub payment_reference: String,
    pub referrer_id: String,
    pub amount_paid: Money,
    /// The rate in force when the entry was accrued.
    pub commission_rate: CommissionRate,
    pub commission_amount: Money,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payout_batch_id: Option<Uuid>,
}

impl CommissionEntry {
    pub fn accrue(
        payment_reference: &str,
        referrer_id: &str,
        amount_paid: Money,
        commission_rate: CommissionRate,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            payment_reference: payment_reference.to_string(),
            referrer_id: referrer_id.to_string(),
            amount_paid,
            commission_rate,
            commission_amount: commission_rate.commission_on(amount_paid)?,
            status: EntryStatus::Pending,
            created_at: now,
            paid_at: None,
            payout_batch_id: None,
        })
    }

    pub fn key(&self) -> EntryKey {
        EntryKey::new(&self.referrer_id, &self.payment_reference)
    }

    pub fn mark_paid(&mut self, batch_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        if self.status == EntryStatus::Paid {
            return Err(SettlementError::LedgerInconsistency(format!(
                "commission for {} was already paid in batch {:?}",
                self.payment_reference, self.payout_batch_id
            )));
        }
        self.status = EntryStatus::Paid;
        self.paid_at = Some(now);
        self.payout_batch_id = Some(batch_id);
        Ok(())
    }
}

/// An instruction to disburse a referrer's batched commission. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutBatch {
    pub id: Uuid,
    pub referrer_id: String,
    pub amount: Money,
    pub entry_keys: Vec<EntryKey>,
    pub created_at: DateTime<Utc>,
}

/// The referral attribution stored on a buyer's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerProfile {
    pub buyer_id: String,
    pub referrer_id: Option<String>,
    pub attributed_at: Option<DateTime<Utc>>,
}

/// Aggregates compared against the entries they summarise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub referrer_id: String,
    pub pending_earnings: Money,
    pub pending_entry_total: Money,
    pub paid_out_earnings: Money,
    pub paid_entry_total: Money,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.pending_earnings == self.pending_entry_total
            && self.paid_out_earnings == self.paid_entry_total
    }
}
