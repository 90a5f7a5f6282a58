//! Payout Batcher: drains a referrer's pending commission into a payout batch.

use super::engine::SettlementEngine;
use crate::domain::money::Money;
use crate::domain::referral::{EntryStatus, PayoutBatch, Reconciliation};
use crate::error::{Result, SettlementError};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

impl SettlementEngine {
    /// Batches every pending commission entry of the referrer into one payout
    /// instruction.
    ///
    /// The entries are marked paid, and `pending_earnings` is reduced by exactly
    /// the batched sum, in the same transaction that writes the batch. Funds
    /// transfer happens out of band.
    pub async fn request_payout(&self, referrer_id: &str) -> Result<PayoutBatch> {
        let mut tx = self.begin().await?;
        let mut account = tx
            .referrer(referrer_id)?
            .ok_or_else(|| SettlementError::UnknownReferrer(referrer_id.to_string()))?;
        if account.pending_earnings.is_zero() {
            return Err(SettlementError::NothingToPayout(referrer_id.to_string()));
        }

        let mut entries: Vec<_> = tx
            .entries_for(referrer_id)?
            .into_iter()
            .filter(|entry| entry.status == EntryStatus::Pending)
            .collect();
        if entries.is_empty() {
            error!(
                %referrer_id,
                pending_earnings = %account.pending_earnings,
                "pending earnings without pending commission entries"
            );
            return Err(SettlementError::LedgerInconsistency(format!(
                "referrer {referrer_id} has {} pending earnings but no pending entries",
                account.pending_earnings
            )));
        }

        let amount = entries
            .iter()
            .try_fold(Money::ZERO, |total, entry| {
                total.checked_add(entry.commission_amount)
            })
            .ok_or_else(|| {
                SettlementError::LedgerInconsistency(format!(
                    "pending entries of {referrer_id} overflow"
                ))
            })?;

        let now = Utc::now();
        let batch = PayoutBatch {
            id: Uuid::new_v4(),
            referrer_id: referrer_id.to_string(),
            amount,
            entry_keys: entries.iter().map(|entry| entry.key()).collect(),
            created_at: now,
        };

        for entry in &mut entries {
            entry.mark_paid(batch.id, now)?;
        }
        if let Err(err) = account.settle_payout(amount, now) {
            error!(%referrer_id, %amount, %err, "payout exceeds pending earnings");
            return Err(err);
        }

        for entry in entries {
            tx.put_entry(entry)?;
        }
        tx.put_referrer(account)?;
        tx.put_batch(batch.clone())?;
        tx.commit()?;

        info!(
            %referrer_id,
            batch_id = %batch.id,
            %amount,
            entries = batch.entry_keys.len(),
            "payout batch created"
        );
        Ok(batch)
    }

    /// Payout batches of the referrer, newest first.
    pub async fn list_payouts(&self, referrer_id: &str) -> Result<Vec<PayoutBatch>> {
        let tx = self.begin().await?;
        if tx.referrer(referrer_id)?.is_none() {
            return Err(SettlementError::UnknownReferrer(referrer_id.to_string()));
        }
        let mut batches = tx.batches_for(referrer_id)?;
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(batches)
    }

    /// Compares the referrer's cached aggregates with the sums of their entries.
    ///
    /// Drift is reported, never repaired: operators reconcile by hand.
    pub async fn reconcile(&self, referrer_id: &str) -> Result<Reconciliation> {
        let tx = self.begin().await?;
        let account = tx
            .referrer(referrer_id)?
            .ok_or_else(|| SettlementError::UnknownReferrer(referrer_id.to_string()))?;

        let mut pending_entry_total = Money::ZERO;
        let mut paid_entry_total = Money::ZERO;
        for entry in tx.entries_for(referrer_id)? {
            let total = match entry.status {
                EntryStatus::Pending => &mut pending_entry_total,
                EntryStatus::Paid => &mut paid_entry_total,
            };
            *total = total.checked_add(entry.commission_amount).ok_or_else(|| {
                SettlementError::LedgerInconsistency(format!(
                    "commission entries of {referrer_id} overflow"
                ))
            })?;
        }

        let report = Reconciliation {
            referrer_id: referrer_id.to_string(),
            pending_earnings: account.pending_earnings,
            pending_entry_total,
            paid_out_earnings: account.paid_out_earnings,
            paid_entry_total,
        };
        if !report.is_consistent() {
            warn!(?report, "referrer aggregates drifted from commission entries");
        }
        Ok(report)
    }
}
