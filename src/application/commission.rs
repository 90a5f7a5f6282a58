//! Referral Commission Engine.

use super::engine::SettlementEngine;
use crate::domain::money::Money;
use crate::domain::payment::PaymentStatus;
use crate::domain::ports::LedgerTransaction;
use crate::domain::referral::{CommissionEntry, EntryKey};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Accrues commission for one payment inside an open transaction.
///
/// Returns `None` when the payment already has an entry for this referrer.
/// The entry and the referrer's `pending_earnings` are staged together so
/// the aggregate can not drift from the entries.
pub(crate) fn accrue_within(
    tx: &mut dyn LedgerTransaction,
    payment_reference: &str,
    referrer_id: &str,
    amount_paid: Money,
    now: DateTime<Utc>,
) -> Result<Option<CommissionEntry>> {
    let key = EntryKey::new(referrer_id, payment_reference);
    if tx.entry(&key)?.is_some() {
        debug!(%payment_reference, %referrer_id, "commission already accrued");
        return Ok(None);
    }

    let mut account = tx
        .referrer(referrer_id)?
        .ok_or_else(|| SettlementError::UnknownReferrer(referrer_id.to_string()))?;
    let entry = CommissionEntry::accrue(
        payment_reference,
        referrer_id,
        amount_paid,
        account.commission_rate,
        now,
    )?;
    account.credit_pending(entry.commission_amount, now)?;

    tx.put_entry(entry.clone())?;
    tx.put_referrer(account)?;
    info!(
        %payment_reference,
        %referrer_id,
        rate = %entry.commission_rate,
        commission = %entry.commission_amount,
        "referral commission accrued"
    );
    Ok(Some(entry))
}

impl SettlementEngine {
    /// Accrues a referrer's commission on a successful payment.
    ///
    /// Verification accrues automatically; this entry point exists for
    /// collaborators replaying settlement and is a no-op once accrued. The
    /// referrer and amount must be the ones recorded on the payment.
    pub async fn accrue(
        &self,
        payment_reference: &str,
        referrer_id: &str,
        amount_paid: Money,
    ) -> Result<Option<CommissionEntry>> {
        let mut tx = self.begin().await?;
        let attempt = tx
            .attempt(payment_reference)?
            .ok_or_else(|| SettlementError::UnknownReference(payment_reference.to_string()))?;
        if attempt.status != PaymentStatus::Success {
            return Err(SettlementError::ValidationError(format!(
                "Payment {payment_reference} is {:?}, commission requires a successful payment",
                attempt.status
            )));
        }
        if attempt.referrer_id.as_deref() != Some(referrer_id) {
            return Err(SettlementError::ValidationError(format!(
                "Payment {payment_reference} was not referred by {referrer_id}"
            )));
        }
        if amount_paid != attempt.amount {
            return Err(SettlementError::AmountMismatch {
                reference: payment_reference.to_string(),
                expected: attempt.amount,
                reported: amount_paid,
            });
        }

        let entry = accrue_within(
            tx.as_mut(),
            payment_reference,
            referrer_id,
            amount_paid,
            Utc::now(),
        )?;
        if entry.is_some() {
            tx.commit()?;
        }
        Ok(entry)
    }
}
