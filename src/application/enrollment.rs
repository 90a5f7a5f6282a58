//! Enrollment Granter: course access derived from verified payments.

use super::engine::{SettlementEngine, require};
use crate::domain::enrollment::{Enrollment, EnrollmentKey, GrantOutcome};
use crate::domain::payment::{CartItem, PaymentStatus};
use crate::domain::ports::LedgerTransaction;
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Upserts one enrollment per cart line inside an open transaction.
pub(crate) fn grant_within(
    tx: &mut dyn LedgerTransaction,
    buyer_id: &str,
    reference: &str,
    items: &[CartItem],
    now: DateTime<Utc>,
) -> Result<Vec<Enrollment>> {
    let mut granted: Vec<Enrollment> = Vec::with_capacity(items.len());
    for item in items {
        let key = item.enrollment_key(buyer_id);
        let (enrollment, outcome) = match tx.enrollment(&key)? {
            Some(mut existing) => {
                let outcome = existing.apply_purchase(reference, item.price, now);
                (existing, outcome)
            }
            None => (
                Enrollment::new(key, reference, item.price, now),
                GrantOutcome::Created,
            ),
        };
        if outcome != GrantOutcome::Unchanged {
            tx.put_enrollment(enrollment.clone())?;
        }
        debug!(key = %enrollment.key, ?outcome, %reference, "enrollment granted");

        // A cart may list the same course twice; report it once.
        if !granted.iter().any(|existing| existing.key == enrollment.key) {
            granted.push(enrollment);
        }
    }
    Ok(granted)
}

impl SettlementEngine {
    /// Grants the courses of a verified payment to its buyer.
    ///
    /// `items` must be lines of that payment's cart; anything else is rejected.
    /// Verification already does this as part of settling; calling it again
    /// for the same payment changes nothing.
    pub async fn grant(
        &self,
        buyer_id: &str,
        payment_reference: &str,
        items: &[CartItem],
    ) -> Result<Vec<Enrollment>> {
        let mut tx = self.begin().await?;
        let attempt = tx
            .attempt(payment_reference)?
            .ok_or_else(|| SettlementError::UnknownReference(payment_reference.to_string()))?;
        if attempt.status != PaymentStatus::Success {
            return Err(SettlementError::ValidationError(format!(
                "Payment {payment_reference} is {:?}, access requires a successful payment",
                attempt.status
            )));
        }
        if attempt.buyer_id != buyer_id {
            return Err(SettlementError::ValidationError(format!(
                "Payment {payment_reference} does not belong to buyer {buyer_id}"
            )));
        }
        // Only lines frozen on the attempt, at their checkout price, can be granted.
        if let Some(item) = items.iter().find(|&item| !attempt.items.contains(item)) {
            return Err(SettlementError::ValidationError(format!(
                "Payment {payment_reference} did not purchase {item:?}"
            )));
        }

        let enrollments = grant_within(tx.as_mut(), buyer_id, payment_reference, items, Utc::now())?;
        tx.commit()?;
        Ok(enrollments)
    }

    /// Whether the buyer may open the course's lessons.
    pub async fn has_access(
        &self,
        buyer_id: &str,
        subject: &str,
        grade: &str,
        term: Option<&str>,
    ) -> Result<bool> {
        let key = EnrollmentKey::new(buyer_id, subject, grade, term);
        let tx = self.begin().await?;
        Ok(tx
            .enrollment(&key)?
            .is_some_and(|enrollment| enrollment.is_active))
    }

    pub async fn list_enrollments(&self, buyer_id: &str) -> Result<Vec<Enrollment>> {
        let tx = self.begin().await?;
        tx.enrollments_for(buyer_id)
    }

    /// Administrative switch for an existing enrollment. Purchase fields are left alone.
    pub async fn set_enrollment_active(
        &self,
        key: &EnrollmentKey,
        active: bool,
    ) -> Result<Enrollment> {
        require(&key.buyer_id, "Buyer id")?;
        let mut tx = self.begin().await?;
        let mut enrollment = tx
            .enrollment(key)?
            .ok_or_else(|| SettlementError::UnknownEnrollment(key.to_string()))?;
        if enrollment.is_active != active {
            enrollment.is_active = active;
            tx.put_enrollment(enrollment.clone())?;
            tx.commit()?;
            info!(%key, active, "enrollment access changed");
        }
        Ok(enrollment)
    }
}
