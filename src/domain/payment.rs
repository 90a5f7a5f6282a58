use super::enrollment::EnrollmentKey;
use super::money::Money;
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the cart, frozen at checkout.
///
/// The price is what the buyer was quoted; verification never re-reads it
/// from the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub subject: String,
    pub grade: String,
    #[serde(default)]
    pub term: Option<String>,
    pub price: Money,
}

impl CartItem {
    pub fn new(
        subject: impl Into<String>,
        grade: impl Into<String>,
        term: Option<&str>,
        price: Money,
    ) -> Self {
        Self {
            subject: subject.into(),
            grade: grade.into(),
            term: term.map(str::to_string),
            price,
        }
    }

    pub fn enrollment_key(&self, buyer_id: &str) -> EnrollmentKey {
        EnrollmentKey::new(buyer_id, &self.subject, &self.grade, self.term.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// A single charge attempt and its settlement state.
///
/// Status only ever moves `pending -> success` or `pending -> failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub reference: String,
    pub buyer_id: String,
    /// Frozen at initialization from the buyer's attribution.
    pub referrer_id: Option<String>,
    pub amount: Money,
    pub items: Vec<CartItem>,
    pub callback_url: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    /// Validates the cart and opens a `pending` attempt for its total.
    pub fn open(
        reference: String,
        buyer_id: String,
        referrer_id: Option<String>,
        items: Vec<CartItem>,
        callback_url: String,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(SettlementError::ValidationError(
                "Cart must contain at least one item".to_string(),
            ));
        }
        if let Some(item) = items
            .iter()
            .find(|item| item.subject.trim().is_empty() || item.grade.trim().is_empty())
        {
            return Err(SettlementError::ValidationError(format!(
                "Cart item is missing a subject or grade: {item:?}"
            )));
        }
        if let Some(item) = items
            .iter()
            .find(|item| item.term.as_deref().is_some_and(|term| term.trim().is_empty()))
        {
            return Err(SettlementError::ValidationError(format!(
                "Cart item has a blank term, omit it instead: {item:?}"
            )));
        }

        let amount = items
            .iter()
            .try_fold(Money::ZERO, |total, item| total.checked_add(item.price))
            .ok_or_else(|| {
                SettlementError::ValidationError("Cart total overflows".to_string())
            })?;
        if amount.is_zero() {
            return Err(SettlementError::ValidationError(
                "Cart total must be positive".to_string(),
            ));
        }

        Ok(Self {
            reference,
            buyer_id,
            referrer_id,
            amount,
            items,
            callback_url,
            status: PaymentStatus::Pending,
            created_at: now,
            verified_at: None,
        })
    }

    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = PaymentStatus::Success;
        self.verified_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.status = PaymentStatus::Failed;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status.is_terminal() {
            Err(SettlementError::ValidationError(format!(
                "Payment {} is already {:?}",
                self.reference, self.status
            )))
        } else {
            Ok(())
        }
    }
}

/// What the payment provider reports about a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ChargeStatus {
    Paid { amount_paid: Money },
    Failed,
    Pending,
}
