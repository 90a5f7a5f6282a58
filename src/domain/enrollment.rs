use super::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one course a buyer can own. At most one [`Enrollment`] exists per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnrollmentKey {
    pub buyer_id: String,
    pub subject: String,
    pub grade: String,
    #[serde(default)]
    pub term: Option<String>,
}

impl EnrollmentKey {
    pub fn new(buyer_id: &str, subject: &str, grade: &str, term: Option<&str>) -> Self {
        Self {
            buyer_id: buyer_id.to_string(),
            subject: subject.to_string(),
            grade: grade.to_string(),
            term: term.map(str::to_string),
        }
    }
}

impl fmt::Display for EnrollmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.buyer_id, self.subject, self.grade)?;
        if let Some(term) = &self.term {
            write!(f, "/{term}")?;
        }
        Ok(())
    }
}

/// What a grant did to an enrollment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Created,
    Reactivated,
    /// Already active; the newer purchase's price and timestamp were recorded.
    Refreshed,
    /// The same payment was granted before.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub key: EnrollmentKey,
    pub source_payment_reference: String,
    pub purchase_price: Money,
    pub is_active: bool,
    pub purchased_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn new(key: EnrollmentKey, reference: &str, price: Money, now: DateTime<Utc>) -> Self {
        Self {
            key,
            source_payment_reference: reference.to_string(),
            purchase_price: price,
            is_active: true,
            purchased_at: now,
        }
    }

    /// Records a purchase of an existing enrollment.
    ///
    /// Re-applying the payment that already produced this row changes nothing,
    /// so an administrative deactivation is not undone by a replayed grant.
    pub fn apply_purchase(
        &mut self,
        reference: &str,
        price: Money,
        now: DateTime<Utc>,
    ) -> GrantOutcome {
        if self.source_payment_reference == reference {
            return GrantOutcome::Unchanged;
        }

        let outcome = if self.is_active {
            GrantOutcome::Refreshed
        } else {
            GrantOutcome::Reactivated
        };
        self.is_active = true;
        self.source_payment_reference = reference.to_string();
        self.purchase_price = price;
        self.purchased_at = now;
        outcome
    }
}
