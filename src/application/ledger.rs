//! Payment Ledger: opening charge attempts and driving them to a terminal state.

use super::commission::accrue_within;
use super::engine::{PaymentInit, SettlementEngine, Verification, require};
use super::enrollment::grant_within;
use crate::domain::enrollment::Enrollment;
use crate::domain::money::Money;
use crate::domain::payment::{CartItem, ChargeStatus, PaymentAttempt, PaymentStatus};
use crate::domain::ports::LedgerTransaction;
use crate::error::{Result, SettlementError};
use chrono::{Duration, Utc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

fn unavailable(err: SettlementError) -> SettlementError {
    match err {
        SettlementError::GatewayUnavailable(_) => err,
        other => SettlementError::GatewayUnavailable(other.to_string()),
    }
}

fn unknown(reference: &str) -> SettlementError {
    SettlementError::UnknownReference(reference.to_string())
}

/// Enrollments produced by a successful attempt, as currently stored.
fn settled_enrollments(
    tx: &dyn LedgerTransaction,
    attempt: &PaymentAttempt,
) -> Result<Vec<Enrollment>> {
    if attempt.status != PaymentStatus::Success {
        return Ok(Vec::new());
    }
    let mut enrollments = Vec::with_capacity(attempt.items.len());
    for item in &attempt.items {
        if let Some(enrollment) = tx.enrollment(&item.enrollment_key(&attempt.buyer_id))?
            && !enrollments.contains(&enrollment)
        {
            enrollments.push(enrollment);
        }
    }
    Ok(enrollments)
}

impl SettlementEngine {
    /// Records a pending attempt for the cart under a fresh reference, then
    /// opens the charge with the gateway.
    pub async fn initialize_payment(
        &self,
        buyer_id: &str,
        items: Vec<CartItem>,
        callback_url: &str,
    ) -> Result<PaymentInit> {
        let reference = self.new_reference();
        self.initialize_payment_with_reference(&reference, buyer_id, items, callback_url)
            .await
    }

    /// Like [`initialize_payment`](Self::initialize_payment) with a
    /// caller-chosen reference, which must not have been used before.
    ///
    /// The attempt is persisted before the gateway is called, so a charge the
    /// gateway knows about always has a local record. If the gateway call
    /// fails the attempt stays pending and the caller retries with a new
    /// reference.
    pub async fn initialize_payment_with_reference(
        &self,
        reference: &str,
        buyer_id: &str,
        items: Vec<CartItem>,
        callback_url: &str,
    ) -> Result<PaymentInit> {
        require(reference, "Payment reference")?;
        require(buyer_id, "Buyer id")?;
        require(callback_url, "Callback URL")?;

        let attempt = {
            let mut tx = self.begin().await?;
            if tx.attempt(reference)?.is_some() {
                return Err(SettlementError::DuplicateReference(reference.to_string()));
            }
            let referrer_id = tx
                .buyer(buyer_id)?
                .and_then(|profile| profile.referrer_id);
            let attempt = PaymentAttempt::open(
                reference.to_string(),
                buyer_id.to_string(),
                referrer_id,
                items,
                callback_url.to_string(),
                Utc::now(),
            )?;
            tx.put_attempt(attempt.clone())?;
            tx.commit()?;
            attempt
        };
        info!(
            %reference,
            %buyer_id,
            amount = %attempt.amount,
            referrer = ?attempt.referrer_id,
            "payment attempt recorded"
        );

        let charge = timeout(
            self.config.gateway_timeout,
            self.gateway
                .init_charge(attempt.amount, reference, callback_url),
        )
        .await;
        let authorization_url = match charge {
            Ok(Ok(url)) => url,
            Ok(Err(err)) => {
                warn!(%reference, %err, "gateway refused to open charge");
                return Err(unavailable(err));
            }
            Err(_) => {
                warn!(%reference, "gateway timed out opening charge");
                return Err(SettlementError::GatewayUnavailable(format!(
                    "opening charge {reference} timed out after {:?}",
                    self.config.gateway_timeout
                )));
            }
        };

        Ok(PaymentInit {
            reference: reference.to_string(),
            authorization_url,
        })
    }

    /// Checks a payment with the gateway and settles it.
    ///
    /// Safe to call any number of times: once an attempt is terminal its stored
    /// result is returned and nothing is granted or accrued again. A
    /// gateway that is still processing, or that does not answer within the
    /// configured timeout, yields `pending`.
    pub async fn verify(&self, reference: &str) -> Result<Verification> {
        let (attempt, enrollments) = {
            let tx = self.begin().await?;
            let attempt = tx.attempt(reference)?.ok_or_else(|| unknown(reference))?;
            let enrollments = settled_enrollments(tx.as_ref(), &attempt)?;
            (attempt, enrollments)
        };
        if attempt.status.is_terminal() {
            debug!(%reference, status = ?attempt.status, "payment already settled");
            return Ok(Verification::of(&attempt, enrollments));
        }

        let charge = match timeout(
            self.config.gateway_timeout,
            self.gateway.charge_status(reference),
        )
        .await
        {
            Ok(result) => result.map_err(|err| {
                warn!(%reference, %err, "gateway status query failed");
                unavailable(err)
            })?,
            Err(_) => {
                warn!(
                    %reference,
                    timeout = ?self.config.gateway_timeout,
                    "gateway status query timed out, payment stays pending"
                );
                return Ok(Verification::of(&attempt, Vec::new()));
            }
        };

        match charge {
            ChargeStatus::Pending => {
                debug!(%reference, "charge still pending at gateway");
                Ok(Verification::of(&attempt, Vec::new()))
            }
            ChargeStatus::Failed => self.settle_failed(reference).await,
            ChargeStatus::Paid { amount_paid } => self.settle_paid(reference, amount_paid).await,
        }
    }

    async fn settle_paid(&self, reference: &str, amount_paid: Money) -> Result<Verification> {
        let mut tx = self.begin().await?;
        let mut attempt = tx.attempt(reference)?.ok_or_else(|| unknown(reference))?;
        if attempt.status.is_terminal() {
            info!(%reference, status = ?attempt.status, "payment was settled by a concurrent verification");
            let enrollments = settled_enrollments(tx.as_ref(), &attempt)?;
            return Ok(Verification::of(&attempt, enrollments));
        }

        if amount_paid != attempt.amount {
            attempt.mark_failed()?;
            tx.put_attempt(attempt.clone())?;
            tx.commit()?;
            error!(
                %reference,
                expected = %attempt.amount,
                reported = %amount_paid,
                "gateway reported a different amount, payment failed"
            );
            return Err(SettlementError::AmountMismatch {
                reference: reference.to_string(),
                expected: attempt.amount,
                reported: amount_paid,
            });
        }

        let now = Utc::now();
        attempt.mark_succeeded(now)?;
        tx.put_attempt(attempt.clone())?;
        let enrollments =
            grant_within(tx.as_mut(), &attempt.buyer_id, reference, &attempt.items, now)?;
        if let Some(referrer_id) = &attempt.referrer_id {
            accrue_within(tx.as_mut(), reference, referrer_id, attempt.amount, now)?;
        }
        tx.commit()?;

        info!(
            %reference,
            buyer_id = %attempt.buyer_id,
            amount = %attempt.amount,
            enrollments = enrollments.len(),
            "payment settled"
        );
        Ok(Verification::of(&attempt, enrollments))
    }

    async fn settle_failed(&self, reference: &str) -> Result<Verification> {
        let mut tx = self.begin().await?;
        let mut attempt = tx.attempt(reference)?.ok_or_else(|| unknown(reference))?;
        if attempt.status.is_terminal() {
            let enrollments = settled_enrollments(tx.as_ref(), &attempt)?;
            return Ok(Verification::of(&attempt, enrollments));
        }

        attempt.mark_failed()?;
        tx.put_attempt(attempt.clone())?;
        tx.commit()?;
        info!(%reference, "payment failed at gateway");
        Ok(Verification::of(&attempt, Vec::new()))
    }

    pub async fn get_attempt(&self, reference: &str) -> Result<PaymentAttempt> {
        let tx = self.begin().await?;
        tx.attempt(reference)?.ok_or_else(|| unknown(reference))
    }

    /// Pending attempts opened more than `older_than` ago, oldest first.
    ///
    /// The ledger never expires attempts on its own; this feeds whatever
    /// cleanup policy the scheduler applies.
    pub async fn stale_attempts(&self, older_than: Duration) -> Result<Vec<PaymentAttempt>> {
        let cutoff = Utc::now() - older_than;
        let tx = self.begin().await?;
        let mut stale: Vec<PaymentAttempt> = tx
            .attempts()?
            .into_iter()
            .filter(|attempt| attempt.status == PaymentStatus::Pending && attempt.created_at < cutoff)
            .collect();
        stale.sort_by_key(|attempt| attempt.created_at);
        Ok(stale)
    }
}
