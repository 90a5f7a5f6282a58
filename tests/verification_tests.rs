mod common;

use chrono::Utc;
use common::{CALLBACK_URL, harness, harness_with, item};
use rust_decimal_macros::dec;
use std::time::Duration;
use storefront_settlement::config::SettlementConfig;
use storefront_settlement::domain::money::Money;
use storefront_settlement::domain::payment::{ChargeStatus, PaymentAttempt, PaymentStatus};
use storefront_settlement::domain::referral::EntryStatus;
use storefront_settlement::error::SettlementError;

#[tokio::test]
async fn test_referred_purchase_scenario() {
    let h = harness();
    h.referrer("R", dec!(0.10)).await;
    h.referred_buyer("buyer-1", "R").await;

    let reference = h.checkout("buyer-1", vec![item("maths", "jss1", 5000)]).await;
    h.gateway.pay_in_full(&reference).await.unwrap();
    let verification = h.engine.verify(&reference).await.unwrap();

    assert_eq!(verification.status, PaymentStatus::Success);
    assert_eq!(verification.enrollments.len(), 1);
    assert_eq!(verification.enrollments[0].purchase_price, Money::new(5000));
    assert!(h.engine.has_access("buyer-1", "maths", "jss1", None).await.unwrap());

    let entries = h.engine.list_transactions("R").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payment_reference, reference);
    assert_eq!(entries[0].amount_paid, Money::new(5000));
    assert_eq!(entries[0].commission_amount, Money::new(500));
    assert_eq!(entries[0].status, EntryStatus::Pending);

    let account = h.engine.get_settings("R").await.unwrap();
    assert_eq!(account.pending_earnings, Money::new(500));
    assert_eq!(account.paid_out_earnings, Money::ZERO);
}

#[tokio::test]
async fn test_repeated_verification_is_idempotent() {
    let h = harness();
    h.referrer("R", dec!(0.10)).await;
    h.referred_buyer("buyer-1", "R").await;

    let reference = h
        .checkout(
            "buyer-1",
            vec![item("maths", "jss1", 3000), item("english", "jss1", 2000)],
        )
        .await;
    h.gateway.pay_in_full(&reference).await.unwrap();

    let first = h.engine.verify(&reference).await.unwrap();
    for _ in 0..5 {
        let again = h.engine.verify(&reference).await.unwrap();
        assert_eq!(again, first);
    }

    let attempt = h.engine.get_attempt(&reference).await.unwrap();
    assert_eq!(attempt.status, PaymentStatus::Success);
    assert!(attempt.verified_at.is_some());
    assert_eq!(h.engine.list_enrollments("buyer-1").await.unwrap().len(), 2);
    assert_eq!(h.engine.list_transactions("R").await.unwrap().len(), 1);
    assert_eq!(
        h.engine.get_settings("R").await.unwrap().pending_earnings,
        Money::new(500)
    );
}

#[tokio::test]
async fn test_terminal_status_is_not_requeried() {
    let h = harness();
    let reference = h.purchase("buyer-1", vec![item("maths", "jss1", 5000)]).await;

    // The gateway changing its mind later has no effect on a settled attempt.
    h.gateway.settle(&reference, ChargeStatus::Failed).await;
    h.gateway.set_offline(true).await;

    let verification = h.engine.verify(&reference).await.unwrap();
    assert_eq!(verification.status, PaymentStatus::Success);
    assert_eq!(verification.enrollments.len(), 1);
}

#[tokio::test]
async fn test_amount_mismatch_fails_payment() {
    let h = harness();
    h.referrer("R", dec!(0.10)).await;
    h.referred_buyer("buyer-1", "R").await;

    let reference = h.checkout("buyer-1", vec![item("maths", "jss1", 5000)]).await;
    h.gateway
        .settle(
            &reference,
            ChargeStatus::Paid {
                amount_paid: Money::new(4000),
            },
        )
        .await;

    let result = h.engine.verify(&reference).await;
    assert!(matches!(
        result,
        Err(SettlementError::AmountMismatch { expected, reported, .. })
            if expected == Money::new(5000) && reported == Money::new(4000)
    ));

    let attempt = h.engine.get_attempt(&reference).await.unwrap();
    assert_eq!(attempt.status, PaymentStatus::Failed);
    assert!(h.engine.list_enrollments("buyer-1").await.unwrap().is_empty());
    assert!(h.engine.list_transactions("R").await.unwrap().is_empty());
    assert_eq!(
        h.engine.get_settings("R").await.unwrap().pending_earnings,
        Money::ZERO
    );

    // Settled as failed: a later call returns the stored result.
    let again = h.engine.verify(&reference).await.unwrap();
    assert_eq!(again.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_failed_charge() {
    let h = harness();
    let reference = h.checkout("buyer-1", vec![item("maths", "jss1", 5000)]).await;
    h.gateway.settle(&reference, ChargeStatus::Failed).await;

    let verification = h.engine.verify(&reference).await.unwrap();
    assert_eq!(verification.status, PaymentStatus::Failed);
    assert!(verification.enrollments.is_empty());
    assert!(!h.engine.has_access("buyer-1", "maths", "jss1", None).await.unwrap());

    // Paying after the fact does not resurrect a failed attempt.
    h.gateway.pay_in_full(&reference).await.unwrap();
    let again = h.engine.verify(&reference).await.unwrap();
    assert_eq!(again.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_pending_charge_stays_retriable() {
    let h = harness();
    let reference = h.checkout("buyer-1", vec![item("maths", "jss1", 5000)]).await;

    let verification = h.engine.verify(&reference).await.unwrap();
    assert_eq!(verification.status, PaymentStatus::Pending);
    assert!(verification.enrollments.is_empty());

    h.gateway.pay_in_full(&reference).await.unwrap();
    let verification = h.engine.verify(&reference).await.unwrap();
    assert_eq!(verification.status, PaymentStatus::Success);
}

#[tokio::test]
async fn test_gateway_timeout_returns_pending() {
    let h = harness_with(
        SettlementConfig::default().with_gateway_timeout(Duration::from_millis(20)),
    );
    let reference = h.checkout("buyer-1", vec![item("maths", "jss1", 5000)]).await;
    h.gateway.pay_in_full(&reference).await.unwrap();
    h.gateway.set_latency(Duration::from_millis(500)).await;

    let verification = h.engine.verify(&reference).await.unwrap();
    assert_eq!(verification.status, PaymentStatus::Pending);
    assert_eq!(
        h.engine.get_attempt(&reference).await.unwrap().status,
        PaymentStatus::Pending
    );

    h.gateway.set_latency(Duration::ZERO).await;
    let verification = h.engine.verify(&reference).await.unwrap();
    assert_eq!(verification.status, PaymentStatus::Success);
}

#[tokio::test]
async fn test_gateway_unavailable() {
    let h = harness();
    let reference = h.checkout("buyer-1", vec![item("maths", "jss1", 5000)]).await;
    h.gateway.set_offline(true).await;

    assert!(matches!(
        h.engine.verify(&reference).await,
        Err(SettlementError::GatewayUnavailable(_))
    ));
    assert_eq!(
        h.engine.get_attempt(&reference).await.unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_unknown_reference() {
    let h = harness();
    assert!(matches!(
        h.engine.verify("SUB-missing").await,
        Err(SettlementError::UnknownReference(reference)) if reference == "SUB-missing"
    ));
}

#[tokio::test]
async fn test_failed_side_effect_rolls_back_settlement() {
    let h = harness();
    // The attempt names a referrer that has no account, so accrual fails
    // after the status flip and the grant have been staged.
    let attempt = PaymentAttempt::open(
        "SUB-ghost".to_string(),
        "buyer-1".to_string(),
        Some("ghost".to_string()),
        vec![item("maths", "jss1", 5000)],
        CALLBACK_URL.to_string(),
        Utc::now(),
    )
    .unwrap();
    h.seed_attempt(attempt).await;
    h.gateway
        .settle(
            "SUB-ghost",
            ChargeStatus::Paid {
                amount_paid: Money::new(5000),
            },
        )
        .await;

    assert!(matches!(
        h.engine.verify("SUB-ghost").await,
        Err(SettlementError::UnknownReferrer(_))
    ));
    let attempt = h.engine.get_attempt("SUB-ghost").await.unwrap();
    assert_eq!(attempt.status, PaymentStatus::Pending);
    assert_eq!(attempt.verified_at, None);
    assert!(h.engine.list_enrollments("buyer-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_initialization_records_attempt() {
    let h = harness_with(SettlementConfig::default().with_reference_prefix("LMS"));
    h.referrer("R", dec!(0.05)).await;
    h.referred_buyer("buyer-1", "R").await;

    let init = h
        .engine
        .initialize_payment(
            "buyer-1",
            vec![item("maths", "jss1", 3000), item("physics", "ss2", 4500)],
            CALLBACK_URL,
        )
        .await
        .unwrap();
    assert!(init.reference.starts_with("LMS-"));
    assert!(init.authorization_url.ends_with(&init.reference));

    let attempt = h.engine.get_attempt(&init.reference).await.unwrap();
    assert_eq!(attempt.amount, Money::new(7500));
    assert_eq!(attempt.status, PaymentStatus::Pending);
    assert_eq!(attempt.referrer_id.as_deref(), Some("R"));
    assert_eq!(attempt.items.len(), 2);
    assert_eq!(h.gateway.charge_amount(&init.reference).await, Some(Money::new(7500)));
}

#[tokio::test]
async fn test_initialization_rejects_bad_input() {
    let h = harness();

    assert!(matches!(
        h.engine.initialize_payment("buyer-1", vec![], CALLBACK_URL).await,
        Err(SettlementError::ValidationError(_))
    ));
    assert!(matches!(
        h.engine
            .initialize_payment("buyer-1", vec![item("maths", "jss1", 0)], CALLBACK_URL)
            .await,
        Err(SettlementError::ValidationError(_))
    ));
    assert!(matches!(
        h.engine
            .initialize_payment(" ", vec![item("maths", "jss1", 100)], CALLBACK_URL)
            .await,
        Err(SettlementError::ValidationError(_))
    ));

    h.engine
        .initialize_payment_with_reference(
            "SUB-1",
            "buyer-1",
            vec![item("maths", "jss1", 100)],
            CALLBACK_URL,
        )
        .await
        .unwrap();
    assert!(matches!(
        h.engine
            .initialize_payment_with_reference(
                "SUB-1",
                "buyer-2",
                vec![item("maths", "jss1", 100)],
                CALLBACK_URL,
            )
            .await,
        Err(SettlementError::DuplicateReference(_))
    ));
}

#[tokio::test]
async fn test_initialization_with_gateway_down_keeps_attempt() {
    let h = harness();
    h.gateway.set_offline(true).await;

    let result = h
        .engine
        .initialize_payment_with_reference(
            "SUB-1",
            "buyer-1",
            vec![item("maths", "jss1", 100)],
            CALLBACK_URL,
        )
        .await;
    assert!(matches!(result, Err(SettlementError::GatewayUnavailable(_))));

    // The attempt is recorded pending; the unseen charge verifies as pending.
    h.gateway.set_offline(false).await;
    let verification = h.engine.verify("SUB-1").await.unwrap();
    assert_eq!(verification.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_referrer_is_frozen_at_initialization() {
    let h = harness();
    h.referrer("R", dec!(0.10)).await;

    // Buyer attributed only after checkout: this payment earns nothing.
    let reference = h.checkout("buyer-1", vec![item("maths", "jss1", 5000)]).await;
    h.referred_buyer("buyer-1", "R").await;
    h.gateway.pay_in_full(&reference).await.unwrap();
    h.engine.verify(&reference).await.unwrap();

    assert!(h.engine.list_transactions("R").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stale_attempts() {
    let h = harness();
    let settled = h.purchase("buyer-1", vec![item("maths", "jss1", 100)]).await;

    let old = PaymentAttempt::open(
        "SUB-old".to_string(),
        "buyer-2".to_string(),
        None,
        vec![item("maths", "jss1", 100)],
        CALLBACK_URL.to_string(),
        Utc::now() - chrono::Duration::hours(3),
    )
    .unwrap();
    h.seed_attempt(old).await;
    let fresh = h.checkout("buyer-3", vec![item("maths", "jss1", 100)]).await;

    let stale = h
        .engine
        .stale_attempts(chrono::Duration::hours(1))
        .await
        .unwrap();
    let references: Vec<_> = stale.iter().map(|a| a.reference.as_str()).collect();
    assert_eq!(references, vec!["SUB-old"]);
    assert_ne!(references[0], settled);
    assert_ne!(references[0], fresh);
}
