#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use storefront_settlement::application::engine::SettlementEngine;
use storefront_settlement::config::SettlementConfig;
use storefront_settlement::domain::money::{CommissionRate, Money};
use storefront_settlement::domain::payment::{CartItem, ChargeStatus, PaymentAttempt};
use storefront_settlement::domain::ports::{LedgerStore, PaymentGateway};
use storefront_settlement::error::Result;
use storefront_settlement::infrastructure::gateway::SimulatedGateway;
use storefront_settlement::infrastructure::in_memory::InMemoryLedgerStore;
use tokio::sync::Barrier;

pub const CALLBACK_URL: &str = "https://shop.test/payment/callback";

/// An engine over in-memory storage, plus handles to the same store and
/// gateway for seeding and scripting.
pub struct Harness {
    pub engine: SettlementEngine,
    pub store: InMemoryLedgerStore,
    pub gateway: SimulatedGateway,
}

pub fn harness() -> Harness {
    harness_with(SettlementConfig::default())
}

pub fn harness_with(config: SettlementConfig) -> Harness {
    let store = InMemoryLedgerStore::new();
    let gateway = SimulatedGateway::new();
    let engine = SettlementEngine::new(
        Box::new(store.clone()),
        Box::new(gateway.clone()),
        config,
    );
    Harness {
        engine,
        store,
        gateway,
    }
}

pub fn rate(value: Decimal) -> CommissionRate {
    CommissionRate::new(value).unwrap()
}

pub fn item(subject: &str, grade: &str, price: u64) -> CartItem {
    CartItem::new(subject, grade, None, Money::new(price))
}

impl Harness {
    pub async fn referrer(&self, referrer_id: &str, commission_rate: Decimal) {
        self.engine
            .register_referrer(referrer_id, rate(commission_rate), None)
            .await
            .unwrap();
    }

    pub async fn referred_buyer(&self, buyer_id: &str, referrer_id: &str) {
        self.engine
            .attribute_referral(buyer_id, referrer_id)
            .await
            .unwrap();
    }

    /// Opens a charge for the cart and returns its reference.
    pub async fn checkout(&self, buyer_id: &str, items: Vec<CartItem>) -> String {
        self.engine
            .initialize_payment(buyer_id, items, CALLBACK_URL)
            .await
            .unwrap()
            .reference
    }

    /// Checks out, pays in full at the gateway, and verifies.
    pub async fn purchase(&self, buyer_id: &str, items: Vec<CartItem>) -> String {
        let reference = self.checkout(buyer_id, items).await;
        self.gateway.pay_in_full(&reference).await.unwrap();
        self.engine.verify(&reference).await.unwrap();
        reference
    }

    /// Writes an attempt straight into the store, bypassing initialization.
    pub async fn seed_attempt(&self, attempt: PaymentAttempt) {
        let mut tx = self.store.begin().await.unwrap();
        tx.put_attempt(attempt).unwrap();
        tx.commit().unwrap();
    }

    /// Overwrites the cached earnings of a referrer without touching entries.
    pub async fn seed_pending_earnings(&self, referrer_id: &str, amount: u64) {
        let mut tx = self.store.begin().await.unwrap();
        let mut account = tx.referrer(referrer_id).unwrap().unwrap();
        account.pending_earnings = Money::new(amount);
        tx.put_referrer(account).unwrap();
        tx.commit().unwrap();
    }
}

/// A gateway that holds every status query at a barrier, so concurrent
/// verifications all observe `pending` before any of them settles.
pub struct BarrierGateway {
    barrier: Arc<Barrier>,
    status: ChargeStatus,
}

impl BarrierGateway {
    pub fn new(parties: usize, status: ChargeStatus) -> Self {
        Self {
            barrier: Arc::new(Barrier::new(parties)),
            status,
        }
    }
}

#[async_trait]
impl PaymentGateway for BarrierGateway {
    async fn init_charge(
        &self,
        _amount: Money,
        reference: &str,
        _callback_url: &str,
    ) -> Result<String> {
        Ok(format!("https://checkout.barrier.test/{reference}"))
    }

    async fn charge_status(&self, _reference: &str) -> Result<ChargeStatus> {
        self.barrier.wait().await;
        Ok(self.status)
    }
}
