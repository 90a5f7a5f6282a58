use crate::domain::money::Money;
use crate::domain::payment::ChargeStatus;
use crate::domain::ports::PaymentGateway;
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Base of the authorization URLs handed out by [`SimulatedGateway`].
pub const SIMULATED_CHECKOUT_URL: &str = "https://checkout.simulated.test/pay";

#[derive(Debug, Clone, Copy)]
struct SimulatedCharge {
    amount: Money,
    status: ChargeStatus,
}

#[derive(Default)]
struct GatewayState {
    charges: HashMap<String, SimulatedCharge>,
    offline: bool,
    latency: Duration,
}

/// An in-process stand-in for the hosted payment provider.
///
/// Charges start out pending; their outcome is scripted with [`settle`](Self::settle).
/// The gateway can be taken offline or slowed down to exercise the
/// unavailable and timeout paths. Clones share state.
#[derive(Default, Clone)]
pub struct SimulatedGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what the provider will report for `reference`.
    pub async fn settle(&self, reference: &str, status: ChargeStatus) {
        let mut state = self.state.write().await;
        let amount = match status {
            ChargeStatus::Paid { amount_paid } => amount_paid,
            _ => state
                .charges
                .get(reference)
                .map(|charge| charge.amount)
                .unwrap_or_default(),
        };
        state
            .charges
            .insert(reference.to_string(), SimulatedCharge { amount, status });
    }

    /// Settles a charge as paid in full for the amount it was opened with.
    pub async fn pay_in_full(&self, reference: &str) -> Result<()> {
        let amount = self.charge_amount(reference).await.ok_or_else(|| {
            SettlementError::UnknownReference(format!("no simulated charge for {reference}"))
        })?;
        self.settle(reference, ChargeStatus::Paid { amount_paid: amount })
            .await;
        Ok(())
    }

    pub async fn charge_amount(&self, reference: &str) -> Option<Money> {
        let state = self.state.read().await;
        state.charges.get(reference).map(|charge| charge.amount)
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    async fn simulate_network(&self) -> Result<()> {
        let (offline, latency) = {
            let state = self.state.read().await;
            (state.offline, state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(SettlementError::GatewayUnavailable(
                "simulated gateway is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn init_charge(
        &self,
        amount: Money,
        reference: &str,
        callback_url: &str,
    ) -> Result<String> {
        self.simulate_network().await?;
        debug!(%reference, %amount, %callback_url, "simulated charge opened");

        self.state.write().await.charges.insert(
            reference.to_string(),
            SimulatedCharge {
                amount,
                status: ChargeStatus::Pending,
            },
        );
        Ok(format!("{SIMULATED_CHECKOUT_URL}/{reference}"))
    }

    async fn charge_status(&self, reference: &str) -> Result<ChargeStatus> {
        self.simulate_network().await?;
        let state = self.state.read().await;
        // A charge the provider has not seen yet is reported as still pending.
        Ok(state
            .charges
            .get(reference)
            .map(|charge| charge.status)
            .unwrap_or(ChargeStatus::Pending))
    }
}
