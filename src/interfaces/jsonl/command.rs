use crate::application::engine::SettlementEngine;
use crate::domain::money::{CommissionRate, Money};
use crate::domain::payment::{CartItem, ChargeStatus};
use crate::domain::referral::{BankDetails, SettingsUpdate};
use crate::error::Result;
use crate::infrastructure::gateway::SimulatedGateway;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GatewayOutcome {
    Paid,
    Failed,
    Pending,
}

/// One line of a settlement command file.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RegisterReferrer {
        referrer: String,
        commission_rate: CommissionRate,
        #[serde(default)]
        bank_details: Option<BankDetails>,
    },
    Attribute {
        buyer: String,
        referrer: String,
    },
    Initialize {
        buyer: String,
        #[serde(default)]
        reference: Option<String>,
        items: Vec<CartItem>,
        callback_url: String,
    },
    /// Scripts what the simulated provider reports for a charge. A `paid`
    /// outcome without `amount_paid` pays the amount the charge was opened with.
    Gateway {
        reference: String,
        outcome: GatewayOutcome,
        #[serde(default)]
        amount_paid: Option<Money>,
    },
    Verify {
        reference: String,
    },
    UpdateSettings {
        referrer: String,
        #[serde(default)]
        commission_rate: Option<CommissionRate>,
        #[serde(default)]
        bank_details: Option<BankDetails>,
    },
    Payout {
        referrer: String,
    },
    Access {
        buyer: String,
        subject: String,
        grade: String,
        #[serde(default)]
        term: Option<String>,
    },
}

impl Command {
    /// Runs the command and logs its outcome.
    pub async fn execute(self, engine: &SettlementEngine, gateway: &SimulatedGateway) -> Result<()> {
        match self {
            Command::RegisterReferrer {
                referrer,
                commission_rate,
                bank_details,
            } => {
                engine
                    .register_referrer(&referrer, commission_rate, bank_details)
                    .await?;
            }
            Command::Attribute { buyer, referrer } => {
                engine.attribute_referral(&buyer, &referrer).await?;
            }
            Command::Initialize {
                buyer,
                reference,
                items,
                callback_url,
            } => {
                let init = match reference {
                    Some(reference) => {
                        engine
                            .initialize_payment_with_reference(
                                &reference,
                                &buyer,
                                items,
                                &callback_url,
                            )
                            .await?
                    }
                    None => engine.initialize_payment(&buyer, items, &callback_url).await?,
                };
                info!(reference = %init.reference, url = %init.authorization_url, "charge opened");
            }
            Command::Gateway {
                reference,
                outcome,
                amount_paid,
            } => match (outcome, amount_paid) {
                (GatewayOutcome::Paid, Some(amount_paid)) => {
                    gateway
                        .settle(&reference, ChargeStatus::Paid { amount_paid })
                        .await
                }
                (GatewayOutcome::Paid, None) => gateway.pay_in_full(&reference).await?,
                (GatewayOutcome::Failed, _) => {
                    gateway.settle(&reference, ChargeStatus::Failed).await
                }
                (GatewayOutcome::Pending, _) => {
                    gateway.settle(&reference, ChargeStatus::Pending).await
                }
            },
            Command::Verify { reference } => {
                let verification = engine.verify(&reference).await?;
                info!(
                    %reference,
                    status = ?verification.status,
                    enrollments = verification.enrollments.len(),
                    "verified"
                );
            }
            Command::UpdateSettings {
                referrer,
                commission_rate,
                bank_details,
            } => {
                let update = SettingsUpdate {
                    bank_details,
                    commission_rate,
                };
                engine.update_settings(&referrer, update).await?;
            }
            Command::Payout { referrer } => {
                let batch = engine.request_payout(&referrer).await?;
                info!(%referrer, batch_id = %batch.id, amount = %batch.amount, "payout requested");
            }
            Command::Access {
                buyer,
                subject,
                grade,
                term,
            } => {
                let allowed = engine
                    .has_access(&buyer, &subject, &grade, term.as_deref())
                    .await?;
                info!(%buyer, %subject, %grade, ?term, allowed, "access checked");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_initialize() {
        let line = r#"{"op":"initialize","buyer":"b1","reference":"SUB-1","callback_url":"https://shop.test/cb","items":[{"subject":"maths","grade":"jss1","price":5000}]}"#;
        let command: Command = serde_json::from_str(line).unwrap();
        assert_eq!(
            command,
            Command::Initialize {
                buyer: "b1".to_string(),
                reference: Some("SUB-1".to_string()),
                items: vec![CartItem::new("maths", "jss1", None, Money::new(5000))],
                callback_url: "https://shop.test/cb".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_register_referrer() {
        let line = r#"{"op":"register_referrer","referrer":"R1","commission_rate":"0.10"}"#;
        let command: Command = serde_json::from_str(line).unwrap();
        assert_eq!(
            command,
            Command::RegisterReferrer {
                referrer: "R1".to_string(),
                commission_rate: CommissionRate::new(dec!(0.10)).unwrap(),
                bank_details: None,
            }
        );
    }

    #[test]
    fn test_parse_rejects_invalid_rate() {
        let line = r#"{"op":"register_referrer","referrer":"R1","commission_rate":"1.5"}"#;
        assert!(serde_json::from_str::<Command>(line).is_err());
    }

    #[test]
    fn test_parse_gateway_outcome() {
        let line = r#"{"op":"gateway","reference":"SUB-1","outcome":"paid","amount_paid":4000}"#;
        let command: Command = serde_json::from_str(line).unwrap();
        assert_eq!(
            command,
            Command::Gateway {
                reference: "SUB-1".to_string(),
                outcome: GatewayOutcome::Paid,
                amount_paid: Some(Money::new(4000)),
            }
        );
    }
}
