//! Referrer accounts, buyer attribution and the referrer dashboard reads.

use super::engine::{SettlementEngine, require};
use crate::domain::money::CommissionRate;
use crate::domain::referral::{
    BankDetails, BuyerProfile, CommissionEntry, ReferrerAccount, SettingsUpdate,
};
use crate::error::{Result, SettlementError};
use chrono::Utc;
use tracing::info;

fn validate_bank_details(details: &BankDetails) -> Result<()> {
    require(&details.bank_name, "Bank name")?;
    require(&details.account_number, "Account number")?;
    require(&details.account_name, "Account name")?;
    if !details.account_number.chars().all(|c| c.is_ascii_digit()) {
        return Err(SettlementError::ValidationError(format!(
            "Account number must be numeric, got {}",
            details.account_number
        )));
    }
    Ok(())
}

impl SettlementEngine {
    pub async fn register_referrer(
        &self,
        referrer_id: &str,
        commission_rate: CommissionRate,
        bank_details: Option<BankDetails>,
    ) -> Result<ReferrerAccount> {
        require(referrer_id, "Referrer id")?;
        if let Some(details) = &bank_details {
            validate_bank_details(details)?;
        }

        let mut tx = self.begin().await?;
        if tx.referrer(referrer_id)?.is_some() {
            return Err(SettlementError::ValidationError(format!(
                "Referrer {referrer_id} is already registered"
            )));
        }
        let account = ReferrerAccount::new(
            referrer_id.to_string(),
            commission_rate,
            bank_details,
            Utc::now(),
        );
        tx.put_referrer(account.clone())?;
        tx.commit()?;
        info!(%referrer_id, rate = %commission_rate, "referrer registered");
        Ok(account)
    }

    /// Records who referred the buyer. The first attribution is permanent.
    pub async fn attribute_referral(
        &self,
        buyer_id: &str,
        referrer_id: &str,
    ) -> Result<BuyerProfile> {
        require(buyer_id, "Buyer id")?;
        require(referrer_id, "Referrer id")?;
        if buyer_id == referrer_id {
            return Err(SettlementError::ValidationError(
                "A buyer can not refer themselves".to_string(),
            ));
        }

        let mut tx = self.begin().await?;
        if tx.referrer(referrer_id)?.is_none() {
            return Err(SettlementError::UnknownReferrer(referrer_id.to_string()));
        }

        if let Some(existing) = tx.buyer(buyer_id)?
            && let Some(current) = &existing.referrer_id
        {
            if current == referrer_id {
                return Ok(existing);
            }
            return Err(SettlementError::ValidationError(format!(
                "Buyer {buyer_id} was already referred by {current}"
            )));
        }

        let profile = BuyerProfile {
            buyer_id: buyer_id.to_string(),
            referrer_id: Some(referrer_id.to_string()),
            attributed_at: Some(Utc::now()),
        };
        tx.put_buyer(profile.clone())?;
        tx.commit()?;
        info!(%buyer_id, %referrer_id, "referral attributed");
        Ok(profile)
    }

    pub async fn get_settings(&self, referrer_id: &str) -> Result<ReferrerAccount> {
        let tx = self.begin().await?;
        tx.referrer(referrer_id)?
            .ok_or_else(|| SettlementError::UnknownReferrer(referrer_id.to_string()))
    }

    /// Changes bank details and/or the commission rate.
    ///
    /// A new rate applies to commission accrued from now on; existing entries
    /// keep the rate they were accrued at.
    pub async fn update_settings(
        &self,
        referrer_id: &str,
        update: SettingsUpdate,
    ) -> Result<ReferrerAccount> {
        if let Some(details) = &update.bank_details {
            validate_bank_details(details)?;
        }

        let mut tx = self.begin().await?;
        let mut account = tx
            .referrer(referrer_id)?
            .ok_or_else(|| SettlementError::UnknownReferrer(referrer_id.to_string()))?;
        if let Some(details) = update.bank_details {
            account.bank_details = Some(details);
        }
        if let Some(rate) = update.commission_rate {
            account.commission_rate = rate;
        }
        account.updated_at = Utc::now();
        tx.put_referrer(account.clone())?;
        tx.commit()?;
        info!(%referrer_id, rate = %account.commission_rate, "referrer settings updated");
        Ok(account)
    }

    /// Commission entries of the referrer, newest first.
    pub async fn list_transactions(&self, referrer_id: &str) -> Result<Vec<CommissionEntry>> {
        let tx = self.begin().await?;
        if tx.referrer(referrer_id)?.is_none() {
            return Err(SettlementError::UnknownReferrer(referrer_id.to_string()));
        }
        let mut entries = tx.entries_for(referrer_id)?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Every referrer account, ordered by id.
    pub async fn referrers(&self) -> Result<Vec<ReferrerAccount>> {
        let tx = self.begin().await?;
        let mut accounts = tx.referrers()?;
        accounts.sort_by(|a, b| a.referrer_id.cmp(&b.referrer_id));
        Ok(accounts)
    }
}
