use crate::domain::referral::ReferrerAccount;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct ReferrerRow<'a> {
    referrer: &'a str,
    commission_rate: Decimal,
    pending_earnings: u64,
    paid_out_earnings: u64,
}

/// Writes the referrer earnings report as CSV.
pub struct ReferrerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReferrerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_referrers(&mut self, accounts: &[ReferrerAccount]) -> Result<()> {
        if accounts.is_empty() {
            self.writer.write_record([
                "referrer",
                "commission_rate",
                "pending_earnings",
                "paid_out_earnings",
            ])?;
        }
        for account in accounts {
            self.writer.serialize(ReferrerRow {
                referrer: &account.referrer_id,
                commission_rate: account.commission_rate.value(),
                pending_earnings: account.pending_earnings.minor_units(),
                paid_out_earnings: account.paid_out_earnings.minor_units(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
