//! Fee & Wallet Ledger (C12): optional pre/post-evaluation balance
//! tracking. Fee tiers are derived from the *final* risk score, computed
//! after layer 5 completes, and deducted atomically via a single
//! read-modify-write against the store.

use gov_domain::error::Result;
use gov_domain::trace::TraceEvent;
use gov_domain::traits::{Clock, Store};
use gov_domain::wallet::{Decimal3, Wallet};

pub struct WalletLedger {
    initial_balance: Decimal3,
}

/// Outcome of one fee deduction attempt.
#[derive(Debug, Clone, Copy)]
pub struct DeductionOutcome {
    pub charged: bool,
    pub fee: Decimal3,
    pub payment_required: bool,
}

impl WalletLedger {
    pub fn new(initial_balance: Decimal3) -> Self {
        Self { initial_balance }
    }

    /// Risk-band fee tiers from the spec's fixed table, in fixed-point
    /// thousandths.
    pub fn tier_fee(risk: u8) -> Decimal3 {
        match risk {
            0..=39 => Decimal3::from_millis(1),
            40..=69 => Decimal3::from_millis(5),
            70..=89 => Decimal3::from_millis(10),
            _ => Decimal3::from_millis(25),
        }
    }

    /// Human-readable name for the same risk band `tier_fee` prices,
    /// recorded alongside the fee amount on the `Receipt`.
    pub fn tier_label(risk: u8) -> &'static str {
        match risk {
            0..=39 => "low",
            40..=69 => "medium",
            70..=89 => "high",
            _ => "critical",
        }
    }

    pub async fn get_or_provision(&self, store: &dyn Store, clock: &dyn Clock, owner_id: &str) -> Result<Wallet> {
        if let Some(wallet) = store.get_wallet(owner_id).await? {
            return Ok(wallet);
        }
        let wallet = Wallet { owner_id: owner_id.to_string(), balance: self.initial_balance, created_at: clock.now() };
        store.put_wallet(wallet.clone()).await?;
        Ok(wallet)
    }

    /// Single read-modify-write deduction keyed on the final risk score.
    /// Insufficient funds never fails the call — it reports
    /// `payment_required` and leaves the balance untouched.
    pub async fn deduct(&self, store: &dyn Store, clock: &dyn Clock, owner_id: &str, final_risk: u8) -> Result<DeductionOutcome> {
        let wallet = self.get_or_provision(store, clock, owner_id).await?;
        let fee = Self::tier_fee(final_risk);
        match wallet.balance.checked_sub(fee) {
            Some(new_balance) => {
                store.put_wallet(Wallet { balance: new_balance, ..wallet }).await?;
                TraceEvent::WalletDeducted { owner_id: owner_id.to_string(), amount: fee.to_string(), tier: Self::tier_label(final_risk).to_string() }.emit();
                Ok(DeductionOutcome { charged: true, fee, payment_required: false })
            }
            None => Ok(DeductionOutcome { charged: false, fee, payment_required: true }),
        }
    }

    pub async fn top_up(&self, store: &dyn Store, clock: &dyn Clock, owner_id: &str, amount: Decimal3) -> Result<Wallet> {
        let wallet = self.get_or_provision(store, clock, owner_id).await?;
        let new_balance = wallet
            .balance
            .checked_add(amount)
            .ok_or_else(|| gov_domain::error::Error::InvalidInput("top-up would overflow balance".to_string()))?;
        let updated = Wallet { balance: new_balance, ..wallet };
        store.put_wallet(updated.clone()).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gov_memstore::{MemStore, TestClock};
    use std::str::FromStr;

    #[tokio::test]
    async fn auto_provisions_with_initial_balance() {
        let store = MemStore::new();
        let clock = TestClock::new(Utc::now());
        let ledger = WalletLedger::new(Decimal3::from_str("100.000").unwrap());
        let wallet = ledger.get_or_provision(&store, &clock, "agent-1").await.unwrap();
        assert_eq!(wallet.balance.to_string(), "100.000");
    }

    #[tokio::test]
    async fn deduction_charges_the_correct_tier() {
        let store = MemStore::new();
        let clock = TestClock::new(Utc::now());
        let ledger = WalletLedger::new(Decimal3::from_str("100.000").unwrap());

        let outcome = ledger.deduct(&store, &clock, "agent-1", 95).await.unwrap();
        assert!(outcome.charged);
        assert_eq!(outcome.fee.to_string(), "0.025");

        let wallet = store.get_wallet("agent-1").await.unwrap().unwrap();
        assert_eq!(wallet.balance.to_string(), "99.975");
    }

    #[tokio::test]
    async fn insufficient_funds_sets_payment_required_without_charging() {
        let store = MemStore::new();
        let clock = TestClock::new(Utc::now());
        let ledger = WalletLedger::new(Decimal3::from_str("0.010").unwrap());

        let outcome = ledger.deduct(&store, &clock, "agent-1", 95).await.unwrap();
        assert!(!outcome.charged);
        assert!(outcome.payment_required);

        let wallet = store.get_wallet("agent-1").await.unwrap().unwrap();
        assert_eq!(wallet.balance.to_string(), "0.010", "balance untouched on insufficient funds");
    }

    #[test]
    fn tier_label_matches_tier_fee_bands() {
        assert_eq!(WalletLedger::tier_label(10), "low");
        assert_eq!(WalletLedger::tier_label(50), "medium");
        assert_eq!(WalletLedger::tier_label(80), "high");
        assert_eq!(WalletLedger::tier_label(95), "critical");
    }

    #[tokio::test]
    async fn top_up_increases_balance() {
        let store = MemStore::new();
        let clock = TestClock::new(Utc::now());
        let ledger = WalletLedger::new(Decimal3::from_str("1.000").unwrap());

        let wallet = ledger.top_up(&store, &clock, "agent-1", Decimal3::from_str("9.500").unwrap()).await.unwrap();
        assert_eq!(wallet.balance.to_string(), "10.500");
    }
}
