//! Audit & Attestation (C9): append-only action log plus SHA-256 receipt
//! hashing. Receipts are advisory attestation, not source of truth — a
//! failed receipt write never rolls back the `Action` it attests to.

use sha2::{Digest, Sha256};

use gov_domain::action::Action;
use gov_domain::error::Result;
use gov_domain::receipt::Receipt;
use gov_domain::traits::Store;

pub struct AuditLog;

impl AuditLog {
    pub fn new() -> Self {
        Self
    }

    /// Computes `SHA-256(action_id || "|" || tool || "|" || decision || "|" || risk || "|" || timestamp_iso)`,
    /// hex-encoded.
    pub fn receipt_hash(action: &Action) -> String {
        let decision = format!("{:?}", action.decision).to_lowercase();
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            action.id,
            action.tool,
            decision,
            action.risk_score,
            action.timestamp.to_rfc3339()
        );
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(digest)
    }

    /// Persists `action`, then attempts to write its receipt. The action
    /// write is authoritative; if the receipt write fails, the action
    /// still stands and the error is swallowed here (logged by the
    /// caller via the returned `None`).
    pub async fn record(&self, store: &dyn Store, action: Action, fee_tier: &str, fee_amount: &str) -> Result<(Action, Option<Receipt>)> {
        store.append_action(action.clone()).await?;

        let id = store.next_receipt_id().await?;
        let receipt = Receipt {
            id,
            action_id: action.id.clone(),
            hash: Self::receipt_hash(&action),
            fee_tier: fee_tier.to_string(),
            fee_amount: fee_amount.to_string(),
            timestamp: action.timestamp,
        };

        match store.append_receipt(receipt.clone()).await {
            Ok(()) => Ok((action, Some(receipt))),
            Err(err) => {
                tracing::warn!(action_id = %action.id, error = %err, "receipt write failed, action already persisted");
                Ok((action, None))
            }
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
