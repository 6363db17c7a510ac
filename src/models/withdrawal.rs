use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

/// Destination account the payout is wired to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutAccount {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub amount: i64,
    pub account: PayoutAccount,
    pub status: WithdrawalStatus,
    pub rejection_reason: Option<String>,
    /// Settled orders this request roughly draws against. Informational
    /// only, no hard allocation is enforced.
    pub settled_orders: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
