use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::{TransactionCategory, Wallet};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOrderStatus {
    Created,
    Paid,
    Failed,
}

/// Gateway order backing a wallet top-up.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentOrder {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_id: String,
    pub user_id: ObjectId,
    /// Paise.
    pub amount: i64,
    pub currency: String,
    pub status: PaymentOrderStatus,
    pub payment_id: Option<String>,
    pub created_at: DateTime,
    pub paid_at: Option<DateTime>,
}

impl PaymentOrder {
    /// A paid order whose top-up has not reached the wallet ledger yet.
    pub fn awaiting_credit(&self, wallet: &Wallet) -> bool {
        self.status == PaymentOrderStatus::Paid && !wallet.has_entry(TransactionCategory::TopUp, &self.order_id)
    }
}

/// Client-side status polling after the checkout redirect.
pub const POLL_INTERVAL_SECS: u64 = 5;
pub const POLL_MAX_ATTEMPTS: u32 = 12;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TransactionType, WalletTransaction};

    fn order(status: PaymentOrderStatus) -> PaymentOrder {
        PaymentOrder {
            id: None,
            order_id: "order_Nx1".into(),
            user_id: ObjectId::new(),
            amount: 50_000,
            currency: "INR".into(),
            status,
            payment_id: None,
            created_at: DateTime::now(),
            paid_at: None,
        }
    }

    #[test]
    fn paid_order_is_credited_once() {
        let paid = order(PaymentOrderStatus::Paid);
        let mut wallet = Wallet::new(paid.user_id);
        assert!(paid.awaiting_credit(&wallet));

        wallet.transactions.push(WalletTransaction::new(
            TransactionType::Credit,
            TransactionCategory::TopUp,
            paid.amount,
            "Wallet top-up",
            Some(paid.order_id.clone()),
        ));
        assert!(!paid.awaiting_credit(&wallet));
    }

    #[test]
    fn unpaid_orders_are_never_credited() {
        let wallet = Wallet::new(ObjectId::new());
        assert!(!order(PaymentOrderStatus::Created).awaiting_credit(&wallet));
        assert!(!order(PaymentOrderStatus::Failed).awaiting_credit(&wallet));
    }
}
