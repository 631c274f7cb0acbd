use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::iso;
use crate::services::billing::to_rupees;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCategory {
    TopUp,
    BookingPayment,
    BookingRefund,
    SessionEarning,
    MasterClassPayment,
    MasterClassRefund,
    MasterClassEarning,
    Withdrawal,
    WithdrawalRefund,
    Adjustment,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct WalletTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: TransactionCategory,
    /// Paise.
    pub amount: i64,
    pub description: String,
    /// Booking, order, class or withdrawal this entry belongs to.
    pub reference: Option<String>,
    #[schemars(skip)]
    pub created_at: DateTime,
}

impl WalletTransaction {
    pub fn new(
        kind: TransactionType,
        category: TransactionCategory,
        amount: i64,
        description: impl Into<String>,
        reference: Option<String>,
    ) -> Self {
        WalletTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            category,
            amount,
            description: description.into(),
            reference,
            created_at: DateTime::now(),
        }
    }

    /// Signed effect on the balance.
    pub fn delta(&self) -> i64 {
        match self.kind {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, Validate)]
pub struct BankDetails {
    #[validate(length(min = 2, max = 100, message = "Account holder name is required"))]
    pub account_holder: String,
    #[validate(length(min = 9, max = 18, message = "Account number must be 9-18 digits"))]
    pub account_number: String,
    pub ifsc: String,
    #[validate(length(min = 2, max = 100, message = "Bank name is required"))]
    pub bank_name: String,
    pub upi_id: Option<String>,
}

impl BankDetails {
    /// Account number with all but the last four digits hidden.
    pub fn masked(&self) -> BankDetails {
        let hidden = self.account_number.chars().count().saturating_sub(4);
        let visible: String = self.account_number.chars().skip(hidden).collect();
        BankDetails {
            account_number: format!("{}{}", "X".repeat(hidden), visible),
            ..self.clone()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Wallet {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    /// Paise.
    pub balance: i64,
    #[serde(default)]
    pub transactions: Vec<WalletTransaction>,
    pub bank_details: Option<BankDetails>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Wallet {
    pub fn new(user_id: ObjectId) -> Self {
        let now = DateTime::now();
        Wallet {
            id: None,
            user_id,
            balance: 0,
            transactions: Vec::new(),
            bank_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the ledger already records `category` for `reference`.
    pub fn has_entry(&self, category: TransactionCategory, reference: &str) -> bool {
        self.transactions
            .iter()
            .any(|t| t.category == category && t.reference.as_deref() == Some(reference))
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct TransactionResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: TransactionCategory,
    pub amount: f64,
    pub description: String,
    pub reference: Option<String>,
    pub created_at: String,
}

impl From<WalletTransaction> for TransactionResponse {
    fn from(t: WalletTransaction) -> Self {
        TransactionResponse {
            id: t.id,
            kind: t.kind,
            category: t.category,
            amount: to_rupees(t.amount),
            description: t.description,
            reference: t.reference,
            created_at: iso(&t.created_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct WalletResponse {
    pub user_id: String,
    pub balance: f64,
    pub transactions: Vec<TransactionResponse>,
    pub bank_details: Option<BankDetails>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        let mut transactions = wallet.transactions;
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        WalletResponse {
            user_id: wallet.user_id.to_hex(),
            balance: to_rupees(wallet.balance),
            transactions: transactions.into_iter().map(TransactionResponse::from).collect(),
            bank_details: wallet.bank_details.as_ref().map(BankDetails::masked),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TopUpOrderDto {
    pub amount: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct VerifyTopUpDto {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WithdrawalDto {
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_signs() {
        let credit = WalletTransaction::new(TransactionType::Credit, TransactionCategory::TopUp, 50_000, "Top-up", None);
        let debit = WalletTransaction::new(TransactionType::Debit, TransactionCategory::Withdrawal, 12_000, "Withdrawal", None);
        assert_eq!(credit.delta(), 50_000);
        assert_eq!(debit.delta(), -12_000);
    }

    #[test]
    fn transaction_serializes_type_and_snake_case_category() {
        let t = WalletTransaction::new(TransactionType::Debit, TransactionCategory::BookingPayment, 30_050, "Session", None);
        let json = serde_json::to_value(TransactionResponse::from(t)).unwrap();
        assert_eq!(json["type"], "debit");
        assert_eq!(json["category"], "booking_payment");
        assert_eq!(json["amount"], 300.5);
    }

    #[test]
    fn ledger_entries_are_matched_by_category_and_reference() {
        let mut wallet = Wallet::new(ObjectId::new());
        wallet.transactions.push(WalletTransaction::new(
            TransactionType::Credit,
            TransactionCategory::TopUp,
            50_000,
            "Wallet top-up",
            Some("order_1".into()),
        ));
        assert!(wallet.has_entry(TransactionCategory::TopUp, "order_1"));
        assert!(!wallet.has_entry(TransactionCategory::TopUp, "order_2"));
        assert!(!wallet.has_entry(TransactionCategory::BookingRefund, "order_1"));
    }

    #[test]
    fn bank_account_is_masked() {
        let details = BankDetails {
            account_holder: "Meera".into(),
            account_number: "123456789012".into(),
            ifsc: "SBIN0000001".into(),
            bank_name: "SBI".into(),
            upi_id: None,
        };
        assert_eq!(details.masked().account_number, "XXXXXXXX9012");
    }
}
