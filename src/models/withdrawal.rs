use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::{iso, BankDetails};
use crate::services::billing::to_rupees;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processed => "processed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    /// Whether an admin decision can act on a request in this status. A repeated
    /// rejection is let through so its refund can be settled again.
    pub fn accepts_decision(&self, approve: bool) -> bool {
        match self {
            WithdrawalStatus::Pending => true,
            WithdrawalStatus::Rejected => !approve,
            WithdrawalStatus::Processed => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WithdrawalRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    /// Paise, like the two fields below.
    pub amount: i64,
    pub processing_fee: i64,
    pub net_amount: i64,
    pub status: WithdrawalStatus,
    pub bank_details: BankDetails,
    pub admin_note: Option<String>,
    /// Bank transfer reference recorded when processed.
    pub transfer_reference: Option<String>,
    pub processed_at: Option<DateTime>,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProcessWithdrawalDto {
    pub approve: bool,
    pub transfer_reference: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct WithdrawalResponse {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub processing_fee: f64,
    pub net_amount: f64,
    pub status: WithdrawalStatus,
    pub bank_details: BankDetails,
    pub admin_note: Option<String>,
    pub transfer_reference: Option<String>,
    pub created_at: String,
}

impl From<WithdrawalRequest> for WithdrawalResponse {
    fn from(w: WithdrawalRequest) -> Self {
        WithdrawalResponse {
            id: w.id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: w.user_id.to_hex(),
            amount: to_rupees(w.amount),
            processing_fee: to_rupees(w.processing_fee),
            net_amount: to_rupees(w.net_amount),
            status: w.status,
            bank_details: w.bank_details.masked(),
            admin_note: w.admin_note,
            transfer_reference: w.transfer_reference,
            created_at: iso(&w.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_on_pending_and_repeated_rejections() {
        assert!(WithdrawalStatus::Pending.accepts_decision(true));
        assert!(WithdrawalStatus::Pending.accepts_decision(false));
        assert!(WithdrawalStatus::Rejected.accepts_decision(false));
        assert!(!WithdrawalStatus::Rejected.accepts_decision(true));
        assert!(!WithdrawalStatus::Processed.accepts_decision(true));
        assert!(!WithdrawalStatus::Processed.accepts_decision(false));
    }

    #[test]
    fn response_amounts_are_rupees() {
        let request = WithdrawalRequest {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            amount: 30_030,
            processing_fee: 601,
            net_amount: 29_429,
            status: WithdrawalStatus::Pending,
            bank_details: BankDetails {
                account_holder: "Meera".into(),
                account_number: "123456789012".into(),
                ifsc: "SBIN0000001".into(),
                bank_name: "SBI".into(),
                upi_id: None,
            },
            admin_note: None,
            transfer_reference: None,
            processed_at: None,
            created_at: DateTime::now(),
        };
        let response = WithdrawalResponse::from(request);
        assert_eq!(response.amount, 300.3);
        assert_eq!(response.net_amount, 294.29);
        assert_eq!(response.bank_details.account_number, "XXXXXXXX9012");
    }
}
