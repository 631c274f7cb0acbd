use std::collections::{HashMap, HashSet};

use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use serde::Serialize;

use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{Booking, PaymentStatus, Wallet};
use crate::services::billing;
use crate::utils::{ApiError, ApiResponse};

#[derive(Debug, Serialize, PartialEq)]
pub struct BookingIssue {
    pub booking_id: String,
    pub problem: String,
}

/// Finds bookings pointing at missing users or carrying a payment status
/// that does not match their booking status.
pub fn audit_bookings(bookings: &[Booking], user_ids: &HashSet<ObjectId>) -> Vec<BookingIssue> {
    let mut issues = Vec::new();
    for booking in bookings {
        let booking_id = booking.id.map(|id| id.to_hex()).unwrap_or_default();
        if !user_ids.contains(&booking.aspirant_id) {
            issues.push(BookingIssue {
                booking_id: booking_id.clone(),
                problem: format!("aspirant {} no longer exists", booking.aspirant_id),
            });
        }
        if !user_ids.contains(&booking.achiever_id) {
            issues.push(BookingIssue {
                booking_id: booking_id.clone(),
                problem: format!("achiever {} no longer exists", booking.achiever_id),
            });
        }
        let expected = PaymentStatus::expected_for(booking.status);
        if booking.payment_status != expected {
            issues.push(BookingIssue {
                booking_id,
                problem: format!(
                    "{} booking has payment status {} (expected {})",
                    booking.status.as_str(),
                    booking.payment_status.as_str(),
                    expected.as_str()
                ),
            });
        }
    }
    issues
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WalletDrift {
    pub user_id: String,
    /// Rupees, for the report.
    pub stored_balance: f64,
    pub ledger_balance: f64,
    #[serde(skip)]
    pub stored_paise: i64,
    #[serde(skip)]
    pub ledger_paise: i64,
}

pub fn find_drift(wallets: &[Wallet]) -> Vec<WalletDrift> {
    wallets
        .iter()
        .filter_map(|w| {
            let ledger = billing::ledger_balance(&w.transactions);
            (w.balance != ledger).then(|| WalletDrift {
                user_id: w.user_id.to_hex(),
                stored_balance: billing::to_rupees(w.balance),
                ledger_balance: billing::to_rupees(ledger),
                stored_paise: w.balance,
                ledger_paise: ledger,
            })
        })
        .collect()
}

#[openapi(tag = "Admin - Maintenance")]
#[get("/admin/maintenance/bookings")]
pub async fn audit_booking_records(
    db: &State<DbConn>,
    _admin: AdminGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let bookings: Vec<Booking> = db
        .collection::<Booking>("bookings")
        .find(None, None)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    let ids: Vec<Document> = db
        .collection::<Document>("users")
        .find(None, mongodb::options::FindOptions::builder().projection(doc! { "_id": 1 }).build())
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;
    let user_ids: HashSet<ObjectId> = ids.iter().filter_map(|d| d.get_object_id("_id").ok()).collect();

    let mut by_status: HashMap<&'static str, u64> = HashMap::new();
    for booking in &bookings {
        *by_status.entry(booking.status.as_str()).or_insert(0) += 1;
    }

    let issues = audit_bookings(&bookings, &user_ids);
    if !issues.is_empty() {
        warn!("Booking audit found {} issue(s)", issues.len());
    }

    Ok(Json(ApiResponse::success(serde_json::json!({
        "total": bookings.len(),
        "by_status": by_status,
        "issues": issues,
    }))))
}

#[openapi(tag = "Admin - Maintenance")]
#[post("/admin/maintenance/wallets/reconcile?<apply>")]
pub async fn reconcile_wallets(
    db: &State<DbConn>,
    admin: AdminGuard,
    apply: Option<bool>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let apply = apply.unwrap_or(false);
    let wallets_coll = db.collection::<Wallet>("wallets");

    let wallets: Vec<Wallet> = wallets_coll
        .find(None, None)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    let drift = find_drift(&wallets);
    let mut fixed = 0u64;

    if apply {
        for d in &drift {
            let user_id = ObjectId::parse_str(&d.user_id)
                .map_err(|_| ApiError::internal_error("Corrupt wallet owner id"))?;
            // Only overwrite if nothing moved since the scan.
            let result = wallets_coll
                .update_one(
                    doc! { "user_id": user_id, "balance": d.stored_paise },
                    doc! { "$set": { "balance": d.ledger_paise, "updated_at": DateTime::now() } },
                    None,
                )
                .await?;
            fixed += result.modified_count;
        }
        info!("Admin {} reconciled {} wallet(s)", admin.auth.user_id, fixed);
    }

    Ok(Json(ApiResponse::success(serde_json::json!({
        "checked": wallets.len(),
        "mismatched": drift,
        "applied": apply,
        "fixed": fixed,
    }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, TransactionCategory, TransactionType, WalletTransaction};

    fn booking(status: BookingStatus, payment: PaymentStatus) -> Booking {
        Booking {
            id: Some(ObjectId::new()),
            aspirant_id: ObjectId::new(),
            achiever_id: ObjectId::new(),
            date: "2026-06-01".into(),
            start_time: "10:00".into(),
            end_time: "11:00".into(),
            duration_minutes: 60,
            topic: None,
            notes: None,
            status,
            amount: 50_000,
            payment_status: payment,
            slot_id: None,
            cancellation_reason: None,
            cancelled_by: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn healthy_booking_has_no_issues() {
        let b = booking(BookingStatus::Completed, PaymentStatus::Released);
        let users: HashSet<ObjectId> = [b.aspirant_id, b.achiever_id].into_iter().collect();
        assert!(audit_bookings(&[b], &users).is_empty());
    }

    #[test]
    fn orphaned_and_mismatched_bookings_are_reported() {
        let b = booking(BookingStatus::Cancelled, PaymentStatus::Held);
        let users: HashSet<ObjectId> = [b.aspirant_id].into_iter().collect();
        let issues = audit_bookings(&[b], &users);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].problem.starts_with("achiever"));
        assert!(issues[1].problem.contains("expected refunded"));
    }

    #[test]
    fn drift_compares_balance_to_ledger() {
        let mut wallet = Wallet::new(ObjectId::new());
        wallet.transactions = vec![
            WalletTransaction::new(TransactionType::Credit, TransactionCategory::TopUp, 100_000, "top-up", None),
            WalletTransaction::new(TransactionType::Debit, TransactionCategory::BookingPayment, 25_010, "session", None),
        ];
        wallet.balance = 74_990;
        assert!(find_drift(&[wallet.clone()]).is_empty());

        wallet.balance = 74_991;
        let drift = find_drift(&[wallet]);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].ledger_paise, 74_990);
        assert_eq!(drift[0].ledger_balance, 749.9);
    }
}
