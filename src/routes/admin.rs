use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{
    ApprovalStatus, Booking, BookingResponse, BookingStatus, ProcessWithdrawalDto,
    TransactionCategory, TransactionType, User, UserResponse, UserRole, WalletTransaction,
    WithdrawalRequest, WithdrawalResponse, WithdrawalStatus,
};
use crate::services::{billing, EmailService, WalletService};
use crate::utils::{ApiError, ApiResponse, Page};
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use serde::Deserialize;

// ==================== USER ADMIN ROUTES ====================

#[derive(FromForm, Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct UserListQuery {
    pub role: Option<String>,
    /// pending | approved | rejected
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn user_filter(query: &UserListQuery) -> Result<Document, ApiError> {
    let mut filter = doc! {};
    if let Some(ref role) = query.role {
        match role.as_str() {
            "aspirant" | "achiever" | "admin" => filter.insert("role", role),
            _ => return Err(ApiError::bad_request("Invalid role filter")),
        };
    }
    if let Some(ref status) = query.status {
        match status.as_str() {
            "pending" | "approved" | "rejected" => filter.insert("approval_status", status),
            _ => return Err(ApiError::bad_request("Invalid approval status filter")),
        };
    }
    Ok(filter)
}

#[openapi(tag = "Admin - Users")]
#[get("/admin/users?<query..>")]
pub async fn list_users(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: UserListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit);
    let filter = user_filter(&query)?;

    let find_options = FindOptions::builder()
        .skip(page.skip())
        .limit(page.limit)
        .sort(doc! { "created_at": -1 })
        .build();

    let users: Vec<User> = db
        .collection::<User>("users")
        .find(filter.clone(), find_options)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    let total = db
        .collection::<User>("users")
        .count_documents(filter, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Count error: {}", e)))?;

    let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "users": users,
        "pagination": page.meta(total),
    }))))
}

#[derive(Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct ApprovalDto {
    pub approve: bool,
    pub reason: Option<String>,
}

#[openapi(tag = "Admin - Users")]
#[put("/admin/users/<user_id>/approval", data = "<dto>")]
pub async fn set_approval(
    db: &State<DbConn>,
    admin: AdminGuard,
    user_id: String,
    dto: Json<ApprovalDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let object_id = ObjectId::parse_str(&user_id)
        .map_err(|_| ApiError::bad_request("Invalid user ID"))?;

    let users = db.collection::<User>("users");
    let user = users
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.role != UserRole::Achiever {
        return Err(ApiError::bad_request("Only achiever profiles need approval"));
    }

    let reason = dto.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let update = if dto.approve {
        doc! {
            "$set": {
                "is_approved": true,
                "approval_status": ApprovalStatus::Approved.as_str(),
                "updated_at": DateTime::now()
            },
            "$unset": { "rejection_reason": "" }
        }
    } else {
        let reason = reason.ok_or_else(|| ApiError::bad_request("A reason is required to reject a profile"))?;
        doc! {
            "$set": {
                "is_approved": false,
                "approval_status": ApprovalStatus::Rejected.as_str(),
                "rejection_reason": reason,
                "updated_at": DateTime::now()
            }
        }
    };

    users.update_one(doc! { "_id": object_id }, update, None).await?;

    info!(
        "Admin {} {} achiever {}",
        admin.auth.user_id,
        if dto.approve { "approved" } else { "rejected" },
        object_id
    );
    EmailService::send_approval_decision(&user.email, &user.name, dto.approve, reason);

    let updated = users
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        if dto.approve { "Profile approved" } else { "Profile rejected" },
        UserResponse::from(updated),
    )))
}

#[derive(Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct ActiveDto {
    pub is_active: bool,
}

#[openapi(tag = "Admin - Users")]
#[put("/admin/users/<user_id>/active", data = "<dto>")]
pub async fn set_active(
    db: &State<DbConn>,
    admin: AdminGuard,
    user_id: String,
    dto: Json<ActiveDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&user_id)
        .map_err(|_| ApiError::bad_request("Invalid user ID"))?;

    if object_id == admin.auth.user_id && !dto.is_active {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let result = db
        .collection::<User>("users")
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": { "is_active": dto.is_active, "updated_at": DateTime::now() } },
            None,
        )
        .await?;

    if result.matched_count == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    Ok(Json(ApiResponse::success_with_message(
        if dto.is_active { "User activated" } else { "User deactivated" },
        serde_json::json!({ "user_id": user_id, "is_active": dto.is_active }),
    )))
}

// ==================== BOOKING ADMIN ROUTES ====================

#[derive(FromForm, Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct BookingListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[openapi(tag = "Admin - Bookings")]
#[get("/admin/bookings?<query..>")]
pub async fn list_bookings(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: BookingListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit);

    let mut filter = doc! {};
    if let Some(ref status) = query.status {
        let status = BookingStatus::parse(status)
            .ok_or_else(|| ApiError::bad_request("Invalid status filter"))?;
        filter.insert("status", status.as_str());
    }

    let find_options = FindOptions::builder()
        .skip(page.skip())
        .limit(page.limit)
        .sort(doc! { "created_at": -1 })
        .build();

    let bookings: Vec<Booking> = db
        .collection::<Booking>("bookings")
        .find(filter.clone(), find_options)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    let total = db
        .collection::<Booking>("bookings")
        .count_documents(filter, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Count error: {}", e)))?;

    let bookings: Vec<BookingResponse> = bookings.into_iter().map(BookingResponse::from).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "bookings": bookings,
        "pagination": page.meta(total),
    }))))
}

// ==================== WITHDRAWAL ADMIN ROUTES ====================

#[derive(FromForm, Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct WithdrawalListQuery {
    pub status: Option<String>,
}

#[openapi(tag = "Admin - Withdrawals")]
#[get("/admin/withdrawals?<query..>")]
pub async fn list_withdrawals(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: WithdrawalListQuery,
) -> Result<Json<ApiResponse<Vec<WithdrawalResponse>>>, ApiError> {
    let mut filter = doc! {};
    if let Some(ref status) = query.status {
        match status.as_str() {
            "pending" | "processed" | "rejected" => filter.insert("status", status),
            _ => return Err(ApiError::bad_request("Invalid status filter")),
        };
    }

    // Oldest first so pending requests are worked in order.
    let find_options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();

    let requests: Vec<WithdrawalRequest> = db
        .collection::<WithdrawalRequest>("withdrawal_requests")
        .find(filter, find_options)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    Ok(Json(ApiResponse::success(
        requests.into_iter().map(WithdrawalResponse::from).collect(),
    )))
}

#[openapi(tag = "Admin - Withdrawals")]
#[put("/admin/withdrawals/<withdrawal_id>", data = "<dto>")]
pub async fn process_withdrawal(
    db: &State<DbConn>,
    admin: AdminGuard,
    withdrawal_id: String,
    dto: Json<ProcessWithdrawalDto>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, ApiError> {
    let object_id = ObjectId::parse_str(&withdrawal_id)
        .map_err(|_| ApiError::bad_request("Invalid withdrawal ID"))?;

    let reference = dto.transfer_reference.as_deref().map(str::trim).filter(|r| !r.is_empty());
    if dto.approve && reference.is_none() {
        return Err(ApiError::bad_request("A transfer reference is required to mark a withdrawal processed"));
    }

    let next = if dto.approve { WithdrawalStatus::Processed } else { WithdrawalStatus::Rejected };
    let mut set = doc! { "status": next.as_str(), "processed_at": DateTime::now() };
    if let Some(reference) = reference {
        set.insert("transfer_reference", reference);
    }
    if let Some(ref note) = dto.note {
        set.insert("admin_note", note);
    }

    let requests = db.collection::<WithdrawalRequest>("withdrawal_requests");
    let result = requests
        .update_one(
            doc! { "_id": object_id, "status": WithdrawalStatus::Pending.as_str() },
            doc! { "$set": set },
            None,
        )
        .await?;

    let request = requests
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Withdrawal request not found"))?;

    if result.matched_count == 0 && !request.status.accepts_decision(dto.approve) {
        return Err(ApiError::conflict(format!(
            "Withdrawal already {}",
            request.status.as_str()
        )));
    }

    // Keyed on the request, so a repeated rejection only settles a missing refund.
    if !dto.approve {
        WalletService::credit_once(
            db,
            request.user_id,
            WalletTransaction::new(
                TransactionType::Credit,
                TransactionCategory::WithdrawalRefund,
                request.amount,
                "Withdrawal rejected, amount returned",
                Some(object_id.to_hex()),
            ),
        )
        .await?;
    }

    info!("Admin {} marked withdrawal {} {}", admin.auth.user_id, object_id, next.as_str());

    Ok(Json(ApiResponse::success_with_message(
        format!("Withdrawal {}", next.as_str()),
        WithdrawalResponse::from(request),
    )))
}

// ==================== STATS ====================

async fn count(db: &DbConn, collection: &str, filter: Document) -> Result<u64, ApiError> {
    db.collection::<Document>(collection)
        .count_documents(filter, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Count error: {}", e)))
}

#[openapi(tag = "Admin - Stats")]
#[get("/admin/stats")]
pub async fn get_stats(
    db: &State<DbConn>,
    _admin: AdminGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut users_by_role = serde_json::Map::new();
    for role in [UserRole::Aspirant, UserRole::Achiever, UserRole::Admin] {
        let n = count(db, "users", doc! { "role": role.as_str() }).await?;
        users_by_role.insert(role.as_str().to_string(), n.into());
    }

    let pending_approvals = count(
        db,
        "users",
        doc! { "role": UserRole::Achiever.as_str(), "approval_status": ApprovalStatus::Pending.as_str() },
    )
    .await?;

    let mut bookings_by_status = serde_json::Map::new();
    for status in [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Rejected,
        BookingStatus::Cancelled,
    ] {
        let n = count(db, "bookings", doc! { "status": status.as_str() }).await?;
        bookings_by_status.insert(status.as_str().to_string(), n.into());
    }

    let totals: Vec<Document> = db
        .collection::<Document>("wallets")
        .aggregate(
            vec![doc! { "$group": { "_id": null, "total": { "$sum": "$balance" } } }],
            None,
        )
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Aggregation error: {}", e)))?;
    let total_wallet_balance = totals
        .first()
        .and_then(|d| d.get_i64("total").ok().or_else(|| d.get_i32("total").ok().map(i64::from)))
        .unwrap_or(0);

    let pending_withdrawals = count(
        db,
        "withdrawal_requests",
        doc! { "status": WithdrawalStatus::Pending.as_str() },
    )
    .await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "users_by_role": users_by_role,
        "pending_approvals": pending_approvals,
        "bookings_by_status": bookings_by_status,
        "total_wallet_balance": billing::to_rupees(total_wallet_balance),
        "pending_withdrawals": pending_withdrawals,
    }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(role: Option<&str>, status: Option<&str>) -> UserListQuery {
        UserListQuery {
            role: role.map(String::from),
            status: status.map(String::from),
            page: None,
            limit: None,
        }
    }

    #[test]
    fn user_filter_accepts_known_values() {
        let filter = user_filter(&query(Some("achiever"), Some("pending"))).unwrap();
        assert_eq!(filter.get_str("role").unwrap(), "achiever");
        assert_eq!(filter.get_str("approval_status").unwrap(), "pending");
        assert!(user_filter(&query(None, None)).unwrap().is_empty());
    }

    #[test]
    fn user_filter_rejects_unknown_values() {
        assert!(user_filter(&query(Some("superuser"), None)).is_err());
        assert!(user_filter(&query(None, Some("maybe"))).is_err());
    }
}
