use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use validator::Validate;
use crate::config::Config;
use crate::db::DbConn;
use crate::guards::{AchieverGuard, AuthGuard};
use crate::models::{
    BankDetails, PaymentOrder, PaymentOrderStatus, TopUpOrderDto, TransactionCategory,
    TransactionType, VerifyTopUpDto, Wallet, WalletResponse, WalletTransaction, WithdrawalDto,
    WithdrawalRequest, WithdrawalResponse, WithdrawalStatus, POLL_INTERVAL_SECS, POLL_MAX_ATTEMPTS,
};
use crate::services::{billing, RazorpayService, WalletService};
use crate::utils::{validate_ifsc, ApiError, ApiResponse};

#[openapi(tag = "Wallet")]
#[get("/wallets/me")]
pub async fn get_my_wallet(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<WalletResponse>>, ApiError> {
    let wallet = WalletService::ensure(db, auth.user_id).await?;
    Ok(Json(ApiResponse::success(WalletResponse::from(wallet))))
}

#[openapi(tag = "Wallet")]
#[get("/wallets/user/<user_id>")]
pub async fn get_user_wallet(
    db: &State<DbConn>,
    auth: AuthGuard,
    user_id: String,
) -> Result<Json<ApiResponse<WalletResponse>>, ApiError> {
    let object_id = ObjectId::parse_str(&user_id)
        .map_err(|_| ApiError::bad_request("Invalid user ID"))?;

    if object_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::forbidden("Not authorized to view this wallet"));
    }

    let wallet = WalletService::ensure(db, object_id).await?;
    Ok(Json(ApiResponse::success(WalletResponse::from(wallet))))
}

// ============================================================================
// TOP-UP
// ============================================================================

#[openapi(tag = "Wallet")]
#[post("/wallets/topup/order", data = "<dto>")]
pub async fn create_topup_order(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<TopUpOrderDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let amount = billing::validate_top_up(dto.amount).map_err(ApiError::bad_request)?;

    if !Config::is_razorpay_enabled() {
        return Err(ApiError::internal_error("Payment gateway is not configured"));
    }

    let receipt = format!("topup_{}", &uuid::Uuid::new_v4().simple().to_string()[..16]);
    let order = RazorpayService::create_order(amount, &receipt)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create payment order: {}", e)))?;

    let record = PaymentOrder {
        id: None,
        order_id: order.id.clone(),
        user_id: auth.user_id,
        amount,
        currency: order.currency.clone(),
        status: PaymentOrderStatus::Created,
        payment_id: None,
        created_at: DateTime::now(),
        paid_at: None,
    };

    db.collection::<PaymentOrder>("payment_orders")
        .insert_one(&record, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to record order: {}", e)))?;

    info!("Top-up order {} created for {} ({})", order.id, auth.user_id, billing::format_rupees(amount));

    Ok(Json(ApiResponse::success(serde_json::json!({
        "order_id": order.id,
        "amount": billing::to_rupees(amount),
        "amount_paise": order.amount,
        "currency": order.currency,
        "receipt": order.receipt,
        "key_id": RazorpayService::public_key(),
        "poll": {
            "interval_secs": POLL_INTERVAL_SECS,
            "max_attempts": POLL_MAX_ATTEMPTS,
        }
    }))))
}

#[openapi(tag = "Wallet")]
#[post("/wallets/topup/verify", data = "<dto>")]
pub async fn verify_topup(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<VerifyTopUpDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let valid = RazorpayService::verify_payment(
        &dto.razorpay_order_id,
        &dto.razorpay_payment_id,
        &dto.razorpay_signature,
    )
    .map_err(ApiError::internal_error)?;

    if !valid {
        warn!("Invalid payment signature for order {}", dto.razorpay_order_id);
        return Err(ApiError::bad_request("Invalid payment signature"));
    }

    let orders = db.collection::<PaymentOrder>("payment_orders");
    let mut order = orders
        .find_one(doc! { "order_id": &dto.razorpay_order_id, "user_id": auth.user_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment order not found"))?;

    let flipped = orders
        .update_one(
            doc! { "order_id": &order.order_id, "status": "created" },
            doc! {
                "$set": {
                    "status": "paid",
                    "payment_id": &dto.razorpay_payment_id,
                    "paid_at": DateTime::now()
                }
            },
            None,
        )
        .await?;
    if flipped.matched_count == 1 {
        order.status = PaymentOrderStatus::Paid;
    } else if let Some(current) = orders.find_one(doc! { "order_id": &order.order_id }, None).await? {
        order = current;
    }

    if order.status != PaymentOrderStatus::Paid {
        return Err(ApiError::conflict("This payment order can no longer be verified"));
    }

    let wallet = settle_top_up(db, &order).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Payment verified successfully",
        serde_json::json!({
            "order_id": order.order_id,
            "amount": billing::to_rupees(order.amount),
            "balance": billing::to_rupees(wallet.balance),
        }),
    )))
}

/// Credits a paid order to its wallet if the ledger does not have it yet.
/// Safe to repeat, so a verify or status poll after a failed credit finishes the job.
async fn settle_top_up(db: &DbConn, order: &PaymentOrder) -> Result<Wallet, ApiError> {
    let wallet = WalletService::ensure(db, order.user_id).await?;
    if !order.awaiting_credit(&wallet) {
        return Ok(wallet);
    }

    let credited = WalletService::credit_once(
        db,
        order.user_id,
        WalletTransaction::new(
            TransactionType::Credit,
            TransactionCategory::TopUp,
            order.amount,
            "Wallet top-up",
            Some(order.order_id.clone()),
        ),
    )
    .await?;
    if credited {
        info!("Top-up {} verified, credited {}", order.order_id, billing::format_rupees(order.amount));
    }

    WalletService::ensure(db, order.user_id).await
}

#[openapi(tag = "Wallet")]
#[get("/wallets/topup/<order_id>/status")]
pub async fn get_topup_status(
    db: &State<DbConn>,
    auth: AuthGuard,
    order_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let order = db
        .collection::<PaymentOrder>("payment_orders")
        .find_one(doc! { "order_id": &order_id, "user_id": auth.user_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment order not found"))?;

    let wallet = settle_top_up(db, &order).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "order_id": order.order_id,
        "status": order.status,
        "amount": billing::to_rupees(order.amount),
        "balance": billing::to_rupees(wallet.balance),
    }))))
}

// ============================================================================
// BANK DETAILS & WITHDRAWALS
// ============================================================================

#[openapi(tag = "Wallet")]
#[put("/wallets/bank-details", data = "<dto>")]
pub async fn update_bank_details(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<BankDetails>,
) -> Result<Json<ApiResponse<BankDetails>>, ApiError> {
    dto.validate()?;

    let mut details = dto.into_inner();
    details.ifsc = details.ifsc.trim().to_uppercase();
    details.account_number = details.account_number.trim().to_string();

    if !details.account_number.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request("Account number must contain digits only"));
    }
    if !validate_ifsc(&details.ifsc) {
        return Err(ApiError::bad_request("Invalid IFSC code"));
    }

    WalletService::ensure(db, auth.user_id).await?;

    let bson = to_bson(&details).map_err(|e| ApiError::internal_error(e.to_string()))?;
    db.collection::<Wallet>("wallets")
        .update_one(
            doc! { "user_id": auth.user_id },
            doc! { "$set": { "bank_details": bson, "updated_at": DateTime::now() } },
            None,
        )
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Bank details saved",
        details.masked(),
    )))
}

#[openapi(tag = "Wallet")]
#[post("/wallets/withdrawals", data = "<dto>")]
pub async fn request_withdrawal(
    db: &State<DbConn>,
    achiever: AchieverGuard,
    dto: Json<WithdrawalDto>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, ApiError> {
    let user_id = achiever.auth.user_id;
    let wallet = WalletService::ensure(db, user_id).await?;

    let bank_details = wallet
        .bank_details
        .clone()
        .ok_or_else(|| ApiError::bad_request("Add bank details before requesting a withdrawal"))?;

    let breakdown = billing::withdrawal_breakdown(
        dto.amount,
        Config::withdrawal_fee_percent(),
        Config::min_withdrawal_amount(),
        wallet.balance,
    )
    .map_err(ApiError::bad_request)?;

    let withdrawal_id = ObjectId::new();

    WalletService::debit(
        db,
        user_id,
        WalletTransaction::new(
            TransactionType::Debit,
            TransactionCategory::Withdrawal,
            breakdown.amount,
            format!(
                "Withdrawal to {} (fee {}, net {})",
                bank_details.bank_name,
                billing::format_rupees(breakdown.processing_fee),
                billing::format_rupees(breakdown.net_amount)
            ),
            Some(withdrawal_id.to_hex()),
        ),
    )
    .await?;

    let request = WithdrawalRequest {
        id: Some(withdrawal_id),
        user_id,
        amount: breakdown.amount,
        processing_fee: breakdown.processing_fee,
        net_amount: breakdown.net_amount,
        status: WithdrawalStatus::Pending,
        bank_details,
        admin_note: None,
        transfer_reference: None,
        processed_at: None,
        created_at: DateTime::now(),
    };

    if let Err(e) = db
        .collection::<WithdrawalRequest>("withdrawal_requests")
        .insert_one(&request, None)
        .await
    {
        error!("Withdrawal insert failed for {}, re-crediting: {}", user_id, e);
        WalletService::credit(
            db,
            user_id,
            WalletTransaction::new(
                TransactionType::Credit,
                TransactionCategory::WithdrawalRefund,
                breakdown.amount,
                "Withdrawal could not be recorded",
                Some(withdrawal_id.to_hex()),
            ),
        )
        .await?;
        return Err(ApiError::internal_error("Failed to create withdrawal request"));
    }

    Ok(Json(ApiResponse::success_with_message(
        "Withdrawal requested",
        WithdrawalResponse::from(request),
    )))
}

#[openapi(tag = "Wallet")]
#[get("/wallets/withdrawals")]
pub async fn get_my_withdrawals(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<Vec<WithdrawalResponse>>>, ApiError> {
    let find_options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();

    let requests: Vec<WithdrawalRequest> = db
        .collection::<WithdrawalRequest>("withdrawal_requests")
        .find(doc! { "user_id": auth.user_id }, find_options)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    Ok(Json(ApiResponse::success(
        requests.into_iter().map(WithdrawalResponse::from).collect(),
    )))
}
