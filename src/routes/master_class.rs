use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use validator::Validate;
use crate::config::Config;
use crate::db::DbConn;
use crate::guards::{AchieverGuard, AuthGuard, MaybeAuth};
use crate::models::{
    CreateMasterClassDto, MasterClass, MasterClassResponse, MasterClassStatus, TransactionCategory,
    TransactionType, UserRole, WalletTransaction,
};
use crate::services::{billing, WalletService};
use crate::utils::{ApiError, ApiResponse};

/// Checks the requested seat count against the configured cap; `None` means the cap.
pub fn resolve_capacity(requested: Option<i32>, cap: i32) -> Result<i32, String> {
    match requested {
        None => Ok(cap),
        Some(n) if n < 1 => Err("A master class needs at least one seat".to_string()),
        Some(n) if n > cap => Err(format!("A master class can have at most {} participants", cap)),
        Some(n) => Ok(n),
    }
}

fn parse_schedule(value: &str) -> Result<chrono::DateTime<chrono::Utc>, ApiError> {
    let at = chrono::DateTime::parse_from_rfc3339(value)
        .map_err(|_| ApiError::bad_request("scheduled_at must be an RFC 3339 timestamp"))?
        .with_timezone(&chrono::Utc);
    if at <= chrono::Utc::now() {
        return Err(ApiError::bad_request("A master class must be scheduled in the future"));
    }
    Ok(at)
}

async fn load_class(db: &DbConn, class_id: &str) -> Result<MasterClass, ApiError> {
    let object_id = ObjectId::parse_str(class_id)
        .map_err(|_| ApiError::bad_request("Invalid master class ID"))?;

    db.collection::<MasterClass>("master_classes")
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Master class not found"))
}

#[openapi(tag = "Master Class")]
#[post("/master-class", data = "<dto>")]
pub async fn create_master_class(
    db: &State<DbConn>,
    achiever: AchieverGuard,
    dto: Json<CreateMasterClassDto>,
) -> Result<Json<ApiResponse<MasterClassResponse>>, ApiError> {
    dto.validate()?;

    let scheduled_at = parse_schedule(&dto.scheduled_at)?;
    let max_participants = resolve_capacity(dto.max_participants, Config::master_class_capacity())
        .map_err(ApiError::bad_request)?;

    let now = DateTime::now();
    let mut class = MasterClass {
        id: None,
        host_id: achiever.auth.user_id,
        host_name: achiever.user.name.clone(),
        title: dto.title.trim().to_string(),
        description: dto.description.clone(),
        exam_category: dto.exam_category.clone().or_else(|| achiever.user.exam_category.clone()),
        scheduled_at: DateTime::from_millis(scheduled_at.timestamp_millis()),
        duration_minutes: dto.duration_minutes,
        price: billing::to_paise(dto.price),
        max_participants,
        participants: Vec::new(),
        participant_count: 0,
        refunded: Vec::new(),
        status: MasterClassStatus::Scheduled,
        meeting_room: format!("mc-{}", uuid::Uuid::new_v4()),
        created_at: now,
        updated_at: now,
    };

    let res = db
        .collection::<MasterClass>("master_classes")
        .insert_one(&class, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create master class: {}", e)))?;
    class.id = res.inserted_id.as_object_id();

    info!("Master class '{}' scheduled by {}", class.title, achiever.auth.user_id);

    Ok(Json(ApiResponse::success_with_message(
        "Master class scheduled",
        MasterClassResponse::for_viewer(class, Some(&achiever.auth.user_id)),
    )))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct MasterClassQuery {
    pub exam_category: Option<String>,
    pub upcoming: Option<bool>,
}

#[openapi(tag = "Master Class")]
#[get("/master-class?<query..>")]
pub async fn list_master_classes(
    db: &State<DbConn>,
    viewer: MaybeAuth,
    query: MasterClassQuery,
) -> Result<Json<ApiResponse<Vec<MasterClassResponse>>>, ApiError> {
    let mut filter = doc! {};
    if let Some(ref category) = query.exam_category {
        filter.insert("exam_category", category);
    }
    if query.upcoming.unwrap_or(false) {
        filter.insert("status", "scheduled");
        filter.insert("scheduled_at", doc! { "$gte": DateTime::now() });
    }

    let find_options = FindOptions::builder().sort(doc! { "scheduled_at": 1 }).build();

    let classes: Vec<MasterClass> = db
        .collection::<MasterClass>("master_classes")
        .find(filter, find_options)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    let viewer_id = viewer.0.as_ref().map(|a| a.user_id);
    Ok(Json(ApiResponse::success(
        classes
            .into_iter()
            .map(|c| MasterClassResponse::for_viewer(c, viewer_id.as_ref()))
            .collect(),
    )))
}

#[openapi(tag = "Master Class")]
#[get("/master-class/<class_id>")]
pub async fn get_master_class(
    db: &State<DbConn>,
    viewer: MaybeAuth,
    class_id: String,
) -> Result<Json<ApiResponse<MasterClassResponse>>, ApiError> {
    let class = load_class(db, &class_id).await?;
    let viewer_id = viewer.0.as_ref().map(|a| a.user_id);
    Ok(Json(ApiResponse::success(MasterClassResponse::for_viewer(class, viewer_id.as_ref()))))
}

#[openapi(tag = "Master Class")]
#[post("/master-class/<class_id>/join")]
pub async fn join_master_class(
    db: &State<DbConn>,
    auth: AuthGuard,
    class_id: String,
) -> Result<Json<ApiResponse<MasterClassResponse>>, ApiError> {
    if auth.role != UserRole::Aspirant {
        return Err(ApiError::forbidden("Only aspirants can join master classes"));
    }

    let class = load_class(db, &class_id).await?;
    let object_id = class.id.ok_or_else(|| ApiError::internal_error("Master class has no id"))?;

    if class.status != MasterClassStatus::Scheduled {
        return Err(ApiError::bad_request("This master class is not open for joining"));
    }
    if class.scheduled_at.timestamp_millis() <= chrono::Utc::now().timestamp_millis() {
        return Err(ApiError::bad_request("This master class has already started"));
    }
    if class.participants.contains(&auth.user_id) {
        return Err(ApiError::conflict("You have already joined this master class"));
    }

    let classes = db.collection::<MasterClass>("master_classes");

    // Seat claim: the count check and the push happen in one update.
    let claimed = classes
        .update_one(
            doc! {
                "_id": object_id,
                "status": "scheduled",
                "participants": { "$ne": auth.user_id },
                "$expr": { "$lt": ["$participant_count", "$max_participants"] }
            },
            doc! {
                "$push": { "participants": auth.user_id },
                "$inc": { "participant_count": 1 },
                "$set": { "updated_at": DateTime::now() }
            },
            None,
        )
        .await?;

    if claimed.matched_count == 0 {
        return Err(ApiError::conflict("This master class is full"));
    }

    if class.price > 0 {
        let debit = WalletService::debit(
            db,
            auth.user_id,
            WalletTransaction::new(
                TransactionType::Debit,
                TransactionCategory::MasterClassPayment,
                class.price,
                format!("Master class: {}", class.title),
                Some(object_id.to_hex()),
            ),
        )
        .await;

        if let Err(e) = debit {
            classes
                .update_one(
                    doc! { "_id": object_id, "participants": auth.user_id },
                    doc! {
                        "$pull": { "participants": auth.user_id },
                        "$inc": { "participant_count": -1 }
                    },
                    None,
                )
                .await?;
            return Err(e);
        }

        let payout = billing::payout(class.price, Config::platform_fee_percent());
        if payout.achiever_share > 0 {
            let earning = WalletService::credit(
                db,
                class.host_id,
                WalletTransaction::new(
                    TransactionType::Credit,
                    TransactionCategory::MasterClassEarning,
                    payout.achiever_share,
                    format!("Master class seat: {}", class.title),
                    Some(object_id.to_hex()),
                ),
            )
            .await;
            // The seat is paid for; a missed host credit shows up in the wallet audit.
            if let Err(e) = earning {
                error!("Host {} not credited for class {}: {}", class.host_id, object_id, e.message);
            }
        }
    }

    let updated = load_class(db, &class_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Joined master class",
        MasterClassResponse::for_viewer(updated, Some(&auth.user_id)),
    )))
}

#[openapi(tag = "Master Class")]
#[post("/master-class/<class_id>/cancel")]
pub async fn cancel_master_class(
    db: &State<DbConn>,
    auth: AuthGuard,
    class_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let class = load_class(db, &class_id).await?;
    let object_id = class.id.ok_or_else(|| ApiError::internal_error("Master class has no id"))?;

    if class.host_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::forbidden("Only the host can cancel this master class"));
    }

    let classes = db.collection::<MasterClass>("master_classes");

    // A cancelled class with refunds still owed is finished rather than refused.
    if class.status == MasterClassStatus::Cancelled && class.pending_refunds().is_empty() {
        return Err(ApiError::conflict("Master class is already cancelled"));
    }
    if class.status != MasterClassStatus::Cancelled {
        let result = classes
            .update_one(
                doc! { "_id": object_id, "status": "scheduled" },
                doc! { "$set": { "status": "cancelled", "updated_at": DateTime::now() } },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(ApiError::conflict("Only scheduled master classes can be cancelled"));
        }
    }

    // Participants are frozen once the status flips, so refund from a fresh read.
    let class = load_class(db, &class_id).await?;
    let owed = class.pending_refunds();

    let mut refunded = 0;
    let mut failed = 0;
    for participant in owed {
        match refund_participant(db, &class, object_id, participant).await {
            Ok(true) => refunded += 1,
            Ok(false) => {}
            Err(e) => {
                failed += 1;
                error!("Refund to {} for class {} failed: {}", participant, object_id, e.message);
            }
        }
    }

    let earned = billing::payout(class.price, Config::platform_fee_percent()).achiever_share * refunded;
    if earned > 0 {
        let clawback = WalletService::debit(
            db,
            class.host_id,
            WalletTransaction::new(
                TransactionType::Debit,
                TransactionCategory::Adjustment,
                earned,
                format!("Earnings reversed, master class cancelled: {}", class.title),
                Some(object_id.to_hex()),
            ),
        )
        .await;
        if let Err(e) = clawback {
            warn!("Could not reverse {} from host {}: {}", billing::format_rupees(earned), class.host_id, e.message);
        }
    }

    if failed > 0 {
        return Err(ApiError::internal_error(format!(
            "{} refund(s) failed; cancel again to retry them",
            failed
        )));
    }

    info!("Master class {} cancelled, {} participant(s) refunded", object_id, refunded);

    Ok(Json(ApiResponse::success_with_message(
        "Master class cancelled",
        serde_json::json!({ "class_id": object_id.to_hex(), "refunded": refunded }),
    )))
}

/// Refunds one participant's seat and records it on the class. Returns
/// whether a paid seat was settled in this call.
async fn refund_participant(
    db: &DbConn,
    class: &MasterClass,
    class_id: ObjectId,
    participant: ObjectId,
) -> Result<bool, ApiError> {
    if class.price > 0 {
        WalletService::credit_once(
            db,
            participant,
            WalletTransaction::new(
                TransactionType::Credit,
                TransactionCategory::MasterClassRefund,
                class.price,
                format!("Master class cancelled: {}", class.title),
                Some(class_id.to_hex()),
            ),
        )
        .await?;
    }

    db.collection::<MasterClass>("master_classes")
        .update_one(
            doc! { "_id": class_id },
            doc! { "$addToSet": { "refunded": participant } },
            None,
        )
        .await?;

    Ok(class.price > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_defaults_to_cap() {
        assert_eq!(resolve_capacity(None, 5), Ok(5));
        assert_eq!(resolve_capacity(Some(3), 5), Ok(3));
    }

    #[test]
    fn capacity_out_of_range_is_rejected() {
        assert!(resolve_capacity(Some(0), 5).is_err());
        assert!(resolve_capacity(Some(6), 5).is_err());
    }

    #[test]
    fn schedule_must_be_future_rfc3339() {
        assert!(parse_schedule("2020-01-01T10:00:00Z").is_err());
        assert!(parse_schedule("tomorrow").is_err());
        let future = (chrono::Utc::now() + chrono::Duration::days(2)).to_rfc3339();
        assert!(parse_schedule(&future).is_ok());
    }
}
