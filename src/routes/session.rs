use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{generate_join_code, BookingStatus, Session, SessionResponse, SessionStatus};
use crate::routes::booking::{complete_booking, load_booking};
use crate::services::billing;
use crate::utils::{ApiError, ApiResponse};

#[openapi(tag = "Session")]
#[post("/sessions/booking/<booking_id>")]
pub async fn open_session(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let booking = load_booking(db, &booking_id).await?;
    let booking_oid = booking.id.ok_or_else(|| ApiError::internal_error("Booking has no id"))?;

    if !booking.involves(&auth.user_id) {
        return Err(ApiError::forbidden("Not a participant of this booking"));
    }
    if booking.status != BookingStatus::Confirmed {
        return Err(ApiError::bad_request("Only confirmed bookings have a session room"));
    }

    let sessions = db.collection::<Session>("sessions");
    if let Some(existing) = sessions.find_one(doc! { "booking_id": booking_oid }, None).await? {
        return Ok(Json(ApiResponse::success(SessionResponse::from(existing))));
    }

    let mut session = Session {
        id: None,
        booking_id: booking_oid,
        aspirant_id: booking.aspirant_id,
        achiever_id: booking.achiever_id,
        room_id: format!("ab-{}", uuid::Uuid::new_v4()),
        join_code: generate_join_code(),
        status: SessionStatus::Open,
        started_at: DateTime::now(),
        ended_at: None,
    };

    let res = sessions.insert_one(&session, None).await?;
    session.id = res.inserted_id.as_object_id();

    Ok(Json(ApiResponse::success_with_message(
        "Session room ready",
        SessionResponse::from(session),
    )))
}

#[openapi(tag = "Session")]
#[get("/sessions/booking/<booking_id>")]
pub async fn get_session(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let booking = load_booking(db, &booking_id).await?;
    if !booking.involves(&auth.user_id) && !auth.is_admin() {
        return Err(ApiError::forbidden("Not a participant of this booking"));
    }

    let session = db
        .collection::<Session>("sessions")
        .find_one(doc! { "booking_id": booking.id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("No session room for this booking yet"))?;

    Ok(Json(ApiResponse::success(SessionResponse::from(session))))
}

#[openapi(tag = "Session")]
#[post("/sessions/<session_id>/complete")]
pub async fn complete_session(
    db: &State<DbConn>,
    auth: AuthGuard,
    session_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&session_id)
        .map_err(|_| ApiError::bad_request("Invalid session ID"))?;

    let session = db
        .collection::<Session>("sessions")
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    if session.achiever_id != auth.user_id {
        return Err(ApiError::forbidden("Only the achiever can end the session"));
    }
    if session.status == SessionStatus::Ended {
        return Err(ApiError::bad_request("Session already ended"));
    }

    let booking = load_booking(db, &session.booking_id.to_hex()).await?;
    let payout = complete_booking(db, &booking).await?;

    db.collection::<Session>("sessions")
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": { "status": "ended", "ended_at": DateTime::now() } },
            None,
        )
        .await?;

    info!("Session {} completed, achiever share {}", session_id, billing::format_rupees(payout.achiever_share));

    Ok(Json(ApiResponse::success_with_message(
        "Session completed",
        serde_json::json!({
            "booking_id": session.booking_id.to_hex(),
            "amount": billing::to_rupees(booking.amount),
            "platform_fee": billing::to_rupees(payout.platform_fee),
            "earned": billing::to_rupees(payout.achiever_share),
        }),
    )))
}
