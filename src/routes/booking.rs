use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use validator::Validate;
use crate::config::Config;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{
    starts_before, weekday_index, Availability, Booking, BookingResponse, BookingStatus,
    CreateBookingDto, PaymentStatus, TimeWindow, TransactionCategory, TransactionType,
    UpdateBookingStatusDto, User, UserRole, WalletTransaction,
};
use crate::routes::availability::free_slot_filter;
use crate::services::{billing, CalendarLock, EmailService, WalletService};
use crate::utils::{parse_date, ApiError, ApiResponse};

pub const MIN_SESSION_MINUTES: i32 = 30;
pub const MAX_SESSION_MINUTES: i32 = 180;

pub fn validate_duration(minutes: i32) -> Result<(), String> {
    if !(MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES).contains(&minutes) {
        return Err(format!(
            "Duration must be {}-{} minutes",
            MIN_SESSION_MINUTES, MAX_SESSION_MINUTES
        ));
    }
    if minutes % 15 != 0 {
        return Err("Duration must be a multiple of 15 minutes".to_string());
    }
    Ok(())
}

/// Whether a requested window collides with any of `existing` on the same date.
pub fn has_conflict(window: &TimeWindow, existing: &[Booking]) -> bool {
    existing
        .iter()
        .filter(|b| b.status.is_active())
        .filter_map(|b| TimeWindow::parse(&b.start_time, &b.end_time).ok())
        .any(|w| w.overlaps(window))
}

/// Outcome of an allowed status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Move the booking to the requested status.
    Apply,
    /// Already in the requested status but the refund never settled; settle it.
    SettleRefund,
}

/// Who may move a booking where. Achievers confirm or reject; either party
/// may cancel; completion only happens through the session room.
pub fn authorize_transition(
    booking: &Booking,
    actor: &ObjectId,
    next: BookingStatus,
) -> Result<StatusChange, ApiError> {
    if !booking.involves(actor) {
        return Err(ApiError::forbidden("Not authorized to update this booking"));
    }
    if next == BookingStatus::Completed {
        return Err(ApiError::bad_request("Sessions are completed from the session room"));
    }
    if matches!(next, BookingStatus::Confirmed | BookingStatus::Rejected) && &booking.achiever_id != actor {
        return Err(ApiError::forbidden("Only the achiever can accept or decline a booking"));
    }

    let refund_pending = matches!(next, BookingStatus::Rejected | BookingStatus::Cancelled)
        && booking.status == next
        && booking.payment_status == PaymentStatus::Held;
    if refund_pending {
        return Ok(StatusChange::SettleRefund);
    }

    if !booking.status.can_transition_to(next) {
        return Err(ApiError::bad_request(format!(
            "Cannot change a {} booking to {}",
            booking.status.as_str(),
            next.as_str()
        )));
    }
    Ok(StatusChange::Apply)
}

async fn release_slot(db: &DbConn, booking: &Booking) {
    if let Some(ref slot_id) = booking.slot_id {
        db.collection::<Availability>("availability")
            .update_one(
                doc! { "achiever_id": booking.achiever_id, "specific_slots.id": slot_id },
                doc! { "$set": { "specific_slots.$.is_booked": false } },
                None,
            )
            .await
            .ok();
    }
}

/// Returns the held amount to the aspirant and frees the slot. The credit is
/// keyed on the booking, so running this again after a failure is safe.
pub(crate) async fn refund_booking(db: &DbConn, booking: &Booking) -> Result<(), ApiError> {
    let booking_id = booking.id.ok_or_else(|| ApiError::internal_error("Booking has no id"))?;

    if booking.amount > 0 {
        WalletService::credit_once(
            db,
            booking.aspirant_id,
            WalletTransaction::new(
                TransactionType::Credit,
                TransactionCategory::BookingRefund,
                booking.amount,
                format!("Refund for session on {} at {}", booking.date, booking.start_time),
                Some(booking_id.to_hex()),
            ),
        )
        .await?;
    }

    db.collection::<Booking>("bookings")
        .update_one(
            doc! { "_id": booking_id, "payment_status": PaymentStatus::Held.as_str() },
            doc! { "$set": { "payment_status": PaymentStatus::Refunded.as_str(), "updated_at": DateTime::now() } },
            None,
        )
        .await?;

    release_slot(db, booking).await;
    Ok(())
}

/// Pays the achiever their share of a completed booking, once.
async fn release_payment(db: &DbConn, booking: &Booking) -> Result<billing::Payout, ApiError> {
    let booking_id = booking.id.ok_or_else(|| ApiError::internal_error("Booking has no id"))?;

    let payout = billing::payout(booking.amount, Config::platform_fee_percent());
    if payout.achiever_share > 0 {
        WalletService::credit_once(
            db,
            booking.achiever_id,
            WalletTransaction::new(
                TransactionType::Credit,
                TransactionCategory::SessionEarning,
                payout.achiever_share,
                format!(
                    "Session on {} ({} less {} platform fee)",
                    booking.date,
                    billing::format_rupees(booking.amount),
                    billing::format_rupees(payout.platform_fee)
                ),
                Some(booking_id.to_hex()),
            ),
        )
        .await?;
    }

    db.collection::<Booking>("bookings")
        .update_one(
            doc! { "_id": booking_id, "payment_status": PaymentStatus::Held.as_str() },
            doc! { "$set": { "payment_status": PaymentStatus::Released.as_str(), "updated_at": DateTime::now() } },
            None,
        )
        .await?;

    Ok(payout)
}

/// Marks a confirmed booking completed and pays the achiever. A completed
/// booking whose payout never settled is paid out instead of refused.
pub(crate) async fn complete_booking(db: &DbConn, booking: &Booking) -> Result<billing::Payout, ApiError> {
    let booking_id = booking.id.ok_or_else(|| ApiError::internal_error("Booking has no id"))?;

    match (booking.status, booking.payment_status) {
        (BookingStatus::Confirmed, _) => {
            let result = db
                .collection::<Booking>("bookings")
                .update_one(
                    doc! { "_id": booking_id, "status": BookingStatus::Confirmed.as_str() },
                    doc! {
                        "$set": {
                            "status": BookingStatus::Completed.as_str(),
                            "updated_at": DateTime::now()
                        }
                    },
                    None,
                )
                .await?;
            if result.matched_count == 0 {
                return Err(ApiError::conflict("Booking is not in a confirmed state"));
            }
        }
        (BookingStatus::Completed, PaymentStatus::Held) => {
            warn!("Settling unpaid earnings for completed booking {}", booking_id);
        }
        _ => return Err(ApiError::conflict("Booking is not in a confirmed state")),
    }

    release_payment(db, booking).await
}

/// Availability, overlap, slot claim, payment and insert for a new booking.
/// Callers hold the calendar lock for both parties on `date`.
async fn place_booking(
    db: &DbConn,
    aspirant_id: ObjectId,
    achiever: &User,
    dto: &CreateBookingDto,
    date: chrono::NaiveDate,
    window: TimeWindow,
) -> Result<Booking, ApiError> {
    let achiever_id = achiever.id.ok_or_else(|| ApiError::internal_error("Achiever has no id"))?;
    let hourly_rate = achiever
        .hourly_rate
        .ok_or_else(|| ApiError::bad_request("This achiever has not set an hourly rate yet"))?;

    let availability = db
        .collection::<Availability>("availability")
        .find_one(doc! { "achiever_id": achiever_id }, None)
        .await?
        .unwrap_or_else(|| Availability::empty(achiever_id));

    if !availability.covers(date, &window) {
        return Err(ApiError::bad_request("Requested time is outside the achiever's availability"));
    }

    // Either party already busy at that time?
    let same_day: Vec<Booking> = db
        .collection::<Booking>("bookings")
        .find(
            doc! {
                "date": &dto.date,
                "status": { "$in": [BookingStatus::Pending.as_str(), BookingStatus::Confirmed.as_str()] },
                "$or": [ { "achiever_id": achiever_id }, { "aspirant_id": aspirant_id } ]
            },
            None,
        )
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    if has_conflict(&window, &same_day) {
        return Err(ApiError::conflict("This time overlaps an existing booking"));
    }

    let covering_weekly = availability.weekly_slots.iter().any(|s| {
        s.day_of_week == weekday_index(date)
            && TimeWindow::parse(&s.start_time, &s.end_time)
                .map(|w| w.contains(&window))
                .unwrap_or(false)
    });

    // One-off slots are consumed by a booking; weekly slots are not.
    let slot_id = if covering_weekly {
        None
    } else {
        let slot = availability
            .specific_slot_for(date, &window)
            .ok_or_else(|| ApiError::bad_request("Requested time is outside the achiever's availability"))?;
        let claimed = db
            .collection::<Availability>("availability")
            .update_one(
                free_slot_filter(achiever_id, &slot.id),
                doc! { "$set": { "specific_slots.$.is_booked": true } },
                None,
            )
            .await?;
        if claimed.matched_count == 0 {
            return Err(ApiError::conflict("This slot was just booked by someone else"));
        }
        Some(slot.id.clone())
    };

    let now = DateTime::now();
    let booking_id = ObjectId::new();
    let booking = Booking {
        id: Some(booking_id),
        aspirant_id,
        achiever_id,
        date: dto.date.clone(),
        start_time: dto.start_time.clone(),
        end_time: window.end_string(),
        duration_minutes: dto.duration_minutes,
        topic: dto.topic.clone(),
        notes: dto.notes.clone(),
        status: BookingStatus::Pending,
        amount: billing::session_price(hourly_rate, dto.duration_minutes),
        payment_status: PaymentStatus::Held,
        slot_id,
        cancellation_reason: None,
        cancelled_by: None,
        created_at: now,
        updated_at: now,
    };

    if booking.amount > 0 {
        let debit = WalletService::debit(
            db,
            aspirant_id,
            WalletTransaction::new(
                TransactionType::Debit,
                TransactionCategory::BookingPayment,
                booking.amount,
                format!("Session with {} on {} at {}", achiever.name, booking.date, booking.start_time),
                Some(booking_id.to_hex()),
            ),
        )
        .await;
        if let Err(e) = debit {
            release_slot(db, &booking).await;
            return Err(e);
        }
    }

    if let Err(e) = db.collection::<Booking>("bookings").insert_one(&booking, None).await {
        error!("Booking insert failed after debit, refunding {}: {}", aspirant_id, e);
        if let Err(refund) = refund_booking(db, &booking).await {
            error!("Refund for unrecorded booking {} failed: {}", booking_id, refund.message);
        }
        return Err(ApiError::internal_error("Failed to create booking"));
    }

    Ok(booking)
}

#[openapi(tag = "Booking")]
#[post("/bookings", data = "<dto>")]
pub async fn create_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateBookingDto>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    dto.validate()?;

    if auth.role != UserRole::Aspirant {
        return Err(ApiError::forbidden("Only aspirants can book sessions"));
    }
    validate_duration(dto.duration_minutes).map_err(ApiError::bad_request)?;

    let achiever_id = ObjectId::parse_str(&dto.achiever_id)
        .map_err(|_| ApiError::bad_request("Invalid achiever ID"))?;

    let date = parse_date(&dto.date).ok_or_else(|| ApiError::bad_request("Invalid date, expected YYYY-MM-DD"))?;
    let window = TimeWindow::starting_at(&dto.start_time, dto.duration_minutes)
        .map_err(ApiError::bad_request)?;
    if starts_before(date, &window, chrono::Utc::now().naive_utc()) {
        return Err(ApiError::bad_request("Cannot book a session in the past"));
    }

    let achiever = db
        .collection::<User>("users")
        .find_one(doc! { "_id": achiever_id }, None)
        .await?
        .filter(User::is_bookable)
        .ok_or_else(|| ApiError::not_found("Achiever not found"))?;

    let lock = CalendarLock::acquire(db, &[achiever_id, auth.user_id], &dto.date).await?;
    let placed = place_booking(db, auth.user_id, &achiever, &dto, date, window).await;
    lock.release(db).await;
    let booking = placed?;

    let aspirant_name = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| "An aspirant".to_string());
    EmailService::send_booking_requested(&achiever.email, &aspirant_name, &booking.date, &booking.start_time);

    Ok(Json(ApiResponse::success_with_message(
        "Booking request sent",
        BookingResponse::from(booking),
    )))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct MyBookingsQuery {
    pub status: Option<String>,
}

#[openapi(tag = "Booking")]
#[get("/bookings/mine?<query..>")]
pub async fn get_my_bookings(
    db: &State<DbConn>,
    auth: AuthGuard,
    query: MyBookingsQuery,
) -> Result<Json<ApiResponse<Vec<BookingResponse>>>, ApiError> {
    let mut filter = doc! {
        "$or": [ { "aspirant_id": auth.user_id }, { "achiever_id": auth.user_id } ]
    };
    if let Some(ref status) = query.status {
        let status = BookingStatus::parse(status)
            .ok_or_else(|| ApiError::bad_request("Invalid status filter"))?;
        filter.insert("status", status.as_str());
    }

    let find_options = FindOptions::builder()
        .sort(doc! { "date": -1, "start_time": -1 })
        .build();

    let bookings: Vec<Booking> = db
        .collection::<Booking>("bookings")
        .find(filter, find_options)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    Ok(Json(ApiResponse::success(
        bookings.into_iter().map(BookingResponse::from).collect(),
    )))
}

pub(crate) async fn load_booking(db: &DbConn, booking_id: &str) -> Result<Booking, ApiError> {
    let object_id = ObjectId::parse_str(booking_id)
        .map_err(|_| ApiError::bad_request("Invalid booking ID"))?;

    db.collection::<Booking>("bookings")
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))
}

#[openapi(tag = "Booking")]
#[get("/bookings/<booking_id>")]
pub async fn get_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking = load_booking(db, &booking_id).await?;

    if !booking.involves(&auth.user_id) && !auth.is_admin() {
        return Err(ApiError::forbidden("Not authorized to view this booking"));
    }

    Ok(Json(ApiResponse::success(BookingResponse::from(booking))))
}

#[openapi(tag = "Booking")]
#[put("/bookings/<booking_id>/status", data = "<dto>")]
pub async fn update_booking_status(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
    dto: Json<UpdateBookingStatusDto>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking = load_booking(db, &booking_id).await?;
    let next = dto.status;

    if authorize_transition(&booking, &auth.user_id, next)? == StatusChange::SettleRefund {
        refund_booking(db, &booking).await?;
        let updated = load_booking(db, &booking_id).await?;
        return Ok(Json(ApiResponse::success_with_message(
            "Refund settled",
            BookingResponse::from(updated),
        )));
    }

    let is_achiever = booking.achiever_id == auth.user_id;
    let mut set = doc! { "status": next.as_str(), "updated_at": DateTime::now() };
    if matches!(next, BookingStatus::Rejected | BookingStatus::Cancelled) {
        set.insert("cancelled_by", auth.user_id);
        if let Some(ref reason) = dto.reason {
            set.insert("cancellation_reason", reason);
        }
    }

    // Guard on the current status so concurrent updates cannot both win.
    let result = db
        .collection::<Booking>("bookings")
        .update_one(
            doc! { "_id": booking.id, "status": booking.status.as_str() },
            doc! { "$set": set },
            None,
        )
        .await?;
    if result.matched_count == 0 {
        return Err(ApiError::conflict("Booking was updated concurrently, please refresh"));
    }

    // A failed refund leaves payment_status held; repeating the request settles it.
    if matches!(next, BookingStatus::Rejected | BookingStatus::Cancelled) {
        refund_booking(db, &booking).await?;
    }

    let updated = load_booking(db, &booking_id).await?;

    let other_party = if is_achiever { updated.aspirant_id } else { updated.achiever_id };
    if let Ok(Some(other)) = db
        .collection::<User>("users")
        .find_one(doc! { "_id": other_party }, None)
        .await
    {
        EmailService::send_booking_update(&other.email, &updated.date, &updated.start_time, next.as_str());
    }

    Ok(Json(ApiResponse::success_with_message(
        format!("Booking {}", next.as_str()),
        BookingResponse::from(updated),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;

    fn booking(start: &str, end: &str, status: BookingStatus) -> Booking {
        Booking {
            id: Some(ObjectId::new()),
            aspirant_id: ObjectId::new(),
            achiever_id: ObjectId::new(),
            date: "2026-06-01".into(),
            start_time: start.into(),
            end_time: end.into(),
            duration_minutes: 60,
            topic: None,
            notes: None,
            status,
            amount: 50_000,
            payment_status: PaymentStatus::Held,
            slot_id: None,
            cancellation_reason: None,
            cancelled_by: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn durations_must_be_quarter_hours_in_range() {
        for ok in [30, 45, 60, 90, 180] {
            assert!(validate_duration(ok).is_ok(), "{}", ok);
        }
        for bad in [0, 15, 29, 40, 50, 185, 195, -30] {
            assert!(validate_duration(bad).is_err(), "{}", bad);
        }
        assert_eq!(validate_duration(40).unwrap_err(), "Duration must be a multiple of 15 minutes");
    }

    #[test]
    fn only_the_achiever_confirms_or_rejects() {
        let b = booking("10:00", "11:00", BookingStatus::Pending);
        let (aspirant, achiever) = (b.aspirant_id, b.achiever_id);

        assert_eq!(authorize_transition(&b, &achiever, BookingStatus::Confirmed).unwrap(), StatusChange::Apply);
        assert_eq!(authorize_transition(&b, &achiever, BookingStatus::Rejected).unwrap(), StatusChange::Apply);

        let err = authorize_transition(&b, &aspirant, BookingStatus::Confirmed).unwrap_err();
        assert_eq!(err.status, Status::Forbidden);
        let err = authorize_transition(&b, &aspirant, BookingStatus::Rejected).unwrap_err();
        assert_eq!(err.status, Status::Forbidden);
    }

    #[test]
    fn either_party_may_cancel() {
        let pending = booking("10:00", "11:00", BookingStatus::Pending);
        let confirmed = booking("10:00", "11:00", BookingStatus::Confirmed);
        for b in [&pending, &confirmed] {
            assert!(authorize_transition(b, &b.aspirant_id, BookingStatus::Cancelled).is_ok());
            assert!(authorize_transition(b, &b.achiever_id, BookingStatus::Cancelled).is_ok());
        }
    }

    #[test]
    fn outsiders_and_completion_are_refused() {
        let b = booking("10:00", "11:00", BookingStatus::Confirmed);
        let err = authorize_transition(&b, &ObjectId::new(), BookingStatus::Cancelled).unwrap_err();
        assert_eq!(err.status, Status::Forbidden);

        let err = authorize_transition(&b, &b.achiever_id, BookingStatus::Completed).unwrap_err();
        assert_eq!(err.status, Status::BadRequest);
    }

    #[test]
    fn invalid_transitions_are_bad_requests() {
        let b = booking("10:00", "11:00", BookingStatus::Confirmed);
        let err = authorize_transition(&b, &b.achiever_id, BookingStatus::Rejected).unwrap_err();
        assert_eq!(err.status, Status::BadRequest);

        let mut done = booking("10:00", "11:00", BookingStatus::Cancelled);
        done.payment_status = PaymentStatus::Refunded;
        let err = authorize_transition(&done, &done.aspirant_id, BookingStatus::Cancelled).unwrap_err();
        assert_eq!(err.status, Status::BadRequest);
    }

    #[test]
    fn unsettled_refund_can_be_retried() {
        let cancelled = booking("10:00", "11:00", BookingStatus::Cancelled);
        assert_eq!(
            authorize_transition(&cancelled, &cancelled.aspirant_id, BookingStatus::Cancelled).unwrap(),
            StatusChange::SettleRefund
        );

        let rejected = booking("10:00", "11:00", BookingStatus::Rejected);
        assert_eq!(
            authorize_transition(&rejected, &rejected.achiever_id, BookingStatus::Rejected).unwrap(),
            StatusChange::SettleRefund
        );
        // The aspirant still cannot use a reject to trigger it.
        assert!(authorize_transition(&rejected, &rejected.aspirant_id, BookingStatus::Rejected).is_err());
    }

    #[test]
    fn overlapping_active_booking_conflicts() {
        let existing = vec![booking("10:00", "11:00", BookingStatus::Confirmed)];
        let window = TimeWindow::starting_at("10:30", 60).unwrap();
        assert!(has_conflict(&window, &existing));
    }

    #[test]
    fn back_to_back_bookings_do_not_conflict() {
        let existing = vec![booking("10:00", "11:00", BookingStatus::Pending)];
        let window = TimeWindow::starting_at("11:00", 30).unwrap();
        assert!(!has_conflict(&window, &existing));
    }

    #[test]
    fn inactive_bookings_free_the_time() {
        let existing = vec![
            booking("10:00", "11:00", BookingStatus::Cancelled),
            booking("10:00", "11:00", BookingStatus::Rejected),
        ];
        let window = TimeWindow::starting_at("10:00", 60).unwrap();
        assert!(!has_conflict(&window, &existing));
    }
}
