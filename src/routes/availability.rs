use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime, Document};
use mongodb::options::UpdateOptions;
use crate::db::DbConn;
use crate::guards::AchieverGuard;
use crate::models::{
    build_weekly_slots, AddSlotDto, Availability, SpecificSlot, UpdateWeeklyDto, WeeklySlot,
};
use crate::utils::{ApiError, ApiResponse};

async fn load_availability(db: &DbConn, achiever_id: ObjectId) -> Result<Availability, ApiError> {
    Ok(db
        .collection::<Availability>("availability")
        .find_one(doc! { "achiever_id": achiever_id }, None)
        .await?
        .unwrap_or_else(|| Availability::empty(achiever_id)))
}

/// Matches the achiever's availability only while `slot_id` is unbooked.
pub(crate) fn free_slot_filter(achiever_id: ObjectId, slot_id: &str) -> Document {
    doc! {
        "achiever_id": achiever_id,
        "specific_slots": { "$elemMatch": { "id": slot_id, "is_booked": false } }
    }
}

#[openapi(tag = "Availability")]
#[get("/availability/<achiever_id>")]
pub async fn get_availability(
    db: &State<DbConn>,
    achiever_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&achiever_id)
        .map_err(|_| ApiError::bad_request("Invalid achiever ID"))?;

    let availability = load_availability(db, object_id).await?;
    let now = chrono::Utc::now();
    let today = now.format("%Y-%m-%d").to_string();
    let clock = now.format("%H:%M").to_string();

    // Past one-off slots are kept for history but not offered.
    let upcoming: Vec<SpecificSlot> = availability
        .specific_slots
        .into_iter()
        .filter(|s| (s.date.as_str(), s.start_time.as_str()) >= (today.as_str(), clock.as_str()))
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "achiever_id": achiever_id,
        "weekly_slots": availability.weekly_slots,
        "specific_slots": upcoming,
    }))))
}

#[openapi(tag = "Availability")]
#[put("/availability/weekly", data = "<dto>")]
pub async fn update_weekly_slots(
    db: &State<DbConn>,
    achiever: AchieverGuard,
    dto: Json<UpdateWeeklyDto>,
) -> Result<Json<ApiResponse<Vec<WeeklySlot>>>, ApiError> {
    let slots = build_weekly_slots(dto.into_inner().slots).map_err(ApiError::bad_request)?;
    let bson = to_bson(&slots).map_err(|e| ApiError::internal_error(e.to_string()))?;

    db.collection::<Availability>("availability")
        .update_one(
            doc! { "achiever_id": achiever.auth.user_id },
            doc! {
                "$set": { "weekly_slots": bson, "updated_at": DateTime::now() },
                "$setOnInsert": { "specific_slots": [] }
            },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;

    info!("Achiever {} saved {} weekly slots", achiever.auth.user_id, slots.len());

    Ok(Json(ApiResponse::success_with_message("Weekly availability updated", slots)))
}

#[openapi(tag = "Availability")]
#[post("/availability/slots", data = "<dto>")]
pub async fn add_specific_slot(
    db: &State<DbConn>,
    achiever: AchieverGuard,
    dto: Json<AddSlotDto>,
) -> Result<Json<ApiResponse<SpecificSlot>>, ApiError> {
    let achiever_id = achiever.auth.user_id;
    let availability = load_availability(db, achiever_id).await?;

    let slot = availability
        .new_specific_slot(&dto, chrono::Utc::now().naive_utc())
        .map_err(ApiError::bad_request)?;
    let bson = to_bson(&slot).map_err(|e| ApiError::internal_error(e.to_string()))?;

    db.collection::<Availability>("availability")
        .update_one(
            doc! { "achiever_id": achiever_id },
            doc! {
                "$push": { "specific_slots": bson },
                "$set": { "updated_at": DateTime::now() },
                "$setOnInsert": { "weekly_slots": [] }
            },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;

    Ok(Json(ApiResponse::success_with_message("Slot added", slot)))
}

#[openapi(tag = "Availability")]
#[delete("/availability/slots/<slot_id>")]
pub async fn delete_specific_slot(
    db: &State<DbConn>,
    achiever: AchieverGuard,
    slot_id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let availability = load_availability(db, achiever.auth.user_id).await?;

    let slot = availability
        .specific_slots
        .iter()
        .find(|s| s.id == slot_id)
        .ok_or_else(|| ApiError::not_found("Slot not found"))?;
    if slot.is_booked {
        return Err(ApiError::conflict("Slot is booked; cancel the booking first"));
    }

    // Match only while the slot is still free so a concurrent booking wins.
    let result = db
        .collection::<Availability>("availability")
        .update_one(
            free_slot_filter(achiever.auth.user_id, &slot_id),
            doc! {
                "$pull": { "specific_slots": { "id": &slot_id } },
                "$set": { "updated_at": DateTime::now() }
            },
            None,
        )
        .await?;

    if result.matched_count == 0 {
        return Err(ApiError::conflict("Slot was booked before it could be removed"));
    }

    Ok(Json(ApiResponse::success_with_message("Slot removed", ())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_slot_filter_requires_the_slot_to_be_unbooked() {
        let achiever = ObjectId::new();
        let filter = free_slot_filter(achiever, "slot-1");

        assert_eq!(filter.get_object_id("achiever_id").unwrap(), achiever);
        let matcher = filter
            .get_document("specific_slots")
            .and_then(|d| d.get_document("$elemMatch"))
            .unwrap();
        assert_eq!(matcher.get_str("id").unwrap(), "slot-1");
        assert!(!matcher.get_bool("is_booked").unwrap());
    }
}
