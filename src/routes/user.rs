use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document, Regex as BsonRegex};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use validator::Validate;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{AchieverCard, Follow, UpdateProfileDto, User, UserResponse, UserRole};
use crate::utils::{validate_phone, ApiError, ApiResponse, Page};

#[openapi(tag = "User")]
#[get("/users/me")]
pub async fn get_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}

#[openapi(tag = "User")]
#[put("/users/me", data = "<dto>")]
pub async fn update_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<UpdateProfileDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    dto.validate()?;

    let mut update_doc = doc! { "updated_at": DateTime::now() };

    if let Some(ref name) = dto.name {
        update_doc.insert("name", name.trim());
    }
    if let Some(ref phone) = dto.phone {
        if !validate_phone(phone) {
            return Err(ApiError::bad_request("Invalid phone number"));
        }
        update_doc.insert("phone", phone);
    }
    if let Some(ref bio) = dto.bio {
        update_doc.insert("bio", bio);
    }
    if let Some(ref exam_category) = dto.exam_category {
        update_doc.insert("exam_category", exam_category);
    }
    if let Some(ref photo) = dto.profile_photo {
        update_doc.insert("profile_photo", photo);
    }

    // Mentor-only fields
    let achiever_fields = dto.hourly_rate.is_some() || dto.achievement.is_some() || dto.expertise.is_some();
    if achiever_fields && auth.role != UserRole::Achiever {
        return Err(ApiError::forbidden("Only achievers can set rate, achievement or expertise"));
    }
    if let Some(rate) = dto.hourly_rate {
        update_doc.insert("hourly_rate", rate);
    }
    if let Some(ref achievement) = dto.achievement {
        update_doc.insert("achievement", achievement);
    }
    if let Some(ref expertise) = dto.expertise {
        let cleaned: Vec<String> = expertise
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        update_doc.insert("expertise", cleaned);
    }

    let users = db.collection::<User>("users");
    users
        .update_one(doc! { "_id": auth.user_id }, doc! { "$set": update_doc }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update profile: {}", e)))?;

    let user = users
        .find_one(doc! { "_id": auth.user_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully",
        UserResponse::from(user),
    )))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct AchieverQuery {
    pub exam_category: Option<String>,
    pub search: Option<String>,
    pub min_rate: Option<f64>,
    pub max_rate: Option<f64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn achiever_filter(query: &AchieverQuery) -> Document {
    let mut filter = doc! {
        "role": UserRole::Achiever.as_str(),
        "is_approved": true,
        "is_active": true,
    };

    if let Some(ref category) = query.exam_category {
        filter.insert("exam_category", category);
    }

    let mut rate = Document::new();
    if let Some(min) = query.min_rate {
        rate.insert("$gte", min);
    }
    if let Some(max) = query.max_rate {
        rate.insert("$lte", max);
    }
    if !rate.is_empty() {
        filter.insert("hourly_rate", rate);
    }

    if let Some(ref search) = query.search {
        let term = search.trim();
        if !term.is_empty() {
            let pattern = BsonRegex {
                pattern: regex::escape(term),
                options: "i".to_string(),
            };
            filter.insert(
                "$or",
                vec![
                    doc! { "name": pattern.clone() },
                    doc! { "achievement": pattern.clone() },
                    doc! { "expertise": pattern },
                ],
            );
        }
    }

    filter
}

#[openapi(tag = "User")]
#[get("/users/achievers?<query..>")]
pub async fn list_achievers(
    db: &State<DbConn>,
    query: AchieverQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit);
    let filter = achiever_filter(&query);

    let find_options = FindOptions::builder()
        .skip(page.skip())
        .limit(page.limit)
        .sort(doc! { "created_at": -1 })
        .build();

    let achievers: Vec<User> = db
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

    let cards: Vec<AchieverCard> = achievers.into_iter().map(AchieverCard::from).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "achievers": cards,
        "pagination": page.meta(total),
    }))))
}

#[openapi(tag = "User")]
#[get("/users/<user_id>")]
pub async fn get_user_by_id(
    db: &State<DbConn>,
    user_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&user_id)
        .map_err(|_| ApiError::bad_request("Invalid user ID"))?;

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": object_id, "is_active": true }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.role == UserRole::Achiever && !user.is_approved {
        return Err(ApiError::not_found("User not found"));
    }

    let followers = db
        .collection::<Follow>("follows")
        .count_documents(doc! { "achiever_id": object_id }, None)
        .await?;

    let role = user.role;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "profile": AchieverCard::from(user),
        "role": role,
        "followers": followers,
    }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> AchieverQuery {
        AchieverQuery {
            exam_category: None,
            search: None,
            min_rate: None,
            max_rate: None,
            page: None,
            limit: None,
        }
    }

    #[test]
    fn base_filter_only_lists_approved_active_achievers() {
        let filter = achiever_filter(&query());
        assert_eq!(filter.get_str("role").unwrap(), "achiever");
        assert!(filter.get_bool("is_approved").unwrap());
        assert!(!filter.contains_key("hourly_rate"));
        assert!(!filter.contains_key("$or"));
    }

    #[test]
    fn rate_bounds_and_search_are_applied() {
        let mut q = query();
        q.min_rate = Some(200.0);
        q.max_rate = Some(800.0);
        q.search = Some("a.i.r (1)".into());
        let filter = achiever_filter(&q);

        let rate = filter.get_document("hourly_rate").unwrap();
        assert_eq!(rate.get_f64("$gte").unwrap(), 200.0);
        assert_eq!(rate.get_f64("$lte").unwrap(), 800.0);
        assert_eq!(filter.get_array("$or").unwrap().len(), 3);
    }

    #[test]
    fn blank_search_is_ignored() {
        let mut q = query();
        q.search = Some("   ".into());
        assert!(!achiever_filter(&q).contains_key("$or"));
    }
}
