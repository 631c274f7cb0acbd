use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::{FindOptions, UpdateOptions};
use rocket::futures::TryStreamExt;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{AchieverCard, Follow, User, UserRole};
use crate::utils::{ApiError, ApiResponse};

fn parse_achiever_id(raw: &str, auth: &AuthGuard) -> Result<ObjectId, ApiError> {
    let achiever_id = ObjectId::parse_str(raw)
        .map_err(|_| ApiError::bad_request("Invalid achiever ID"))?;
    if achiever_id == auth.user_id {
        return Err(ApiError::bad_request("You cannot follow yourself"));
    }
    Ok(achiever_id)
}

#[openapi(tag = "Follow")]
#[post("/follow/<achiever_id>")]
pub async fn follow(
    db: &State<DbConn>,
    auth: AuthGuard,
    achiever_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if auth.role == UserRole::Admin {
        return Err(ApiError::forbidden("Admins cannot follow achievers"));
    }
    let achiever_id = parse_achiever_id(&achiever_id, &auth)?;

    db.collection::<User>("users")
        .find_one(doc! { "_id": achiever_id }, None)
        .await?
        .filter(User::is_bookable)
        .ok_or_else(|| ApiError::not_found("Achiever not found"))?;

    // Upsert keeps repeat follows a no-op.
    db.collection::<Follow>("follows")
        .update_one(
            doc! { "follower_id": auth.user_id, "achiever_id": achiever_id },
            doc! { "$setOnInsert": { "created_at": DateTime::now() } },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;

    let followers = db
        .collection::<Follow>("follows")
        .count_documents(doc! { "achiever_id": achiever_id }, None)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Following",
        serde_json::json!({ "achiever_id": achiever_id.to_hex(), "followers": followers }),
    )))
}

#[openapi(tag = "Follow")]
#[delete("/follow/<achiever_id>")]
pub async fn unfollow(
    db: &State<DbConn>,
    auth: AuthGuard,
    achiever_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let achiever_id = parse_achiever_id(&achiever_id, &auth)?;

    db.collection::<Follow>("follows")
        .delete_one(doc! { "follower_id": auth.user_id, "achiever_id": achiever_id }, None)
        .await?;

    let followers = db
        .collection::<Follow>("follows")
        .count_documents(doc! { "achiever_id": achiever_id }, None)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Unfollowed",
        serde_json::json!({ "achiever_id": achiever_id.to_hex(), "followers": followers }),
    )))
}

/// Achiever ids `user_id` follows, newest first.
pub(crate) async fn followed_ids(db: &DbConn, user_id: ObjectId) -> Result<Vec<ObjectId>, ApiError> {
    let follows: Vec<Follow> = db
        .collection::<Follow>("follows")
        .find(
            doc! { "follower_id": user_id },
            FindOptions::builder().sort(doc! { "created_at": -1 }).build(),
        )
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    Ok(follows.into_iter().map(|f| f.achiever_id).collect())
}

#[openapi(tag = "Follow")]
#[get("/follow/following")]
pub async fn get_following(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<Vec<AchieverCard>>>, ApiError> {
    let ids = followed_ids(db, auth.user_id).await?;

    let achievers: Vec<User> = db
        .collection::<User>("users")
        .find(doc! { "_id": { "$in": ids }, "is_active": true }, None)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    Ok(Json(ApiResponse::success(
        achievers.into_iter().map(AchieverCard::from).collect(),
    )))
}

#[openapi(tag = "Follow")]
#[get("/follow/followers/<user_id>")]
pub async fn get_followers(
    db: &State<DbConn>,
    _auth: AuthGuard,
    user_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let achiever_id = ObjectId::parse_str(&user_id)
        .map_err(|_| ApiError::bad_request("Invalid user ID"))?;

    let follows: Vec<Follow> = db
        .collection::<Follow>("follows")
        .find(doc! { "achiever_id": achiever_id }, None)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;
    let ids: Vec<ObjectId> = follows.iter().map(|f| f.follower_id).collect();

    let users: Vec<User> = db
        .collection::<User>("users")
        .find(doc! { "_id": { "$in": ids } }, None)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    let followers: Vec<serde_json::Value> = users
        .into_iter()
        .map(|u| {
            serde_json::json!({
                "id": u.id.map(|id| id.to_hex()),
                "name": u.name,
                "role": u.role,
                "profile_photo": u.profile_photo,
            })
        })
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "count": followers.len(),
        "followers": followers,
    }))))
}
