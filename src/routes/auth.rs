use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, DateTime, oid::ObjectId};
use validator::Validate;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{
    SignupDto, LoginDto, User, UserRole, ApprovalStatus, UserResponse,
};
use crate::services::{EmailService, JwtService, WalletService};
use crate::utils::{normalize_email, validate_phone, ApiResponse, ApiError};

const LOGIN_WINDOW_MS: i64 = 15 * 60 * 1000;
const LOGIN_LIMIT: i32 = 5;
const REFRESH_LIMIT: i32 = 10;
const REFRESH_WINDOW_MS: i64 = 60 * 1000;

/// --------------------
/// Rate limiter helper
/// --------------------
async fn rate_limit(
    db: &DbConn,
    key: &str,
    limit: i32,
    window_ms: i64,
) -> Result<(), ApiError> {
    let now = chrono::Utc::now().timestamp_millis();
    let window_expires = DateTime::from_millis(now + window_ms);

    let collection = db.collection::<mongodb::bson::Document>("rate_limits");

    let doc = collection
        .find_one(doc! { "key": key }, None)
        .await
        .map_err(|_| ApiError::internal_error("Rate limiter lookup failed"))?;

    match doc {
        None => {
            collection
                .insert_one(
                    doc! {
                        "key": key,
                        "count": 1,
                        "expires_at": window_expires
                    },
                    None,
                )
                .await
                .map_err(|_| ApiError::internal_error("Rate limiter insert failed"))?;
            Ok(())
        }

        Some(d) => {
            let count = d.get_i32("count").unwrap_or(0);
            let expires_at = d.get_datetime("expires_at").ok();

            // Window expired → reset
            if expires_at.map(|e| *e < DateTime::now()).unwrap_or(true) {
                collection
                    .update_one(
                        doc! { "key": key },
                        doc! {
                            "$set": {
                                "count": 1,
                                "expires_at": window_expires
                            }
                        },
                        None,
                    )
                    .await
                    .map_err(|_| ApiError::internal_error("Rate limiter reset failed"))?;
                return Ok(());
            }

            if count >= limit {
                return Err(ApiError::too_many_requests(
                    "Too many attempts. Please try later.",
                ));
            }

            collection
                .update_one(
                    doc! { "key": key },
                    doc! { "$inc": { "count": 1 } },
                    None,
                )
                .await
                .map_err(|_| ApiError::internal_error("Rate limiter increment failed"))?;

            Ok(())
        }
    }
}

fn issue_tokens(user: &User) -> Result<(String, String), ApiError> {
    let user_id = user.id.ok_or_else(|| ApiError::internal_error("User has no id"))?;
    let access = JwtService::generate_access_token(&user_id, &user.email, user.role)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    let refresh = JwtService::generate_refresh_token(&user_id, &user.email, user.role)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    Ok((access, refresh))
}

/// --------------------
/// Signup
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/signup", data = "<dto>")]
pub async fn signup(
    db: &State<DbConn>,
    dto: Json<SignupDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    if dto.role == UserRole::Admin {
        return Err(ApiError::forbidden("Admin accounts cannot be created through signup"));
    }
    if let Some(ref phone) = dto.phone {
        if !validate_phone(phone) {
            return Err(ApiError::bad_request("Invalid phone number"));
        }
    }
    if dto.role == UserRole::Achiever && dto.exam_category.is_none() {
        return Err(ApiError::bad_request("Achievers must specify an exam category"));
    }

    let email = normalize_email(&dto.email);

    let existing = db
        .collection::<User>("users")
        .find_one(doc! { "email": &email }, None)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let password_hash = bcrypt::hash(&dto.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    // Aspirants are usable immediately; achievers wait for admin review.
    let (approval_status, is_approved) = match dto.role {
        UserRole::Achiever => (ApprovalStatus::Pending, false),
        _ => (ApprovalStatus::Approved, true),
    };

    let now = DateTime::now();
    let mut user = User {
        id: None,
        name: dto.name.trim().to_string(),
        email,
        password_hash,
        phone: dto.phone.clone(),
        role: dto.role,
        approval_status,
        is_approved,
        rejection_reason: None,
        is_active: true,
        exam_category: dto.exam_category.clone(),
        achievement: dto.achievement.clone(),
        hourly_rate: if dto.role == UserRole::Achiever { dto.hourly_rate } else { None },
        bio: None,
        expertise: Vec::new(),
        profile_photo: None,
        last_login_at: Some(now),
        created_at: now,
        updated_at: now,
    };

    let res = db
        .collection::<User>("users")
        .insert_one(&user, None)
        .await
        .map_err(|_| ApiError::conflict("An account with this email already exists"))?;

    let user_id = res
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::internal_error("Invalid user id"))?;
    user.id = Some(user_id);

    WalletService::ensure(db, user_id).await?;

    let (access_token, refresh_token) = issue_tokens(&user)?;

    EmailService::send_welcome(&user.email, &user.name, user.role == UserRole::Achiever);
    info!("New {} signed up: {}", user.role.as_str(), user_id);

    Ok(Json(ApiResponse::success_with_message(
        if is_approved { "Signup successful" } else { "Signup successful. Your profile is pending admin approval." },
        serde_json::json!({
            "user": UserResponse::from(user),
            "accessToken": access_token,
            "refreshToken": refresh_token
        }),
    )))
}

/// --------------------
/// Login
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let email = normalize_email(&dto.email);

    rate_limit(db, &format!("login:{}", email), LOGIN_LIMIT, LOGIN_WINDOW_MS).await?;

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "email": &email }, None)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let valid = bcrypt::verify(&dto.password, &user.password_hash).unwrap_or(false);
    if !valid {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }
    if !user.is_active {
        return Err(ApiError::forbidden("This account has been deactivated"));
    }
    if user.approval_status == ApprovalStatus::Rejected {
        return Err(ApiError::forbidden(format!(
            "Your profile was rejected: {}",
            user.rejection_reason.as_deref().unwrap_or("contact support")
        )));
    }

    db.collection::<User>("users")
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": { "last_login_at": DateTime::now() } },
            None,
        )
        .await
        .ok();

    let (access_token, refresh_token) = issue_tokens(&user)?;

    Ok(Json(ApiResponse::success_with_message(
        "Login successful",
        serde_json::json!({
            "user": UserResponse::from(user),
            "accessToken": access_token,
            "refreshToken": refresh_token
        }),
    )))
}

/// --------------------
/// Silent Refresh Token
/// --------------------
#[derive(serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct RefreshTokenDto {
    pub refresh_token: String,
}

#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<dto>")]
pub async fn refresh_token(
    db: &State<DbConn>,
    dto: Json<RefreshTokenDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let claims = JwtService::verify_token(&dto.refresh_token, true)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    rate_limit(
        db,
        &format!("refresh:{}", claims.sub),
        REFRESH_LIMIT,
        REFRESH_WINDOW_MS,
    ).await?;

    let user_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid user id in token"))?;

    // Role may have changed since the refresh token was issued.
    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": user_id }, None)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("Account not available"))?;

    let access = JwtService::generate_access_token(&user_id, &user.email, user.role)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "accessToken": access
    }))))
}

/// --------------------
/// Current user
/// --------------------
#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(
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
