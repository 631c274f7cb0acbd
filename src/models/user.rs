use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::iso;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Aspirant,
    Achiever,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Aspirant => "aspirant",
            UserRole::Achiever => "achiever",
            UserRole::Admin => "admin",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub approval_status: ApprovalStatus,
    pub is_approved: bool,
    pub rejection_reason: Option<String>,
    pub is_active: bool,
    pub exam_category: Option<String>,
    /// Achiever's headline result, e.g. "AIR 112, UPSC CSE 2024".
    pub achievement: Option<String>,
    pub hourly_rate: Option<f64>,
    pub bio: Option<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
    pub profile_photo: Option<String>,
    pub last_login_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    /// Achievers only appear in listings and take bookings once approved.
    pub fn is_bookable(&self) -> bool {
        self.role == UserRole::Achiever && self.is_approved && self.is_active
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SignupDto {
    #[validate(length(min = 2, max = 80, message = "Name must be 2-80 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub exam_category: Option<String>,
    pub achievement: Option<String>,
    #[validate(range(min = 0.0, max = 100000.0, message = "Hourly rate out of range"))]
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct LoginDto {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateProfileDto {
    #[validate(length(min = 2, max = 80, message = "Name must be 2-80 characters"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    #[validate(length(max = 1000, message = "Bio must be at most 1000 characters"))]
    pub bio: Option<String>,
    pub exam_category: Option<String>,
    pub achievement: Option<String>,
    #[validate(range(min = 0.0, max = 100000.0, message = "Hourly rate out of range"))]
    pub hourly_rate: Option<f64>,
    pub expertise: Option<Vec<String>>,
    pub profile_photo: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub approval_status: ApprovalStatus,
    pub is_approved: bool,
    pub is_active: bool,
    pub exam_category: Option<String>,
    pub achievement: Option<String>,
    pub hourly_rate: Option<f64>,
    pub bio: Option<String>,
    pub expertise: Vec<String>,
    pub profile_photo: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            approval_status: user.approval_status,
            is_approved: user.is_approved,
            is_active: user.is_active,
            exam_category: user.exam_category,
            achievement: user.achievement,
            hourly_rate: user.hourly_rate,
            bio: user.bio,
            expertise: user.expertise,
            profile_photo: user.profile_photo,
            created_at: iso(&user.created_at),
        }
    }
}

/// Public view of an achiever, without contact details.
#[derive(Debug, Serialize, JsonSchema)]
pub struct AchieverCard {
    pub id: String,
    pub name: String,
    pub exam_category: Option<String>,
    pub achievement: Option<String>,
    pub hourly_rate: Option<f64>,
    pub bio: Option<String>,
    pub expertise: Vec<String>,
    pub profile_photo: Option<String>,
}

impl From<User> for AchieverCard {
    fn from(user: User) -> Self {
        AchieverCard {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            exam_category: user.exam_category,
            achievement: user.achievement,
            hourly_rate: user.hourly_rate,
            bio: user.bio,
            expertise: user.expertise,
            profile_photo: user.profile_photo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn achiever() -> User {
        User {
            id: Some(ObjectId::new()),
            name: "Ravi".into(),
            email: "ravi@example.in".into(),
            password_hash: "x".into(),
            phone: None,
            role: UserRole::Achiever,
            approval_status: ApprovalStatus::Approved,
            is_approved: true,
            rejection_reason: None,
            is_active: true,
            exam_category: Some("UPSC".into()),
            achievement: None,
            hourly_rate: Some(600.0),
            bio: None,
            expertise: vec![],
            profile_photo: None,
            last_login_at: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn only_approved_active_achievers_are_bookable() {
        let mut user = achiever();
        assert!(user.is_bookable());

        user.is_approved = false;
        assert!(!user.is_bookable());

        user.is_approved = true;
        user.is_active = false;
        assert!(!user.is_bookable());

        user.is_active = true;
        user.role = UserRole::Aspirant;
        assert!(!user.is_bookable());
    }

    #[test]
    fn response_never_carries_password_hash() {
        let body = serde_json::to_value(UserResponse::from(achiever())).unwrap();
        assert!(body.get("password_hash").is_none());
        assert_eq!(body["role"], "achiever");
        assert_eq!(body["approval_status"], "approved");
    }

    #[test]
    fn signup_validation() {
        let dto = SignupDto {
            name: "A".into(),
            email: "bad".into(),
            password: "short".into(),
            role: UserRole::Aspirant,
            phone: None,
            exam_category: None,
            achievement: None,
            hourly_rate: None,
        };
        let errors = dto.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }
}
