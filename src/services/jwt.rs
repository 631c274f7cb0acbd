use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;

use crate::models::UserRole;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtService;

impl JwtService {
    fn issue(
        user_id: &ObjectId,
        email: &str,
        role: UserRole,
        expiry: i64,
        secret: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: user_id.to_hex(),
            email: email.to_string(),
            role,
            exp: now + expiry,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    pub fn generate_access_token(user_id: &ObjectId, email: &str, role: UserRole) -> Result<String, jsonwebtoken::errors::Error> {
        Self::issue(
            user_id,
            email,
            role,
            crate::config::Config::jwt_expiry(),
            &crate::config::Config::jwt_secret(),
        )
    }

    pub fn generate_refresh_token(user_id: &ObjectId, email: &str, role: UserRole) -> Result<String, jsonwebtoken::errors::Error> {
        Self::issue(
            user_id,
            email,
            role,
            crate::config::Config::jwt_refresh_expiry(),
            &crate::config::Config::jwt_refresh_secret(),
        )
    }

    pub fn verify_token(token: &str, is_refresh: bool) -> Result<Claims, jsonwebtoken::errors::Error> {
        let secret = if is_refresh {
            crate::config::Config::jwt_refresh_secret()
        } else {
            crate::config::Config::jwt_secret()
        };

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trip() {
        let id = ObjectId::new();
        let token = JwtService::generate_access_token(&id, "a@b.in", UserRole::Achiever).unwrap();
        let claims = JwtService::verify_token(&token, false).unwrap();
        assert_eq!(claims.sub, id.to_hex());
        assert_eq!(claims.role, UserRole::Achiever);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let id = ObjectId::new();
        let refresh = JwtService::generate_refresh_token(&id, "a@b.in", UserRole::Aspirant).unwrap();
        assert!(JwtService::verify_token(&refresh, true).is_ok());
        assert!(JwtService::verify_token(&refresh, false).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = JwtService::generate_access_token(&ObjectId::new(), "a@b.in", UserRole::Admin).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(JwtService::verify_token(&tampered, false).is_err());
    }
}
