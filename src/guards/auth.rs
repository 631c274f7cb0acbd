use rocket::request::{self, FromRequest, Request, Outcome};
use rocket::http::Status;
use mongodb::bson::oid::ObjectId;

// === OpenAPI (compatible with rocket_okapi 0.8.0 / 0.8.1) ===
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::r#gen::OpenApiGenerator;

use crate::models::UserRole;
use crate::services::JwtService;

/// JWT-based authentication guard
pub struct AuthGuard {
    pub user_id: ObjectId,
    pub email: String,
    pub role: UserRole,
}

impl AuthGuard {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

fn authenticate(req: &Request<'_>) -> Option<AuthGuard> {
    let header = req.headers().get_one("Authorization")?;
    let token = header.trim_start_matches("Bearer ").trim();

    let claims = JwtService::verify_token(token, false).ok()?;
    let user_id = ObjectId::parse_str(&claims.sub).ok()?;

    Some(AuthGuard {
        user_id,
        email: claims.email,
        role: claims.role,
    })
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match authenticate(req) {
            Some(auth) => Outcome::Success(auth),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

/// Like [`AuthGuard`] but never fails; anonymous callers get `None`.
pub struct MaybeAuth(pub Option<AuthGuard>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for MaybeAuth {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        Outcome::Success(MaybeAuth(authenticate(req)))
    }
}

/// === OpenAPI Integration ===
/// Guards don't contribute any special header/parameter for docs.
impl<'a> OpenApiFromRequest<'a> for AuthGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'a> OpenApiFromRequest<'a> for MaybeAuth {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
