use rocket::request::{self, Request, FromRequest, Outcome};
use rocket::http::Status;
use rocket::State;
use log::warn;
use mongodb::bson::doc;
use rocket_okapi::request::OpenApiFromRequest;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::RequestHeaderInput;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{User, UserRole};

/// Loads the caller's user record behind a valid token. Deactivated users are refused.
async fn load_user(req: &Request<'_>) -> Outcome<(AuthGuard, User), ()> {
    let auth = match req.guard::<AuthGuard>().await {
        Outcome::Success(auth) => auth,
        Outcome::Error(e) => return Outcome::Error(e),
        Outcome::Forward(f) => return Outcome::Forward(f),
    };

    let db = match req.guard::<&State<DbConn>>().await {
        Outcome::Success(db) => db,
        _ => return Outcome::Error((Status::ServiceUnavailable, ())),
    };

    match db
        .collection::<User>("users")
        .find_one(doc! { "_id": &auth.user_id }, None)
        .await
    {
        Ok(Some(user)) if user.is_active => Outcome::Success((auth, user)),
        Ok(Some(_)) => {
            warn!("Role guard rejected - account {} is deactivated", auth.user_id);
            Outcome::Error((Status::Forbidden, ()))
        }
        Ok(None) => {
            warn!("Role guard rejected - user {} not found", auth.user_id);
            Outcome::Error((Status::Unauthorized, ()))
        }
        Err(e) => {
            warn!("Role guard rejected - DB error: {:?}", e);
            Outcome::Error((Status::InternalServerError, ()))
        }
    }
}

/// Approved, active achiever.
pub struct AchieverGuard {
    pub auth: AuthGuard,
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AchieverGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match load_user(req).await {
            Outcome::Success((auth, user)) => {
                if user.role == UserRole::Achiever && user.is_approved {
                    Outcome::Success(AchieverGuard { auth, user })
                } else {
                    warn!("Achiever guard rejected - role {:?}, approved {}", user.role, user.is_approved);
                    Outcome::Error((Status::Forbidden, ()))
                }
            }
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}

pub struct AdminGuard {
    pub auth: AuthGuard,
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match load_user(req).await {
            Outcome::Success((auth, user)) => {
                if user.role == UserRole::Admin {
                    Outcome::Success(AdminGuard { auth, user })
                } else {
                    Outcome::Error((Status::Forbidden, ()))
                }
            }
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AchieverGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
