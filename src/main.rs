#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod utils;

use dotenvy::dotenv;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::serde::json::Json;
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

use utils::ApiResponse;

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

fn error_body(message: &str) -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::error(message.to_string()))
}

#[catch(400)]
fn bad_request() -> Json<ApiResponse<()>> {
    error_body("Malformed request")
}

#[catch(401)]
fn unauthorized() -> Json<ApiResponse<()>> {
    error_body("Authentication required")
}

#[catch(403)]
fn forbidden() -> Json<ApiResponse<()>> {
    error_body("You do not have access to this resource")
}

#[catch(404)]
fn not_found() -> Json<ApiResponse<()>> {
    error_body("Resource not found (check /api prefix)")
}

#[catch(422)]
fn unprocessable() -> Json<ApiResponse<()>> {
    error_body("Request body could not be parsed")
}

#[catch(500)]
fn internal_error() -> Json<ApiResponse<()>> {
    error_body("Internal server error")
}

#[catch(503)]
fn unavailable() -> Json<ApiResponse<()>> {
    error_body("Service unavailable, database not connected")
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- LAUNCH ----------------------------- */

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    info!("AspireBridge API starting, Swagger UI at /api/docs");
    if !config::Config::is_razorpay_enabled() {
        warn!("Razorpay keys missing; wallet top-ups are disabled");
    }

    rocket::build()
        .attach(db::init())
        .attach(CORS)
        .mount("/", routes![options_handler])
        .mount(
            "/api",
            openapi_get_routes![
                // Auth
                routes::auth::signup,
                routes::auth::login,
                routes::auth::refresh_token,
                routes::auth::me,
                // Users
                routes::user::get_profile,
                routes::user::update_profile,
                routes::user::list_achievers,
                routes::user::get_user_by_id,
                // Bookings
                routes::booking::create_booking,
                routes::booking::get_my_bookings,
                routes::booking::get_booking,
                routes::booking::update_booking_status,
                // Sessions
                routes::session::open_session,
                routes::session::get_session,
                routes::session::complete_session,
                // Wallet
                routes::wallet::get_my_wallet,
                routes::wallet::get_user_wallet,
                routes::wallet::create_topup_order,
                routes::wallet::verify_topup,
                routes::wallet::get_topup_status,
                routes::wallet::update_bank_details,
                routes::wallet::request_withdrawal,
                routes::wallet::get_my_withdrawals,
                // Availability
                routes::availability::get_availability,
                routes::availability::update_weekly_slots,
                routes::availability::add_specific_slot,
                routes::availability::delete_specific_slot,
                // Follow
                routes::follow::follow,
                routes::follow::unfollow,
                routes::follow::get_following,
                routes::follow::get_followers,
                // Mentor posts
                routes::mentor_post::create_post,
                routes::mentor_post::get_feed,
                routes::mentor_post::toggle_like,
                routes::mentor_post::add_comment,
                routes::mentor_post::delete_post,
                // Master classes
                routes::master_class::create_master_class,
                routes::master_class::list_master_classes,
                routes::master_class::get_master_class,
                routes::master_class::join_master_class,
                routes::master_class::cancel_master_class,
                // Resources
                routes::resource::create_resource,
                routes::resource::list_resources,
                routes::resource::delete_resource,
                // Admin
                routes::admin::list_users,
                routes::admin::set_approval,
                routes::admin::set_active,
                routes::admin::list_bookings,
                routes::admin::list_withdrawals,
                routes::admin::process_withdrawal,
                routes::admin::get_stats,
                // Admin maintenance
                routes::maintenance::audit_booking_records,
                routes::maintenance::reconcile_wallets,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error,
                unavailable
            ],
        )
}
