use rocket::figment::{Figment, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;

pub struct Config;

impl Config {
    fn figment() -> Figment {
        // Get the current profile
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(&profile)
            .merge(Env::prefixed("ROCKET_").split("_"))
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret".to_string())
    }

    pub fn jwt_refresh_secret() -> String {
        Self::figment()
            .extract_inner("jwt_refresh_secret")
            .unwrap_or_else(|_| "default-refresh-secret".to_string())
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(900)
    }

    pub fn jwt_refresh_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_refresh_expiry")
            .unwrap_or(604800)
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn database_name() -> String {
        Self::figment()
            .extract_inner("database_name")
            .unwrap_or_else(|_| "aspire-bridge".to_string())
    }

    pub fn mail_host() -> String {
        Self::figment()
            .extract_inner("mail_host")
            .unwrap_or_else(|_| "smtp.gmail.com".to_string())
    }

    pub fn mail_user() -> String {
        Self::figment()
            .extract_inner("mail_user")
            .unwrap_or_default()
    }

    pub fn mail_password() -> String {
        Self::figment()
            .extract_inner("mail_password")
            .unwrap_or_default()
    }

    pub fn mail_from() -> String {
        Self::figment()
            .extract_inner("mail_from")
            .unwrap_or_else(|_| "AspireBridge <noreply@aspirebridge.in>".to_string())
    }

    pub fn frontend_url() -> String {
        Self::figment()
            .extract_inner("frontend_url")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
    }

    pub fn razorpay_key_id() -> Option<String> {
        Self::figment()
            .extract_inner("razorpay_key_id")
            .ok()
    }

    pub fn razorpay_key_secret() -> Option<String> {
        Self::figment()
            .extract_inner("razorpay_key_secret")
            .ok()
    }

    pub fn is_razorpay_enabled() -> bool {
        Self::razorpay_key_id().is_some()
            && Self::razorpay_key_secret().is_some()
    }

    /// Commission kept by the platform on session and master class payouts.
    pub fn platform_fee_percent() -> f64 {
        Self::figment()
            .extract_inner("platform_fee_percent")
            .unwrap_or(10.0)
    }

    pub fn withdrawal_fee_percent() -> f64 {
        Self::figment()
            .extract_inner("withdrawal_fee_percent")
            .unwrap_or(2.0)
    }

    pub fn min_withdrawal_amount() -> f64 {
        Self::figment()
            .extract_inner("min_withdrawal_amount")
            .unwrap_or(100.0)
    }

    pub fn master_class_capacity() -> i32 {
        Self::figment()
            .extract_inner("master_class_capacity")
            .unwrap_or(5)
    }
}
