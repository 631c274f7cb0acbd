pub mod admin;
pub mod auth;
pub mod availability;
pub mod booking;
pub mod follow;
pub mod maintenance;
pub mod master_class;
pub mod mentor_post;
pub mod resource;
pub mod session;
pub mod user;
pub mod wallet;
