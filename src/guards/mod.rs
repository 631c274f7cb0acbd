pub mod auth;
pub mod role;

pub use auth::{AuthGuard, MaybeAuth};
pub use role::{AchieverGuard, AdminGuard};
