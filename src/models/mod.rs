pub mod user;
pub mod booking;
pub mod session;
pub mod wallet;
pub mod payment;
pub mod withdrawal;
pub mod availability;
pub mod follow;
pub mod mentor_post;
pub mod master_class;
pub mod resource;

pub use user::*;
pub use booking::*;
pub use session::*;
pub use wallet::*;
pub use payment::*;
pub use withdrawal::*;
pub use availability::*;
pub use follow::*;
pub use mentor_post::*;
pub use master_class::*;
pub use resource::*;

use mongodb::bson::DateTime;

/// RFC 3339 rendering of a BSON timestamp for API responses.
pub fn iso(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}
