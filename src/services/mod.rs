pub mod billing;
pub mod calendar_lock;
pub mod email;
pub mod jwt;
pub mod razorpay;
pub mod wallet;

pub use calendar_lock::CalendarLock;
pub use razorpay::RazorpayService;
pub use email::EmailService;
pub use jwt::JwtService;
pub use wallet::WalletService;
