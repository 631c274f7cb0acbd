use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::iso;
use crate::services::billing::to_rupees;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "rejected" => Some(BookingStatus::Rejected),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Statuses that still occupy the achiever's calendar.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
        )
    }
}

/// Where the booking price currently sits.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Held,
    Released,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Held => "held",
            PaymentStatus::Released => "released",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// The payment status a booking in `status` is expected to carry.
    pub fn expected_for(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Pending | BookingStatus::Confirmed => PaymentStatus::Held,
            BookingStatus::Completed => PaymentStatus::Released,
            BookingStatus::Rejected | BookingStatus::Cancelled => PaymentStatus::Refunded,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub aspirant_id: ObjectId,
    pub achiever_id: ObjectId,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i32,
    pub topic: Option<String>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    /// Paise.
    pub amount: i64,
    pub payment_status: PaymentStatus,
    /// Specific availability slot consumed by this booking, if any.
    pub slot_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<ObjectId>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    pub fn involves(&self, user_id: &ObjectId) -> bool {
        &self.aspirant_id == user_id || &self.achiever_id == user_id
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateBookingDto {
    pub achiever_id: String,
    pub date: String,
    pub start_time: String,
    pub duration_minutes: i32,
    #[validate(length(max = 200, message = "Topic must be at most 200 characters"))]
    pub topic: Option<String>,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateBookingStatusDto {
    pub status: BookingStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BookingResponse {
    pub id: String,
    pub aspirant_id: String,
    pub achiever_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i32,
    pub topic: Option<String>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub amount: f64,
    pub payment_status: PaymentStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        BookingResponse {
            id: b.id.map(|id| id.to_hex()).unwrap_or_default(),
            aspirant_id: b.aspirant_id.to_hex(),
            achiever_id: b.achiever_id.to_hex(),
            date: b.date,
            start_time: b.start_time,
            end_time: b.end_time,
            duration_minutes: b.duration_minutes,
            topic: b.topic,
            notes: b.notes,
            status: b.status,
            amount: to_rupees(b.amount),
            payment_status: b.payment_status,
            cancellation_reason: b.cancellation_reason,
            created_at: iso(&b.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    #[test]
    fn allowed_transitions() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [Rejected, Cancelled, Completed] {
            for next in [Pending, Confirmed, Rejected, Cancelled, Completed] {
                assert!(!terminal.can_transition_to(next), "{:?} -> {:?}", terminal, next);
            }
        }
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Rejected));
    }

    #[test]
    fn status_strings_round_trip_through_serde() {
        for status in [Pending, Confirmed, Rejected, Cancelled, Completed] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("approved"), None);
    }

    #[test]
    fn expected_payment_status() {
        assert_eq!(PaymentStatus::expected_for(Pending), PaymentStatus::Held);
        assert_eq!(PaymentStatus::expected_for(Completed), PaymentStatus::Released);
        assert_eq!(PaymentStatus::expected_for(Rejected), PaymentStatus::Refunded);
    }
}
