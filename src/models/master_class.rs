use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::iso;
use crate::services::billing::to_rupees;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MasterClassStatus {
    Scheduled,
    Cancelled,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MasterClass {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub host_id: ObjectId,
    pub host_name: String,
    pub title: String,
    pub description: String,
    pub exam_category: Option<String>,
    pub scheduled_at: DateTime,
    pub duration_minutes: i32,
    /// Paise.
    pub price: i64,
    pub max_participants: i32,
    #[serde(default)]
    pub participants: Vec<ObjectId>,
    pub participant_count: i32,
    /// Participants already refunded after a cancellation.
    #[serde(default)]
    pub refunded: Vec<ObjectId>,
    pub status: MasterClassStatus,
    pub meeting_room: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl MasterClass {
    pub fn seats_left(&self) -> i32 {
        (self.max_participants - self.participant_count).max(0)
    }

    /// Participants still owed a refund for a cancelled class.
    pub fn pending_refunds(&self) -> Vec<ObjectId> {
        self.participants
            .iter()
            .filter(|p| !self.refunded.contains(p))
            .copied()
            .collect()
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateMasterClassDto {
    #[validate(length(min = 3, max = 120, message = "Title must be 3-120 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: String,
    pub exam_category: Option<String>,
    /// RFC 3339 timestamp.
    pub scheduled_at: String,
    #[validate(range(min = 30, max = 240, message = "Duration must be 30-240 minutes"))]
    pub duration_minutes: i32,
    #[validate(range(min = 0.0, max = 100000.0, message = "Price out of range"))]
    pub price: f64,
    pub max_participants: Option<i32>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct MasterClassResponse {
    pub id: String,
    pub host_id: String,
    pub host_name: String,
    pub title: String,
    pub description: String,
    pub exam_category: Option<String>,
    pub scheduled_at: String,
    pub duration_minutes: i32,
    pub price: f64,
    pub max_participants: i32,
    pub seats_left: i32,
    pub status: MasterClassStatus,
    /// Only visible to the host and enrolled participants.
    pub meeting_room: Option<String>,
    pub is_enrolled: bool,
}

impl MasterClassResponse {
    pub fn for_viewer(class: MasterClass, viewer: Option<&ObjectId>) -> Self {
        let is_host = viewer.map(|v| v == &class.host_id).unwrap_or(false);
        let is_enrolled = viewer.map(|v| class.participants.contains(v)).unwrap_or(false);
        let seats_left = class.seats_left();
        MasterClassResponse {
            id: class.id.map(|id| id.to_hex()).unwrap_or_default(),
            host_id: class.host_id.to_hex(),
            host_name: class.host_name,
            title: class.title,
            description: class.description,
            exam_category: class.exam_category,
            scheduled_at: iso(&class.scheduled_at),
            duration_minutes: class.duration_minutes,
            price: to_rupees(class.price),
            max_participants: class.max_participants,
            seats_left,
            status: class.status,
            meeting_room: if is_host || is_enrolled { Some(class.meeting_room) } else { None },
            is_enrolled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(max: i32, participants: Vec<ObjectId>) -> MasterClass {
        MasterClass {
            id: Some(ObjectId::new()),
            host_id: ObjectId::new(),
            host_name: "Anu".into(),
            title: "Essay writing".into(),
            description: String::new(),
            exam_category: None,
            scheduled_at: DateTime::now(),
            duration_minutes: 60,
            price: 19_900,
            max_participants: max,
            participant_count: participants.len() as i32,
            participants,
            refunded: Vec::new(),
            status: MasterClassStatus::Scheduled,
            meeting_room: "room-1".into(),
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn seats_never_negative() {
        assert_eq!(class(5, vec![ObjectId::new()]).seats_left(), 4);
        let mut full = class(1, vec![ObjectId::new()]);
        full.participant_count = 3;
        assert_eq!(full.seats_left(), 0);
    }

    #[test]
    fn refunded_participants_are_not_owed_again() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let mut c = class(5, vec![a, b]);
        assert_eq!(c.pending_refunds(), vec![a, b]);
        c.refunded.push(a);
        assert_eq!(c.pending_refunds(), vec![b]);
        c.refunded.push(b);
        assert!(c.pending_refunds().is_empty());
    }

    #[test]
    fn price_is_shown_in_rupees() {
        let c = class(5, Vec::new());
        assert_eq!(MasterClassResponse::for_viewer(c, None).price, 199.0);
    }

    #[test]
    fn meeting_room_hidden_from_outsiders() {
        let member = ObjectId::new();
        let c = class(5, vec![member]);
        let host = c.host_id;

        assert_eq!(MasterClassResponse::for_viewer(c.clone(), Some(&member)).meeting_room.as_deref(), Some("room-1"));
        assert!(MasterClassResponse::for_viewer(c.clone(), Some(&host)).meeting_room.is_some());
        assert!(MasterClassResponse::for_viewer(c.clone(), Some(&ObjectId::new())).meeting_room.is_none());
        assert!(MasterClassResponse::for_viewer(c, None).meeting_room.is_none());
    }
}
