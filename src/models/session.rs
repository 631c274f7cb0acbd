use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::iso;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Ended,
}

/// Video-call room attached to a confirmed booking.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub booking_id: ObjectId,
    pub aspirant_id: ObjectId,
    pub achiever_id: ObjectId,
    pub room_id: String,
    pub join_code: String,
    pub status: SessionStatus,
    pub started_at: DateTime,
    pub ended_at: Option<DateTime>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SessionResponse {
    pub id: String,
    pub booking_id: String,
    pub room_id: String,
    pub join_code: String,
    pub status: SessionStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        SessionResponse {
            id: s.id.map(|id| id.to_hex()).unwrap_or_default(),
            booking_id: s.booking_id.to_hex(),
            room_id: s.room_id,
            join_code: s.join_code,
            status: s.status,
            started_at: iso(&s.started_at),
            ended_at: s.ended_at.as_ref().map(iso),
        }
    }
}

/// Six-character code shown to both parties for joining the call.
pub fn generate_join_code() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_codes_avoid_ambiguous_characters() {
        for _ in 0..50 {
            let code = generate_join_code();
            assert_eq!(code.len(), 6);
            assert!(!code.contains('0') && !code.contains('O') && !code.contains('1') && !code.contains('I'));
        }
    }
}
