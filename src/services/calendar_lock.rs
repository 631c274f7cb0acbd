use log::warn;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::db::{is_duplicate_key, DbConn};
use crate::utils::ApiError;

/// Claims older than this belong to a request that died mid-booking.
const LOCK_TTL_MS: i64 = 30_000;

#[derive(Debug, Serialize, Deserialize)]
struct LockDoc {
    #[serde(rename = "_id")]
    key: String,
    token: String,
    expires_at: DateTime,
}

pub fn lock_key(user_id: &ObjectId, date: &str) -> String {
    format!("{}:{}", user_id.to_hex(), date)
}

/// Claims needed to book `date` for all of `users`, in a fixed order.
pub fn lock_keys(users: &[ObjectId], date: &str) -> Vec<String> {
    let mut keys: Vec<String> = users.iter().map(|u| lock_key(u, date)).collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Per-user, per-date claim held while a booking is checked and written, so
/// two requests cannot both pass the overlap check for the same calendar day.
pub struct CalendarLock {
    keys: Vec<String>,
    token: String,
}

impl CalendarLock {
    pub async fn acquire(db: &DbConn, users: &[ObjectId], date: &str) -> Result<Self, ApiError> {
        let keys = lock_keys(users, date);
        let mut lock = CalendarLock {
            keys: Vec::with_capacity(keys.len()),
            token: uuid::Uuid::new_v4().to_string(),
        };

        for key in keys {
            if let Err(e) = lock.claim(db, &key).await {
                lock.release(db).await;
                return Err(e);
            }
            lock.keys.push(key);
        }
        Ok(lock)
    }

    async fn claim(&self, db: &DbConn, key: &str) -> Result<(), ApiError> {
        let locks = db.collection::<LockDoc>("calendar_locks");

        locks
            .delete_one(doc! { "_id": key, "expires_at": { "$lt": DateTime::now() } }, None)
            .await?;

        let entry = LockDoc {
            key: key.to_string(),
            token: self.token.clone(),
            expires_at: DateTime::from_millis(DateTime::now().timestamp_millis() + LOCK_TTL_MS),
        };
        match locks.insert_one(&entry, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(ApiError::conflict(
                "Another booking for this time is being processed, please retry",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Drops only the claims this lock still owns.
    pub async fn release(self, db: &DbConn) {
        if self.keys.is_empty() {
            return;
        }
        let res = db
            .collection::<LockDoc>("calendar_locks")
            .delete_many(doc! { "_id": { "$in": self.keys.clone() }, "token": &self.token }, None)
            .await;
        if let Err(e) = res {
            warn!("Failed to release calendar lock {:?}: {}", self.keys, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_per_user_and_date() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_eq!(lock_key(&a, "2026-06-01"), format!("{}:2026-06-01", a.to_hex()));
        assert_ne!(lock_key(&a, "2026-06-01"), lock_key(&a, "2026-06-02"));
        assert_ne!(lock_key(&a, "2026-06-01"), lock_key(&b, "2026-06-01"));
    }

    #[test]
    fn both_parties_are_claimed_in_a_stable_order() {
        let achiever = ObjectId::new();
        let aspirant = ObjectId::new();

        let forward = lock_keys(&[achiever, aspirant], "2026-06-01");
        let reverse = lock_keys(&[aspirant, achiever], "2026-06-01");
        assert_eq!(forward.len(), 2);
        assert_eq!(forward, reverse);
        assert!(forward.contains(&lock_key(&achiever, "2026-06-01")));

        // Two aspirants booking the same achiever contend on the achiever's key.
        let other = lock_keys(&[achiever, ObjectId::new()], "2026-06-01");
        assert!(other.contains(&lock_key(&achiever, "2026-06-01")));

        assert_eq!(lock_keys(&[achiever, achiever], "2026-06-01").len(), 1);
    }
}
