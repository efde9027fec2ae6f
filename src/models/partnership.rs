use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "partnership_status")]
#[serde(rename_all = "lowercase")]
pub enum PartnershipStatus {
    #[postgres(name = "active")]
    Active,
    #[postgres(name = "inactive")]
    Inactive,
}

/// A durable pairing of two users.
///
/// Partnerships are never hard-deleted; deactivation flips `status` so
/// past sessions keep pointing at a real row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partnership {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub status: PartnershipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Partnership {
    pub fn is_active(&self) -> bool {
        self.status == PartnershipStatus::Active
    }

    pub fn includes(&self, user_id: Uuid) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// Returns the other member of the pair, if `user_id` is a member.
    pub fn partner_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

impl From<&Row> for Partnership {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            user1_id: row.get("user1_id"),
            user2_id: row.get("user2_id"),
            status: row.get("status"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}
