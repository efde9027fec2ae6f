use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// A secret incentive one participant defines for another.
///
/// The description is only ever shown to the receiver; see
/// [`crate::sync::visibility`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: Uuid,
    pub session_id: Uuid,
    pub giver_user_id: Uuid,
    pub receiver_user_id: Uuid,
    pub description: String,
    pub revision: i64,
}

/// A reward row as the backend names it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub giver_user_id: Uuid,
    pub receiver_user_id: Uuid,
    pub description: String,
    #[serde(default)]
    pub revision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Row> for RewardRow {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            session_id: row.get("session_id"),
            giver_user_id: row.get("giver_user_id"),
            receiver_user_id: row.get("receiver_user_id"),
            description: row.get("description"),
            revision: Some(row.get("revision")),
            created_at: Some(row.get("created_at")),
            updated_at: Some(row.get("updated_at")),
        }
    }
}

impl From<RewardRow> for Reward {
    fn from(row: RewardRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            giver_user_id: row.giver_user_id,
            receiver_user_id: row.receiver_user_id,
            description: row.description,
            revision: row.revision.unwrap_or(1),
        }
    }
}

impl From<&Reward> for RewardRow {
    fn from(reward: &Reward) -> Self {
        Self {
            id: reward.id,
            session_id: reward.session_id,
            giver_user_id: reward.giver_user_id,
            receiver_user_id: reward.receiver_user_id,
            description: reward.description.clone(),
            revision: Some(reward.revision),
            created_at: None,
            updated_at: None,
        }
    }
}

/// Fields of a reward create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReward {
    pub id: Uuid,
    pub giver_user_id: Uuid,
    pub receiver_user_id: Uuid,
    pub description: String,
}
