use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated caller, as issued by the external auth provider.
///
/// Stored in Redis under `session:{token}`. Only the identity and the
/// validity window are read here; issuing and revoking tokens happens
/// outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// The ID of the user this token belongs to.
    pub user_id: Uuid,
    /// The timestamp when the token was issued.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the token expires.
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
