use chrono::{DateTime, NaiveDate, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::{Row, types::Json};
use uuid::Uuid;

use crate::models::{reward::Reward, task::Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "session_kind")]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Shared by the two members of a partnership.
    #[postgres(name = "couple")]
    Couple,
    /// Hosted by one user, joined by at most one other.
    #[postgres(name = "solo")]
    Solo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "session_mode")]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    #[postgres(name = "online")]
    Online,
    #[postgres(name = "offline")]
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "presence_status")]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[postgres(name = "online")]
    Online,
    #[default]
    #[postgres(name = "offline")]
    Offline,
    #[postgres(name = "focus")]
    Focus,
}

/// Where a solo session stands in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "listing_status")]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    #[postgres(name = "open")]
    Open,
    #[postgres(name = "matched")]
    Matched,
    #[postgres(name = "closed")]
    Closed,
}

/// Who a solo host would like to work with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartnerPrefs {
    pub level: String,
    pub role: Vec<String>,
    pub vibe: Vec<String>,
}

impl Default for PartnerPrefs {
    fn default() -> Self {
        Self {
            level: "Any".to_string(),
            role: Vec::new(),
            vibe: Vec::new(),
        }
    }
}

/// The listing details a solo session carries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoloListing {
    pub description: String,
    pub tech_stack: Vec<String>,
    pub partner_preferences: PartnerPrefs,
    pub status: ListingStatus,
}

impl SoloListing {
    /// Reads the listing columns; couple sessions have none.
    fn from_row(row: &Row) -> Option<Self> {
        let status = row.get::<_, Option<ListingStatus>>("listing_status")?;
        Some(Self {
            description: row.get::<_, Option<String>>("description").unwrap_or_default(),
            tech_stack: row.get::<_, Option<Vec<String>>>("tech_stack").unwrap_or_default(),
            partner_preferences: row
                .get::<_, Option<Json<PartnerPrefs>>>("partner_prefs")
                .map(|Json(prefs)| prefs)
                .unwrap_or_default(),
            status,
        })
    }
}

/// A participant's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
}

impl Participant {
    /// A profile-less participant, used when a user has no profile row yet.
    pub fn anonymous(id: Uuid) -> Self {
        Self {
            id,
            display_name: String::new(),
            avatar_url: None,
            status: PresenceStatus::Offline,
        }
    }
}

impl From<&Row> for Participant {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            display_name: row.get("display_name"),
            avatar_url: row.get("avatar_url"),
            status: row.get("status"),
        }
    }
}

/// A work session row, without its participants' profiles.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: Uuid,
    pub kind: SessionKind,
    pub partnership_id: Option<Uuid>,
    pub host_user_id: Uuid,
    pub partner_user_id: Option<Uuid>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mode: SessionMode,
    pub location: Option<String>,
    pub listing: Option<SoloListing>,
    pub created_at: DateTime<Utc>,
}

impl SessionRow {
    /// The participant ids, fixed when the session was created.
    pub fn participant_ids(&self) -> Vec<Uuid> {
        let mut ids = vec![self.host_user_id];
        ids.extend(self.partner_user_id);
        ids
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.host_user_id == user_id || self.partner_user_id == Some(user_id)
    }
}

impl From<&Row> for SessionRow {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            kind: row.get("kind"),
            partnership_id: row.get("partnership_id"),
            host_user_id: row.get("host_user_id"),
            partner_user_id: row.get("partner_user_id"),
            title: row.get("title"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            mode: row.get("mode"),
            location: row.get("location"),
            listing: SoloListing::from_row(row),
            created_at: row.get("created_at"),
        }
    }
}

/// Session metadata plus its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub kind: SessionKind,
    pub partnership_id: Option<Uuid>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mode: SessionMode,
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<SoloListing>,
    pub participants: Vec<Participant>,
}

impl SessionInfo {
    pub fn from_row(row: SessionRow, participants: Vec<Participant>) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            partnership_id: row.partnership_id,
            title: row.title,
            start_time: row.start_time,
            end_time: row.end_time,
            mode: row.mode,
            location: row.location,
            listing: row.listing,
            participants,
        }
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    /// The single other participant, when there is exactly one.
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        let mut others = self.participants.iter().filter(|p| p.id != user_id);
        match (others.next(), others.next()) {
            (Some(other), None) => Some(other.id),
            _ => None,
        }
    }
}

/// The full state of one session: metadata, tasks and rewards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session: SessionInfo,
    pub tasks: Vec<Task>,
    pub rewards: Vec<Reward>,
}

/// Fields of a session create call.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub kind: SessionKind,
    pub partnership_id: Option<Uuid>,
    pub host_user_id: Uuid,
    pub partner_user_id: Option<Uuid>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mode: SessionMode,
    pub location: Option<String>,
    /// Set for solo sessions only.
    pub listing: Option<SoloListing>,
}

/// Filters for listing the caller's sessions. `None` matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub kind: Option<SessionKind>,
    pub mode: Option<SessionMode>,
    pub status: Option<ListingStatus>,
    pub date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_prefs_fill_missing_fields() {
        let prefs: PartnerPrefs = sonic_rs::from_str(r#"{"role":["backend"]}"#).unwrap();
        assert_eq!(prefs.level, "Any");
        assert_eq!(prefs.role, vec!["backend".to_string()]);
        assert!(prefs.vibe.is_empty());
    }

    #[test]
    fn listing_is_omitted_for_couple_sessions() {
        let now = Utc::now();
        let mut info = SessionInfo {
            id: Uuid::nil(),
            kind: SessionKind::Couple,
            partnership_id: Some(Uuid::nil()),
            title: "Pairing".to_string(),
            start_time: now,
            end_time: now,
            mode: SessionMode::Online,
            location: None,
            listing: None,
            participants: Vec::new(),
        };
        let json = sonic_rs::to_string(&info).unwrap();
        assert!(!json.contains("listing"));

        info.kind = SessionKind::Solo;
        info.listing = Some(SoloListing {
            tech_stack: vec!["rust".to_string()],
            ..SoloListing::default()
        });
        let json = sonic_rs::to_string(&info).unwrap();
        assert!(json.contains(r#""techStack":["rust"]"#));
        assert!(json.contains(r#""status":"open""#));
        assert!(json.contains(r#""partnerPreferences":{"level":"Any""#));
    }
}
