//! Change events and their wire form.
//!
//! The feed speaks in backend rows (`{table, eventType, new, old}` with
//! snake_case columns). [`RawChange::decode`] is the one place where
//! those rows become [`Task`] / [`Reward`] values.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    partnership::Partnership,
    reward::{Reward, RewardRow},
    session::SessionInfo,
    task::{Task, TaskRow},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Reward,
}

impl EntityKind {
    /// The backend table carrying this entity.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Reward => "rewards",
        }
    }
}

/// Redis channel carrying one table's changes for one session.
pub fn channel_name(session_id: Uuid, entity: EntityKind) -> String {
    format!("workdate:session:{}:{}", session_id, entity.table())
}

/// Redis channel carrying a partnership's own changes and its new sessions.
pub fn partnership_channel(partnership_id: Uuid) -> String {
    format!("workdate:partnership:{}", partnership_id)
}

/// A change on a partnership's channel: a session scheduled for the pair,
/// or the partnership row itself (created, deactivated).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum PartnershipChange {
    WorkSessions {
        #[serde(rename = "eventType")]
        event_type: ChangeKind,
        new: SessionInfo,
    },
    Partnerships {
        #[serde(rename = "eventType")]
        event_type: ChangeKind,
        new: Partnership,
    },
}

impl PartnershipChange {
    /// The partnership whose channel carries this change, if any.
    pub fn partnership_id(&self) -> Option<Uuid> {
        match self {
            PartnershipChange::WorkSessions { new, .. } => new.partnership_id,
            PartnershipChange::Partnerships { new, .. } => Some(new.id),
        }
    }

    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        sonic_rs::from_str(payload).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, DecodeError> {
        sonic_rs::to_string(self).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}

/// A typed change to one entity. Updates carry the full new row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    Insert(T),
    Update(T),
    Delete(Uuid),
}

impl<T> Change<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Insert(_) => ChangeKind::Insert,
            Change::Update(_) => ChangeKind::Update,
            Change::Delete(_) => ChangeKind::Delete,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Change<U> {
        match self {
            Change::Insert(value) => Change::Insert(f(value)),
            Change::Update(value) => Change::Update(f(value)),
            Change::Delete(id) => Change::Delete(id),
        }
    }
}

/// An event delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Task(Change<Task>),
    Reward(Change<Reward>),
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Task(change) => change.kind(),
            ChangeEvent::Reward(change) => change.kind(),
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            ChangeEvent::Task(_) => EntityKind::Task,
            ChangeEvent::Reward(_) => EntityKind::Reward,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed change payload: {0}")]
    Malformed(String),

    #[error("{kind:?} change on `{table}` without a `{field}` row")]
    MissingRow {
        kind: ChangeKind,
        table: &'static str,
        field: &'static str,
    },
}

/// Primary key of a row; enough to apply a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowKey {
    pub id: Uuid,
}

/// One row-level change as the backend emits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange<R> {
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    pub new: Option<R>,
    pub old: Option<RowKey>,
}

impl<R> RowChange<R> {
    fn decode(self, table: &'static str) -> Result<Change<R>, DecodeError> {
        let missing = |field| DecodeError::MissingRow {
            kind: self.event_type,
            table,
            field,
        };

        match self.event_type {
            ChangeKind::Insert => self.new.map(Change::Insert).ok_or_else(|| missing("new")),
            ChangeKind::Update => self.new.map(Change::Update).ok_or_else(|| missing("new")),
            ChangeKind::Delete => self
                .old
                .map(|key| Change::Delete(key.id))
                .ok_or_else(|| missing("old")),
        }
    }
}

/// A change record on the wire, tagged by table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "lowercase")]
pub enum RawChange {
    Tasks(RowChange<TaskRow>),
    Rewards(RowChange<RewardRow>),
}

impl RawChange {
    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        sonic_rs::from_str(payload).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, DecodeError> {
        sonic_rs::to_string(self).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            RawChange::Tasks(_) => EntityKind::Task,
            RawChange::Rewards(_) => EntityKind::Reward,
        }
    }

    /// Translates backend rows into the canonical model.
    pub fn decode(self) -> Result<ChangeEvent, DecodeError> {
        match self {
            RawChange::Tasks(change) => change
                .decode("tasks")
                .map(|c| ChangeEvent::Task(c.map(Task::from))),
            RawChange::Rewards(change) => change
                .decode("rewards")
                .map(|c| ChangeEvent::Reward(c.map(Reward::from))),
        }
    }

    pub fn task(kind: ChangeKind, row: TaskRow) -> Self {
        let key = RowKey { id: row.id };
        RawChange::Tasks(match kind {
            ChangeKind::Delete => RowChange { event_type: kind, new: None, old: Some(key) },
            _ => RowChange { event_type: kind, new: Some(row), old: Some(key) },
        })
    }

    pub fn reward(kind: ChangeKind, row: RewardRow) -> Self {
        let key = RowKey { id: row.id };
        RawChange::Rewards(match kind {
            ChangeKind::Delete => RowChange { event_type: kind, new: None, old: Some(key) },
            _ => RowChange { event_type: kind, new: Some(row), old: Some(key) },
        })
    }
}
