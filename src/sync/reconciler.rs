//! Merge rules for feed events and local optimistic mutations.
//!
//! A [`Table`] keeps two layers per entity kind:
//!
//! - the *confirmed* rows, changed only by server-originated changes and
//!   ordered by arrival;
//! - a *pending* overlay of local optimistic guesses, each remembering the
//!   confirmed revision it was built on.
//!
//! Confirmed rows follow these rules, which make the merge idempotent and
//! insensitive to reordering:
//!
//! - `Insert` of a known id is a no-op (duplicate delivery).
//! - `Update` replaces the row only when its revision is strictly greater;
//!   an update for an unknown id inserts it.
//! - `Delete` removes the row and leaves a tombstone, so a late insert or
//!   update for the same id is ignored.
//!
//! A pending guess is dropped as soon as the confirmed layer moves past the
//! revision it was based on, or when the mutation is acknowledged or
//! rejected. Server state always wins over a guess.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::models::{reward::Reward, task::Task};
use crate::sync::event::Change;

/// An entity with a stable id and a monotonic revision.
pub trait Versioned: Clone {
    fn id(&self) -> Uuid;
    fn revision(&self) -> i64;
}

impl Versioned for Task {
    fn id(&self) -> Uuid {
        self.id
    }

    fn revision(&self) -> i64 {
        self.revision
    }
}

impl Versioned for Reward {
    fn id(&self) -> Uuid {
        self.id
    }

    fn revision(&self) -> i64 {
        self.revision
    }
}

/// What applying one change did to the confirmed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    Ignored(Skip),
}

impl Applied {
    pub fn changed(self) -> bool {
        !matches!(self, Applied::Ignored(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Insert for an id already present.
    Duplicate,
    /// Update whose revision is not newer than the stored one.
    Stale,
    /// Insert or update for an id that was deleted.
    Tombstoned,
    /// Delete for an id not present.
    Absent,
    /// The entity breaks a session invariant (foreign owner, wrong session, ...).
    Violation,
}

#[derive(Debug, Clone)]
enum Pending<T> {
    Upsert { value: T, base_revision: Option<i64> },
    Remove { base_revision: Option<i64> },
}

impl<T> Pending<T> {
    fn base_revision(&self) -> Option<i64> {
        match self {
            Pending::Upsert { base_revision, .. } | Pending::Remove { base_revision } => {
                *base_revision
            }
        }
    }
}

/// Confirmed rows in arrival order, with an id index and the ids deleted so far.
///
/// Tombstones live as long as the table. A session holds a few dozen rows,
/// so they are never pruned.
#[derive(Debug, Clone)]
pub struct Table<T> {
    rows: Vec<T>,
    index: HashMap<Uuid, usize>,
    tombstones: HashSet<Uuid>,
    pending: Vec<(Uuid, Pending<T>)>,
}

impl<T: Versioned> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
            tombstones: HashSet::new(),
            pending: Vec::new(),
        }
    }
}

impl<T: Versioned> Table<T> {
    pub fn from_rows(rows: Vec<T>) -> Self {
        let mut table = Self::default();
        table.reset(rows);
        table
    }

    /// Applies a server-confirmed change.
    pub fn apply(&mut self, change: Change<T>) -> Applied {
        let id = match &change {
            Change::Insert(value) | Change::Update(value) => value.id(),
            Change::Delete(id) => *id,
        };

        let applied = match change {
            Change::Insert(value) => {
                if self.tombstones.contains(&id) {
                    Applied::Ignored(Skip::Tombstoned)
                } else if self.position(id).is_some() {
                    Applied::Ignored(Skip::Duplicate)
                } else {
                    self.push(value);
                    Applied::Inserted
                }
            }
            Change::Update(value) => {
                if self.tombstones.contains(&id) {
                    Applied::Ignored(Skip::Tombstoned)
                } else {
                    match self.position(id) {
                        Some(pos) if value.revision() > self.rows[pos].revision() => {
                            self.rows[pos] = value;
                            Applied::Replaced
                        }
                        Some(_) => Applied::Ignored(Skip::Stale),
                        None => {
                            self.push(value);
                            Applied::Inserted
                        }
                    }
                }
            }
            Change::Delete(id) => {
                self.tombstones.insert(id);
                match self.position(id) {
                    Some(pos) => {
                        self.rows.remove(pos);
                        self.reindex();
                        Applied::Removed
                    }
                    None => Applied::Ignored(Skip::Absent),
                }
            }
        };

        self.settle(id);
        applied
    }

    /// Records a local optimistic guess on top of the confirmed rows.
    pub fn stage(&mut self, change: Change<T>) {
        let (id, pending) = match change {
            Change::Insert(value) | Change::Update(value) => {
                let id = value.id();
                let base_revision = self.confirmed(id).map(Versioned::revision);
                (id, Pending::Upsert { value, base_revision })
            }
            Change::Delete(id) => {
                let base_revision = self.confirmed(id).map(Versioned::revision);
                (id, Pending::Remove { base_revision })
            }
        };

        match self.pending.iter_mut().find(|(pid, _)| *pid == id) {
            Some(slot) => slot.1 = pending,
            None => self.pending.push((id, pending)),
        }
    }

    /// Acknowledges a local mutation with the server's result.
    ///
    /// `Some(row)` is the authoritative row; `None` means the server no
    /// longer has the entity.
    pub fn confirm(&mut self, id: Uuid, outcome: Option<T>) -> Applied {
        self.pending.retain(|(pid, _)| *pid != id);
        match outcome {
            Some(value) => self.apply(Change::Update(value)),
            None => self.apply(Change::Delete(id)),
        }
    }

    /// Discards a local guess; the confirmed row, if any, shows again.
    pub fn rollback(&mut self, id: Uuid) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pid, _)| *pid != id);
        before != self.pending.len()
    }

    /// Replaces the confirmed rows with a fresh server snapshot.
    ///
    /// Tombstones survive (ids are never reused) except for ids the
    /// snapshot says exist.
    pub fn reset(&mut self, rows: Vec<T>) {
        for row in &rows {
            self.tombstones.remove(&row.id());
        }
        self.rows = rows;
        self.reindex();

        let ids: Vec<Uuid> = self.pending.iter().map(|(id, _)| *id).collect();
        for id in ids {
            self.settle(id);
        }
    }

    /// The confirmed row for `id`, ignoring local guesses.
    pub fn confirmed(&self, id: Uuid) -> Option<&T> {
        self.position(id).map(|pos| &self.rows[pos])
    }

    /// The row for `id` as the local user currently sees it.
    pub fn get(&self, id: Uuid) -> Option<T> {
        match self.pending_for(id) {
            Some(Pending::Upsert { value, .. }) => Some(value.clone()),
            Some(Pending::Remove { .. }) => None,
            None => self.confirmed(id).cloned(),
        }
    }

    pub fn has_pending(&self, id: Uuid) -> bool {
        self.pending_for(id).is_some()
    }

    /// Confirmed rows with the pending overlay applied, in arrival order.
    pub fn view(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.rows.len() + self.pending.len());
        for row in &self.rows {
            match self.pending_for(row.id()) {
                Some(Pending::Upsert { value, .. }) => out.push(value.clone()),
                Some(Pending::Remove { .. }) => {}
                None => out.push(row.clone()),
            }
        }
        for (id, pending) in &self.pending {
            if let Pending::Upsert { value, .. } = pending {
                if self.position(*id).is_none() {
                    out.push(value.clone());
                }
            }
        }
        out
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.index.get(&id).copied()
    }

    fn push(&mut self, value: T) {
        self.index.insert(value.id(), self.rows.len());
        self.rows.push(value);
    }

    fn reindex(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(pos, row)| (row.id(), pos))
            .collect();
    }

    fn pending_for(&self, id: Uuid) -> Option<&Pending<T>> {
        self.pending
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, pending)| pending)
    }

    /// Drops a guess the confirmed layer has moved past.
    fn settle(&mut self, id: Uuid) {
        let Some(pending) = self.pending_for(id) else {
            return;
        };

        let current = self.confirmed(id).map(Versioned::revision);
        let superseded = match (pending.base_revision(), current) {
            (_, None) => self.tombstones.contains(&id),
            (None, Some(_)) => true,
            (Some(base), Some(revision)) => revision > base,
        };

        if superseded {
            self.pending.retain(|(pid, _)| *pid != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::Difficulty;

    fn task(id: Uuid, revision: i64, done: bool) -> Task {
        Task {
            id,
            session_id: Uuid::nil(),
            owner_user_id: Uuid::nil(),
            title: "Write tests".to_string(),
            done,
            difficulty: Difficulty::Medium,
            revision,
        }
    }

    #[test]
    fn duplicate_insert_is_a_no_op() {
        let id = Uuid::new_v4();
        let mut table = Table::default();

        assert_eq!(table.apply(Change::Insert(task(id, 1, false))), Applied::Inserted);
        assert_eq!(
            table.apply(Change::Insert(task(id, 1, false))),
            Applied::Ignored(Skip::Duplicate)
        );
        assert_eq!(table.view().len(), 1);
    }

    #[test]
    fn removal_keeps_lookups_and_order_intact() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut table = Table::from_rows(vec![task(a, 1, false), task(b, 1, false), task(c, 1, false)]);

        assert_eq!(table.apply(Change::Delete(a)), Applied::Removed);
        assert_eq!(table.apply(Change::Update(task(c, 2, true))), Applied::Replaced);
        assert_eq!(table.apply(Change::Insert(task(b, 1, false))), Applied::Ignored(Skip::Duplicate));

        let ids: Vec<Uuid> = table.view().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b, c]);
        assert!(table.confirmed(c).is_some_and(|t| t.done));
        assert!(table.confirmed(a).is_none());
    }

    #[test]
    fn duplicate_delete_is_a_no_op() {
        let id = Uuid::new_v4();
        let mut table = Table::from_rows(vec![task(id, 1, false)]);

        assert_eq!(table.apply(Change::Delete(id)), Applied::Removed);
        assert_eq!(table.apply(Change::Delete(id)), Applied::Ignored(Skip::Absent));
        assert!(table.view().is_empty());
    }

    #[test]
    fn updates_commute_under_revisions() {
        let id = Uuid::new_v4();
        let base = vec![task(id, 1, false)];

        let mut forward = Table::from_rows(base.clone());
        forward.apply(Change::Update(task(id, 3, true)));
        forward.apply(Change::Update(task(id, 2, false)));

        let mut backward = Table::from_rows(base);
        backward.apply(Change::Update(task(id, 2, false)));
        backward.apply(Change::Update(task(id, 3, true)));

        assert_eq!(forward.view(), backward.view());
        assert!(forward.view()[0].done);
    }

    #[test]
    fn equal_revision_update_is_stale() {
        let id = Uuid::new_v4();
        let mut table = Table::from_rows(vec![task(id, 2, false)]);

        assert_eq!(
            table.apply(Change::Update(task(id, 2, true))),
            Applied::Ignored(Skip::Stale)
        );
        assert!(!table.view()[0].done);
    }

    #[test]
    fn late_update_cannot_resurrect_a_deleted_row() {
        let id = Uuid::new_v4();
        let mut table = Table::from_rows(vec![task(id, 1, false)]);

        table.apply(Change::Delete(id));
        assert_eq!(
            table.apply(Change::Update(task(id, 2, true))),
            Applied::Ignored(Skip::Tombstoned)
        );
        assert_eq!(
            table.apply(Change::Insert(task(id, 1, false))),
            Applied::Ignored(Skip::Tombstoned)
        );
        assert!(table.view().is_empty());
    }

    #[test]
    fn update_for_unknown_id_inserts() {
        let id = Uuid::new_v4();
        let mut table = Table::default();

        assert_eq!(table.apply(Change::Update(task(id, 4, true))), Applied::Inserted);
        assert_eq!(table.view()[0].revision, 4);
    }

    #[test]
    fn rejected_optimistic_insert_rolls_back() {
        let id = Uuid::new_v4();
        let mut table = Table::default();

        table.stage(Change::Insert(task(id, 1, false)));
        assert_eq!(table.view().len(), 1);

        assert!(table.rollback(id));
        assert!(table.view().is_empty());
    }

    #[test]
    fn optimistic_update_shows_until_server_moves_past_it() {
        let id = Uuid::new_v4();
        let mut table = Table::from_rows(vec![task(id, 1, false)]);

        table.stage(Change::Update(task(id, 1, true)));
        assert!(table.get(id).unwrap().done);
        assert!(!table.confirmed(id).unwrap().done);

        // Server disagrees: someone else's write landed first.
        table.apply(Change::Update(task(id, 2, false)));
        assert!(!table.has_pending(id));
        assert!(!table.get(id).unwrap().done);
    }

    #[test]
    fn ack_replaces_guess_with_server_row() {
        let id = Uuid::new_v4();
        let mut table = Table::from_rows(vec![task(id, 1, false)]);

        table.stage(Change::Update(task(id, 1, true)));
        assert_eq!(table.confirm(id, Some(task(id, 2, true))), Applied::Replaced);
        assert!(!table.has_pending(id));
        assert_eq!(table.get(id).unwrap().revision, 2);
    }

    #[test]
    fn optimistic_delete_hides_then_restores_on_rollback() {
        let id = Uuid::new_v4();
        let mut table = Table::from_rows(vec![task(id, 1, false)]);

        table.stage(Change::Delete(id));
        assert!(table.view().is_empty());

        table.rollback(id);
        assert_eq!(table.view().len(), 1);
    }

    #[test]
    fn echo_of_optimistic_insert_settles_the_guess() {
        let id = Uuid::new_v4();
        let mut table = Table::default();

        table.stage(Change::Insert(task(id, 1, false)));
        table.apply(Change::Insert(task(id, 1, false)));

        assert!(!table.has_pending(id));
        assert_eq!(table.view().len(), 1);
    }

    #[test]
    fn reset_keeps_tombstones_and_settles_pending() {
        let kept = Uuid::new_v4();
        let deleted = Uuid::new_v4();
        let mut table = Table::from_rows(vec![task(kept, 1, false), task(deleted, 1, false)]);
        table.apply(Change::Delete(deleted));
        table.stage(Change::Update(task(kept, 1, true)));

        table.reset(vec![task(kept, 2, true)]);

        assert!(!table.has_pending(kept));
        assert_eq!(
            table.apply(Change::Update(task(deleted, 5, true))),
            Applied::Ignored(Skip::Tombstoned)
        );
        assert_eq!(table.view().len(), 1);
    }
}
