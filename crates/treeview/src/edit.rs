//! Optimistic structural edits. Each edit produces a new snapshot locally
//! and is handed to an [`EditSink`]; the storage side reports back through
//! [`EditJournal::resolve`].

use giapha_layout::{Family, GraphSnapshot, Person};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("Unknown person: {0}")]
    UnknownPerson(String),

    #[error("Unknown family: {0}")]
    UnknownFamily(String),

    #[error("{child} is not a child of {family}")]
    NotAChild { child: String, family: String },

    #[error("New order for {family} is not a permutation of its children")]
    NotAPermutation { family: String },
}

/// Storage rejected a write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Storage write failed: {reason}")]
pub struct EditFailure {
    pub reason: String,
}

impl EditFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Fields a profile edit may touch. `None` leaves a field alone; the inner
/// `Option` of the years clears them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersonPatch {
    pub display_name: Option<String>,
    pub birth_year: Option<Option<i32>>,
    pub death_year: Option<Option<i32>>,
    pub is_living: Option<bool>,
}

impl PersonPatch {
    fn apply_to(&self, person: &mut Person) {
        if let Some(name) = &self.display_name {
            person.display_name = name.clone();
        }
        if let Some(year) = self.birth_year {
            person.birth_year = year;
        }
        if let Some(year) = self.death_year {
            person.death_year = year;
        }
        if let Some(living) = self.is_living {
            person.is_living = living;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Edit {
    ReorderChildren { family: String, order: Vec<String> },
    MoveChild { child: String, from: String, to: String },
    RemoveChild { child: String, family: String },
    SetLiving { person: String, is_living: bool },
    UpdatePerson { person: String, patch: PersonPatch },
}

fn family_mut<'s>(snapshot: &'s mut GraphSnapshot, handle: &str) -> Result<&'s mut Family, EditError> {
    snapshot
        .families
        .iter_mut()
        .find(|f| f.handle == handle)
        .ok_or_else(|| EditError::UnknownFamily(handle.to_string()))
}

fn person_mut<'s>(snapshot: &'s mut GraphSnapshot, handle: &str) -> Result<&'s mut Person, EditError> {
    snapshot
        .people
        .iter_mut()
        .find(|p| p.handle == handle)
        .ok_or_else(|| EditError::UnknownPerson(handle.to_string()))
}

fn require_child(snapshot: &GraphSnapshot, child: &str, family: &str) -> Result<(), EditError> {
    let f = snapshot
        .family(family)
        .ok_or_else(|| EditError::UnknownFamily(family.to_string()))?;
    if f.children.iter().any(|c| c == child) {
        Ok(())
    } else {
        Err(EditError::NotAChild {
            child: child.to_string(),
            family: family.to_string(),
        })
    }
}

impl Edit {
    /// A new snapshot with this edit applied. `snapshot` is left untouched
    /// and nothing is cloned when validation fails.
    pub fn apply(&self, snapshot: &GraphSnapshot) -> Result<GraphSnapshot, EditError> {
        match self {
            Edit::ReorderChildren { family, order } => {
                let f = snapshot
                    .family(family)
                    .ok_or_else(|| EditError::UnknownFamily(family.clone()))?;
                let mut current: Vec<&str> = f.children.iter().map(String::as_str).collect();
                let mut proposed: Vec<&str> = order.iter().map(String::as_str).collect();
                current.sort_unstable();
                proposed.sort_unstable();
                if current != proposed {
                    return Err(EditError::NotAPermutation {
                        family: family.clone(),
                    });
                }
                let mut next = snapshot.clone();
                family_mut(&mut next, family)?.children = order.clone();
                Ok(next)
            }
            Edit::MoveChild { child, from, to } => {
                require_child(snapshot, child, from)?;
                if snapshot.family(to).is_none() {
                    return Err(EditError::UnknownFamily(to.clone()));
                }
                let mut next = snapshot.clone();
                family_mut(&mut next, from)?.children.retain(|c| c != child);
                let target = family_mut(&mut next, to)?;
                target.children.retain(|c| c != child);
                target.children.push(child.clone());
                if let Ok(person) = person_mut(&mut next, child) {
                    person.parent_families.retain(|f| f != from && f != to);
                    person.parent_families.push(to.clone());
                }
                Ok(next)
            }
            Edit::RemoveChild { child, family } => {
                require_child(snapshot, child, family)?;
                let mut next = snapshot.clone();
                family_mut(&mut next, family)?.children.retain(|c| c != child);
                if let Ok(person) = person_mut(&mut next, child) {
                    person.parent_families.retain(|f| f != family);
                }
                Ok(next)
            }
            Edit::SetLiving { person, is_living } => {
                if snapshot.person(person).is_none() {
                    return Err(EditError::UnknownPerson(person.clone()));
                }
                let mut next = snapshot.clone();
                person_mut(&mut next, person)?.is_living = *is_living;
                Ok(next)
            }
            Edit::UpdatePerson { person, patch } => {
                if snapshot.person(person).is_none() {
                    return Err(EditError::UnknownPerson(person.clone()));
                }
                let mut next = snapshot.clone();
                patch.apply_to(person_mut(&mut next, person)?);
                Ok(next)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditId(pub u64);

/// Where edits go after they are applied locally.
pub trait EditSink {
    fn submit(&mut self, id: EditId, edit: &Edit);
}

impl<F: FnMut(EditId, &Edit)> EditSink for F {
    fn submit(&mut self, id: EditId, edit: &Edit) {
        self(id, edit)
    }
}

/// What to do with the local state when storage rejects an edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteFailurePolicy {
    /// Drop the edit and replay the remaining pending edits on the last
    /// confirmed snapshot.
    #[default]
    Rollback,
    /// Keep the optimistic state; the edit stays pending for a retry.
    Retain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditStatus {
    InFlight,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub id: EditId,
    pub edit: Edit,
    pub status: EditStatus,
}

#[derive(Debug, Clone)]
pub struct EditJournal {
    base: Arc<GraphSnapshot>,
    current: Arc<GraphSnapshot>,
    pending: Vec<PendingEdit>,
    next_id: u64,
    revision: u64,
    policy: WriteFailurePolicy,
}

impl EditJournal {
    pub fn new(snapshot: Arc<GraphSnapshot>, policy: WriteFailurePolicy) -> Self {
        Self {
            base: snapshot.clone(),
            current: snapshot,
            pending: Vec::new(),
            next_id: 1,
            revision: 0,
            policy,
        }
    }

    /// The optimistic snapshot every view should render.
    pub fn current(&self) -> &Arc<GraphSnapshot> {
        &self.current
    }

    /// The last snapshot storage has confirmed.
    pub fn base(&self) -> &Arc<GraphSnapshot> {
        &self.base
    }

    pub fn pending(&self) -> &[PendingEdit] {
        &self.pending
    }

    /// Bumps whenever `current` changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn policy(&self) -> WriteFailurePolicy {
        self.policy
    }

    /// Apply `edit` locally and hand it to `sink`.
    pub fn submit(&mut self, edit: Edit, sink: &mut impl EditSink) -> Result<EditId, EditError> {
        let next = edit.apply(&self.current)?;
        let id = EditId(self.next_id);
        self.next_id += 1;
        self.current = Arc::new(next);
        self.revision += 1;
        debug!(id = id.0, ?edit, "applied edit locally");
        sink.submit(id, &edit);
        self.pending.push(PendingEdit {
            id,
            edit,
            status: EditStatus::InFlight,
        });
        Ok(id)
    }

    /// Record the storage outcome of `id`. Unknown ids are ignored.
    pub fn resolve(&mut self, id: EditId, outcome: Result<(), EditFailure>) -> bool {
        match outcome {
            Ok(()) => self.confirm(id),
            Err(failure) => self.fail(id, &failure),
        }
    }

    pub fn confirm(&mut self, id: EditId) -> bool {
        let Some(entry) = self.pending.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        entry.status = EditStatus::Confirmed;

        // Fold the confirmed prefix into the base.
        let done = self
            .pending
            .iter()
            .take_while(|e| e.status == EditStatus::Confirmed)
            .count();
        for entry in self.pending.drain(..done) {
            match entry.edit.apply(&self.base) {
                Ok(next) => self.base = Arc::new(next),
                Err(err) => warn!(id = entry.id.0, %err, "confirmed edit does not apply to base"),
            }
        }
        if self.pending.is_empty() {
            self.base = self.current.clone();
        }
        true
    }

    pub fn fail(&mut self, id: EditId, failure: &EditFailure) -> bool {
        let Some(pos) = self.pending.iter().position(|e| e.id == id) else {
            return false;
        };
        match self.policy {
            WriteFailurePolicy::Retain => {
                warn!(id = id.0, %failure, "edit failed, keeping local state");
                self.pending[pos].status = EditStatus::Failed;
            }
            WriteFailurePolicy::Rollback => {
                self.pending.remove(pos);
                self.rebuild();
                warn!(id = id.0, %failure, pending = self.pending.len(), "edit rolled back");
            }
        }
        true
    }

    /// Resubmit a failed edit.
    pub fn retry(&mut self, id: EditId, sink: &mut impl EditSink) -> bool {
        let Some(entry) = self
            .pending
            .iter_mut()
            .find(|e| e.id == id && e.status == EditStatus::Failed)
        else {
            return false;
        };
        entry.status = EditStatus::InFlight;
        sink.submit(id, &entry.edit);
        true
    }

    /// Drop every pending edit and go back to the last confirmed snapshot.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.current = self.base.clone();
        self.revision += 1;
    }

    /// Start over from a freshly loaded snapshot.
    pub fn reload(&mut self, snapshot: Arc<GraphSnapshot>) {
        self.pending.clear();
        self.base = snapshot.clone();
        self.current = snapshot;
        self.revision += 1;
    }

    fn rebuild(&mut self) {
        let mut snapshot = self.base.clone();
        for entry in &self.pending {
            match entry.edit.apply(&snapshot) {
                Ok(next) => snapshot = Arc::new(next),
                Err(err) => warn!(id = entry.id.0, %err, "pending edit no longer applies"),
            }
        }
        self.current = snapshot;
        self.revision += 1;
    }
}
