//! Breadth-first generation leveling.
//!
//! Roots are patrilineal persons that no family lists as a child. The BFS
//! gives spouses their partner's depth without walking through them and
//! gives children their parent's depth plus one. The first assignment of a
//! handle wins, so revisits through cycles or repeated marriages are no-ops.
//!
//! [`Leveling`] also remembers *how* each person was reached. The layout
//! engine uses that to build its placement forest, which keeps horizontal
//! blocks and generation rows consistent with each other.

use crate::model::{GraphIndex, GraphSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::trace;

/// Handle to generation, for persons reachable from a root.
pub type Generations = HashMap<String, i32>;

/// What happens to persons that no root reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnreachablePolicy {
    /// Each unreachable person becomes its own block on generation 0.
    TopRow,
    /// Keep walking through spouses, then root the leftover fragments at
    /// generation 0 so they get real depths of their own.
    #[default]
    Attach,
    /// Leave unreachable persons out of the layout.
    Omit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reach {
    Root,
    Spouse { partner: String },
    Child { parent: String, family: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leveled {
    pub generation: i32,
    pub reach: Reach,
}

#[derive(Debug, Clone, Default)]
pub struct Leveling {
    order: Vec<String>,
    entries: HashMap<String, Leveled>,
}

/// Generation map following the plain BFS rules. Unreachable persons are
/// absent from the result.
pub fn assign_generations(snapshot: &GraphSnapshot) -> Generations {
    Leveling::strict(snapshot).generations()
}

impl Leveling {
    /// BFS from the patrilineal roots only.
    pub fn strict(snapshot: &GraphSnapshot) -> Self {
        let index = snapshot.index();
        let mut leveler = Leveler::new(&index);
        leveler.walk_roots();
        leveler.finish()
    }

    /// BFS from the roots, then `policy` for everything left over.
    pub fn compute(snapshot: &GraphSnapshot, policy: UnreachablePolicy) -> Self {
        let index = snapshot.index();
        let mut leveler = Leveler::new(&index);
        leveler.walk_roots();
        let reached = leveler.order.len();

        match policy {
            UnreachablePolicy::TopRow => {
                for person in &snapshot.people {
                    if !leveler.is_claimed(&person.handle) {
                        leveler.claim(&person.handle, 0, Reach::Root);
                    }
                }
            }
            UnreachablePolicy::Attach => leveler.attach_leftovers(),
            UnreachablePolicy::Omit => {}
        }

        if leveler.order.len() > reached {
            trace!(
                extra = leveler.order.len() - reached,
                ?policy,
                "placed persons unreachable from any root"
            );
        }
        leveler.finish()
    }

    pub fn generation(&self, handle: &str) -> Option<i32> {
        self.entries.get(handle).map(|e| e.generation)
    }

    pub fn reach(&self, handle: &str) -> Option<&Reach> {
        self.entries.get(handle).map(|e| &e.reach)
    }

    pub fn get(&self, handle: &str) -> Option<&Leveled> {
        self.entries.get(handle)
    }

    /// Handles in the order they were reached.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn generations(&self) -> Generations {
        self.entries
            .iter()
            .map(|(h, e)| (h.clone(), e.generation))
            .collect()
    }
}

enum Pending {
    /// Root candidate; skipped if something claimed it first.
    Root,
    /// Already claimed, still to be walked.
    Claimed,
}

struct Leveler<'i, 'a> {
    index: &'i GraphIndex<'a>,
    order: Vec<String>,
    entries: HashMap<String, Leveled>,
    walked: HashSet<&'a str>,
    queue: VecDeque<(&'a str, i32, Pending)>,
    walk_spouses: bool,
}

impl<'i, 'a> Leveler<'i, 'a> {
    fn new(index: &'i GraphIndex<'a>) -> Self {
        let len = index.snapshot().people.len();
        Self {
            index,
            order: Vec::with_capacity(len),
            entries: HashMap::with_capacity(len),
            walked: HashSet::with_capacity(len),
            queue: VecDeque::new(),
            walk_spouses: false,
        }
    }

    fn is_claimed(&self, handle: &str) -> bool {
        self.entries.contains_key(handle)
    }

    fn claim(&mut self, handle: &str, generation: i32, reach: Reach) {
        self.order.push(handle.to_string());
        self.entries
            .insert(handle.to_string(), Leveled { generation, reach });
    }

    fn walk_roots(&mut self) {
        let index = self.index;
        for person in &index.snapshot().people {
            if person.is_patrilineal && !index.is_child(&person.handle) {
                self.queue.push_back((person.handle.as_str(), 0, Pending::Root));
            }
        }
        self.drain();
    }

    fn attach_leftovers(&mut self) {
        self.walk_spouses = true;
        let spouses: Vec<(&'a str, i32)> = self
            .order
            .iter()
            .filter_map(|h| {
                let entry = &self.entries[h];
                matches!(entry.reach, Reach::Spouse { .. })
                    .then(|| self.index.person(h))
                    .flatten()
                    .map(|p| (p.handle.as_str(), entry.generation))
            })
            .collect();
        for (handle, generation) in spouses {
            self.queue.push_back((handle, generation, Pending::Claimed));
        }
        self.drain();

        // Fragment tops first, so a detached family hangs from its elders.
        let index = self.index;
        for top_only in [true, false] {
            for person in &index.snapshot().people {
                if self.is_claimed(&person.handle) {
                    continue;
                }
                if top_only && index.is_child(&person.handle) {
                    continue;
                }
                self.claim(&person.handle, 0, Reach::Root);
                self.queue
                    .push_back((person.handle.as_str(), 0, Pending::Claimed));
                self.drain();
            }
        }
    }

    fn drain(&mut self) {
        while let Some((handle, depth, pending)) = self.queue.pop_front() {
            match pending {
                Pending::Root => {
                    if self.is_claimed(handle) {
                        continue;
                    }
                    self.claim(handle, depth, Reach::Root);
                }
                Pending::Claimed => {}
            }
            if !self.walked.insert(handle) {
                continue;
            }
            self.visit(handle, depth);
        }
    }

    fn visit(&mut self, handle: &'a str, depth: i32) {
        let index = self.index;
        let Some(person) = index.person(handle) else {
            return;
        };
        for family in index.families_of(person) {
            for spouse in index.parents_of(family) {
                if spouse.handle == handle || self.is_claimed(&spouse.handle) {
                    continue;
                }
                self.claim(
                    &spouse.handle,
                    depth,
                    Reach::Spouse {
                        partner: handle.to_string(),
                    },
                );
                if self.walk_spouses {
                    self.queue
                        .push_back((spouse.handle.as_str(), depth, Pending::Claimed));
                }
            }
            for child in index.children_of(family) {
                if self.is_claimed(&child.handle) {
                    continue;
                }
                self.claim(
                    &child.handle,
                    depth + 1,
                    Reach::Child {
                        parent: handle.to_string(),
                        family: family.handle.clone(),
                    },
                );
                self.queue
                    .push_back((child.handle.as_str(), depth + 1, Pending::Claimed));
            }
        }
    }

    fn finish(self) -> Leveling {
        Leveling {
            order: self.order,
            entries: self.entries,
        }
    }
}
