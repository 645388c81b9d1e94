//! Collapsed branches and the hidden set they imply.
//!
//! Collapsing a person hides everything below them: children recursively
//! and the spouses of every person on the way. On top of that union a
//! cascade hides anyone whose parent families are all headed by hidden
//! parents, which catches descendants that are reachable only through a
//! hidden spouse's other union.

use giapha_layout::{Family, Generations, GraphIndex, GraphSnapshot, Person};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// Default generation at which branches start out collapsed.
pub const AUTO_COLLAPSE_GEN: i32 = 8;

struct Reached<'a> {
    person: &'a Person,
    /// Generations below the branch root. Spouses take their partner's depth.
    depth: i32,
    spouse: bool,
}

/// Breadth-first walk below `root`, calling `visit` once per existing person.
/// Spouses are visited but not walked through.
fn walk_branch<'a>(index: &GraphIndex<'a>, root: &str, mut visit: impl FnMut(Reached<'a>)) {
    let Some(root) = index.person(root) else {
        return;
    };
    let mut seen: HashSet<&str> = HashSet::from([root.handle.as_str()]);
    let mut queued: HashSet<&str> = HashSet::from([root.handle.as_str()]);
    let mut queue = VecDeque::from([(root, 0)]);

    while let Some((person, depth)) = queue.pop_front() {
        for family in index.families_of(person) {
            for spouse in index.parents_of(family) {
                if seen.insert(spouse.handle.as_str()) {
                    visit(Reached {
                        person: spouse,
                        depth,
                        spouse: true,
                    });
                }
            }
            for child in index.children_of(family) {
                if seen.insert(child.handle.as_str()) {
                    visit(Reached {
                        person: child,
                        depth: depth + 1,
                        spouse: false,
                    });
                }
                if queued.insert(child.handle.as_str()) {
                    queue.push_back((child, depth + 1));
                }
            }
        }
    }
}

/// Everyone below `handle`, spouses included, `handle` excluded.
pub fn descendant_handles(snapshot: &GraphSnapshot, handle: &str) -> BTreeSet<String> {
    let index = snapshot.index();
    let mut out = BTreeSet::new();
    walk_branch(&index, handle, |r| {
        out.insert(r.person.handle.clone());
    });
    out
}

/// Persons hidden by `collapsed`, cascade included.
pub fn hidden_handles(snapshot: &GraphSnapshot, collapsed: &BTreeSet<String>) -> HashSet<String> {
    if collapsed.is_empty() {
        return HashSet::new();
    }
    let index = snapshot.index();
    let mut hidden: HashSet<&str> = HashSet::new();
    for root in collapsed {
        walk_branch(&index, root, |r| {
            hidden.insert(r.person.handle.as_str());
        });
    }
    let direct = hidden.len();
    Cascade::new(&index).run(&mut hidden);

    debug!(
        collapsed = collapsed.len(),
        direct,
        cascaded = hidden.len() - direct,
        "computed hidden set"
    );
    hidden.into_iter().map(str::to_string).collect()
}

/// Reverse indexes for the cascade: a person's hiding can only close the
/// families they parent, and a closed family can only affect the persons
/// that list it as a parent family.
struct Cascade<'i, 'a> {
    index: &'i GraphIndex<'a>,
    parented: HashMap<&'a str, Vec<&'a Family>>,
    listed_by: HashMap<&'a str, Vec<&'a Person>>,
}

impl<'i, 'a> Cascade<'i, 'a> {
    fn new(index: &'i GraphIndex<'a>) -> Self {
        let snapshot = index.snapshot();
        let mut parented: HashMap<&'a str, Vec<&'a Family>> = HashMap::new();
        for family in &snapshot.families {
            for parent in family.parents() {
                parented.entry(parent).or_default().push(family);
            }
        }
        let mut listed_by: HashMap<&'a str, Vec<&'a Person>> = HashMap::new();
        for person in &snapshot.people {
            for family in &person.parent_families {
                listed_by.entry(family.as_str()).or_default().push(person);
            }
        }
        Self {
            index,
            parented,
            listed_by,
        }
    }

    /// `None` for a family with no existing parent; such families never
    /// decide visibility. Otherwise whether every existing parent is hidden.
    fn closed(&self, family: &'a Family, hidden: &HashSet<&str>) -> Option<bool> {
        let mut parents = self.index.parents_of(family).peekable();
        parents.peek()?;
        Some(parents.all(|p| hidden.contains(p.handle.as_str())))
    }

    fn should_hide(&self, person: &'a Person, hidden: &HashSet<&str>) -> bool {
        let mut deciding = self
            .index
            .parent_families_of(person)
            .filter_map(|f| self.closed(f, hidden))
            .peekable();
        deciding.peek().is_some() && deciding.all(|closed| closed)
    }

    fn run(&self, hidden: &mut HashSet<&'a str>) {
        let mut queue: VecDeque<&'a str> = hidden.iter().copied().collect();
        while let Some(handle) = queue.pop_front() {
            let Some(families) = self.parented.get(handle) else {
                continue;
            };
            for &family in families {
                if self.closed(family, hidden) != Some(true) {
                    continue;
                }
                let Some(listed) = self.listed_by.get(family.handle.as_str()) else {
                    continue;
                };
                for &person in listed {
                    let h = person.handle.as_str();
                    if !hidden.contains(h) && self.should_hide(person, hidden) {
                        trace!(handle = h, family = %family.handle, "cascade hides");
                        hidden.insert(h);
                        queue.push_back(h);
                    }
                }
            }
        }
    }
}

/// A family stays in the layout input while any recorded parent is visible.
/// Parentless families are always kept.
pub fn family_visible(family: &Family, hidden: &HashSet<String>) -> bool {
    let mut parents = family.parents().peekable();
    parents.peek().is_none() || parents.any(|p| !hidden.contains(p))
}

/// `snapshot` without hidden persons and without families whose parents
/// are all hidden.
pub fn visible_snapshot(snapshot: &GraphSnapshot, hidden: &HashSet<String>) -> GraphSnapshot {
    if hidden.is_empty() {
        return snapshot.clone();
    }
    GraphSnapshot::new(
        snapshot
            .people
            .iter()
            .filter(|p| !hidden.contains(&p.handle))
            .cloned()
            .collect(),
        snapshot
            .families
            .iter()
            .filter(|f| family_visible(f, hidden))
            .cloned()
            .collect(),
    )
}

/// Aggregate shown in place of a collapsed branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSummary {
    pub parent_handle: String,
    pub total_descendants: usize,
    /// Absolute generations of the hidden blood line, inclusive.
    pub generation_range: (i32, i32),
    pub living_count: usize,
    pub deceased_count: usize,
    pub patrilineal_count: usize,
}

/// Tally the branch below `handle`. The range is offset by the root's
/// generation when `generations` knows it.
pub fn branch_summary(snapshot: &GraphSnapshot, handle: &str, generations: &Generations) -> BranchSummary {
    let index = snapshot.index();
    let base = generations.get(handle).copied().unwrap_or(0);
    let mut summary = BranchSummary {
        parent_handle: handle.to_string(),
        total_descendants: 0,
        generation_range: (base, base),
        living_count: 0,
        deceased_count: 0,
        patrilineal_count: 0,
    };
    let mut range: Option<(i32, i32)> = None;

    walk_branch(&index, handle, |r| {
        summary.total_descendants += 1;
        if r.person.is_living {
            summary.living_count += 1;
        } else {
            summary.deceased_count += 1;
        }
        if r.person.is_patrilineal {
            summary.patrilineal_count += 1;
        }
        // The root's own spouses sit on the root's row, outside the branch.
        if r.spouse && r.depth == 0 {
            return;
        }
        let generation = base + r.depth;
        range = Some(match range {
            Some((lo, hi)) => (lo.min(generation), hi.max(generation)),
            None => (generation, generation),
        });
    });

    if let Some(range) = range {
        summary.generation_range = range;
    }
    summary
}

/// The set of collapsed branch roots. `revision` bumps on every change so
/// callers can key caches on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseState {
    collapsed: BTreeSet<String>,
    #[serde(skip)]
    revision: u64,
}

impl CollapseState {
    pub fn collapsed(&self) -> &BTreeSet<String> {
        &self.collapsed
    }

    pub fn is_collapsed(&self, handle: &str) -> bool {
        self.collapsed.contains(handle)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.collapsed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.collapsed.len()
    }

    pub fn replace(&mut self, collapsed: BTreeSet<String>) {
        self.collapsed = collapsed;
        self.revision += 1;
    }

    /// Collapse `handle`, or expand it one level: its direct children that
    /// have children of their own come back collapsed.
    pub fn toggle(&mut self, snapshot: &GraphSnapshot, handle: &str) {
        if self.collapsed.remove(handle) {
            let index = snapshot.index();
            if let Some(person) = index.person(handle) {
                for family in index.families_of(person) {
                    for child in index.children_of(family) {
                        let has_children = index
                            .families_of(child)
                            .any(|f| !f.children.is_empty());
                        if has_children {
                            self.collapsed.insert(child.handle.clone());
                        }
                    }
                }
            }
        } else {
            self.collapsed.insert(handle.to_string());
        }
        self.revision += 1;
    }

    pub fn expand_all(&mut self) {
        self.replace(BTreeSet::new());
    }

    /// Collapse every recorded parent of a family with at least one child.
    pub fn collapse_all(&mut self, snapshot: &GraphSnapshot) {
        let collapsed = snapshot
            .families
            .iter()
            .filter(|f| !f.children.is_empty())
            .flat_map(|f| f.parents())
            .map(str::to_string)
            .collect();
        self.replace(collapsed);
    }

    /// Panoramic policy: the head of each family with children (father,
    /// else mother) is collapsed when their generation is `threshold` or
    /// deeper.
    pub fn auto_collapse_panoramic(
        &mut self,
        snapshot: &GraphSnapshot,
        generations: &Generations,
        threshold: i32,
    ) {
        let collapsed = snapshot
            .families
            .iter()
            .filter(|f| !f.children.is_empty())
            .filter_map(|f| f.parents().next())
            .filter(|h| generations.get(*h).is_some_and(|g| *g >= threshold))
            .map(str::to_string)
            .collect();
        self.replace(collapsed);
    }

    /// Descendant policy: depth is counted from `focus`, and a parent at
    /// `threshold` or deeper with children is collapsed.
    pub fn auto_collapse_descendants(&mut self, snapshot: &GraphSnapshot, focus: &str, threshold: i32) {
        let index = snapshot.index();
        let mut collapsed = BTreeSet::new();
        let mut depths: HashMap<&str, i32> = HashMap::from([(focus, 0)]);
        let mut queue = VecDeque::from([focus]);

        while let Some(handle) = queue.pop_front() {
            let depth = depths[handle];
            let Some(person) = index.person(handle) else {
                continue;
            };
            for family in index.families_of(person) {
                if family.children.is_empty() {
                    continue;
                }
                if depth >= threshold {
                    collapsed.insert(handle.to_string());
                    continue;
                }
                for child in &family.children {
                    if !depths.contains_key(child.as_str()) {
                        depths.insert(child.as_str(), depth + 1);
                        queue.push_back(child.as_str());
                    }
                }
            }
        }
        self.replace(collapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use giapha_layout::{SampleConfig, assign_generations, generate_sample};
    use proptest::prelude::*;

    /// A ─ F1 ─ B ─ F2 ─ C
    fn chain() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![
                Person::new("A", "A").patrilineal(true).in_families(["F1"]),
                Person::new("B", "B").patrilineal(true).in_families(["F2"]).child_of(["F1"]),
                Person::new("C", "C").patrilineal(true).child_of(["F2"]),
            ],
            vec![
                Family::new("F1").father("A").with_children(["B"]),
                Family::new("F2").father("B").with_children(["C"]),
            ],
        )
    }

    fn set(handles: &[&str]) -> BTreeSet<String> {
        handles.iter().map(|h| h.to_string()).collect()
    }

    /// Fixpoint by full rescans, for comparison with the worklist.
    fn naive_hidden(snapshot: &GraphSnapshot, collapsed: &BTreeSet<String>) -> HashSet<String> {
        if collapsed.is_empty() {
            return HashSet::new();
        }
        let index = snapshot.index();
        let mut hidden: HashSet<String> = collapsed
            .iter()
            .flat_map(|h| descendant_handles(snapshot, h))
            .collect();
        loop {
            let mut changed = false;
            for person in &snapshot.people {
                if hidden.contains(&person.handle) {
                    continue;
                }
                let states: Vec<bool> = index
                    .parent_families_of(person)
                    .filter_map(|f| {
                        let parents: Vec<_> = index.parents_of(f).collect();
                        (!parents.is_empty()).then(|| parents.iter().all(|p| hidden.contains(&p.handle)))
                    })
                    .collect();
                if !states.is_empty() && states.iter().all(|c| *c) {
                    hidden.insert(person.handle.clone());
                    changed = true;
                }
            }
            if !changed {
                return hidden;
            }
        }
    }

    #[test]
    fn collapsing_the_top_of_a_chain_hides_everything_below() {
        let snapshot = chain();
        let hidden = hidden_handles(&snapshot, &set(&["A"]));
        assert_eq!(hidden, HashSet::from(["B".to_string(), "C".to_string()]));

        let summary = branch_summary(&snapshot, "A", &assign_generations(&snapshot));
        assert_eq!(summary.total_descendants, 2);
        assert_eq!(summary.generation_range, (1, 2));
        assert_eq!(summary.patrilineal_count, 2);
    }

    #[test]
    fn cascade_follows_a_hidden_spouse_into_other_unions() {
        // W is A's wife. S is hers from a union with no other parent, T from
        // a union with the unrelated Y.
        let mut snapshot = chain();
        snapshot.families[0].mother_handle = Some("W".into());
        snapshot.people.push(Person::new("W", "W").in_families(["F1", "F9", "F8"]));
        snapshot.people.push(Person::new("Y", "Y").in_families(["F8"]));
        snapshot.people.push(Person::new("S", "S").child_of(["F9"]));
        snapshot.people.push(Person::new("T", "T").child_of(["F8"]));
        snapshot.families.push(Family::new("F9").mother("W").with_children(["S"]));
        snapshot.families.push(Family::new("F8").father("Y").mother("W").with_children(["T"]));

        // Spouses are not walked through, so only the cascade reaches S.
        assert!(!descendant_handles(&snapshot, "A").contains("S"));

        let collapsed = set(&["A"]);
        let hidden = hidden_handles(&snapshot, &collapsed);
        assert!(hidden.contains("W"));
        assert!(hidden.contains("S"));
        assert!(!hidden.contains("T"), "Y is still visible");
        assert_eq!(hidden, naive_hidden(&snapshot, &collapsed));
    }

    #[test]
    fn cascade_needs_every_parent_family_closed() {
        // K names F2 (B and X) and F3 (X alone) as parent families but is
        // listed as a child nowhere, so only the cascade can hide K.
        let mut snapshot = chain();
        snapshot.families[1].mother_handle = Some("X".into());
        snapshot.people.push(Person::new("X", "X").in_families(["F2", "F3"]));
        snapshot.people.push(Person::new("K", "K").child_of(["F2", "F3"]));
        snapshot.families.push(Family::new("F3").father("X"));

        let collapsed = set(&["A"]);
        let hidden = hidden_handles(&snapshot, &collapsed);
        assert!(hidden.contains("K"));
        assert_eq!(hidden, naive_hidden(&snapshot, &collapsed));

        let collapsed = set(&["B"]);
        let hidden = hidden_handles(&snapshot, &collapsed);
        assert_eq!(hidden, HashSet::from(["C".to_string(), "X".to_string()]));
        assert_eq!(hidden, naive_hidden(&snapshot, &collapsed));
    }

    #[test]
    fn dangling_and_parentless_families_do_not_hide() {
        let mut snapshot = chain();
        snapshot.people.push(Person::new("O", "Orphan").child_of(["F404", "F0"]));
        snapshot.families.push(Family::new("F0").with_children(["O"]));
        let hidden = hidden_handles(&snapshot, &set(&["A"]));
        assert!(!hidden.contains("O"));
        assert_eq!(hidden, naive_hidden(&snapshot, &set(&["A"])));
    }

    #[test]
    fn toggle_reveals_one_level_at_a_time() {
        let snapshot = chain();
        let mut state = CollapseState::default();
        state.toggle(&snapshot, "A");
        assert!(state.is_collapsed("A"));
        state.toggle(&snapshot, "A");
        assert!(!state.is_collapsed("A"));
        assert!(state.is_collapsed("B"));
        assert_eq!(state.revision(), 2);
    }

    #[test]
    fn expand_all_after_collapse_all_shows_everything() {
        let snapshot = generate_sample(&SampleConfig::default());
        let mut state = CollapseState::default();
        state.expand_all();
        state.collapse_all(&snapshot);
        assert!(!hidden_handles(&snapshot, state.collapsed()).is_empty());
        state.expand_all();
        assert!(hidden_handles(&snapshot, state.collapsed()).is_empty());
    }

    #[test]
    fn auto_collapse_policies() {
        let snapshot = chain();
        let generations = assign_generations(&snapshot);
        let mut state = CollapseState::default();

        state.auto_collapse_panoramic(&snapshot, &generations, 1);
        assert_eq!(state.collapsed(), &set(&["B"]));

        state.auto_collapse_descendants(&snapshot, "B", 0);
        assert_eq!(state.collapsed(), &set(&["B"]));

        state.auto_collapse_descendants(&snapshot, "A", 8);
        assert!(state.is_empty());
    }

    #[test]
    fn visible_snapshot_drops_closed_families() {
        let snapshot = chain();
        let hidden = hidden_handles(&snapshot, &set(&["B"]));
        let visible = visible_snapshot(&snapshot, &hidden);
        assert!(visible.person("C").is_none());
        assert!(visible.family("F1").is_some());
        assert!(visible.family("F2").is_some(), "B is collapsed but still visible");
    }

    proptest! {
        #[test]
        fn worklist_cascade_matches_rescan(seed in any::<u64>(), picks in prop::collection::vec(any::<prop::sample::Index>(), 1..4)) {
            let snapshot = generate_sample(&SampleConfig { generations: 4, seed, ..Default::default() });
            let collapsed: BTreeSet<String> = picks
                .iter()
                .map(|i| snapshot.people[i.index(snapshot.people.len())].handle.clone())
                .collect();
            prop_assert_eq!(hidden_handles(&snapshot, &collapsed), naive_hidden(&snapshot, &collapsed));
        }
    }
}
