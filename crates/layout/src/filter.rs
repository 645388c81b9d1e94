//! Sub-graphs around a focus person, used by the ancestor and descendant views.

use crate::model::{GraphIndex, GraphSnapshot, Person};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// The focus, every descendant, and every spouse of the focus or a
/// descendant. Spouses are included but not walked through.
pub fn filter_descendants(focus: &str, snapshot: &GraphSnapshot) -> GraphSnapshot {
    let index = snapshot.index();
    let Some(root) = index.person(focus) else {
        return GraphSnapshot::default();
    };

    let mut people: HashSet<&str> = HashSet::from([root.handle.as_str()]);
    let mut families: HashSet<&str> = HashSet::new();
    let mut walked: HashSet<&str> = HashSet::new();
    let mut queue = VecDeque::from([root]);

    while let Some(person) = queue.pop_front() {
        if !walked.insert(person.handle.as_str()) {
            continue;
        }
        for family in index.families_of(person) {
            families.insert(family.handle.as_str());
            for spouse in index.parents_of(family) {
                people.insert(spouse.handle.as_str());
            }
            for child in index.children_of(family) {
                people.insert(child.handle.as_str());
                if !walked.contains(child.handle.as_str()) {
                    queue.push_back(child);
                }
            }
        }
    }

    debug!(focus, people = people.len(), families = families.len(), "filtered descendants");
    restrict(&index, &people, &families)
}

/// The focus, both parents of every parent family walking upwards, and the
/// spouses of each ancestor's other unions.
pub fn filter_ancestors(focus: &str, snapshot: &GraphSnapshot) -> GraphSnapshot {
    let index = snapshot.index();
    let Some(root) = index.person(focus) else {
        return GraphSnapshot::default();
    };

    let mut people: HashSet<&str> = HashSet::from([root.handle.as_str()]);
    let mut families: HashSet<&str> = HashSet::new();
    let mut ancestors: Vec<&Person> = Vec::new();
    let mut walked: HashSet<&str> = HashSet::new();
    let mut queue = VecDeque::from([root]);

    while let Some(person) = queue.pop_front() {
        if !walked.insert(person.handle.as_str()) {
            continue;
        }
        if person.handle != focus {
            ancestors.push(person);
        }
        for family in index.parent_families_of(person) {
            families.insert(family.handle.as_str());
            for parent in index.parents_of(family) {
                people.insert(parent.handle.as_str());
                queue.push_back(parent);
            }
        }
    }

    // Collateral spouses: other unions of an ancestor, one level only.
    for ancestor in ancestors {
        for family in index.families_of(ancestor) {
            if families.insert(family.handle.as_str()) {
                for spouse in index.parents_of(family) {
                    people.insert(spouse.handle.as_str());
                }
            }
        }
    }

    debug!(focus, people = people.len(), families = families.len(), "filtered ancestors");
    restrict(&index, &people, &families)
}

/// Copy the selected records in snapshot order, trimming each family's
/// children to the selected persons.
fn restrict(index: &GraphIndex<'_>, people: &HashSet<&str>, families: &HashSet<&str>) -> GraphSnapshot {
    let snapshot = index.snapshot();
    let mut seen = HashSet::new();
    let people_out = snapshot
        .people
        .iter()
        .filter(|p| people.contains(p.handle.as_str()) && seen.insert(p.handle.as_str()))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let families_out = snapshot
        .families
        .iter()
        .filter(|f| families.contains(f.handle.as_str()) && seen.insert(f.handle.as_str()))
        .map(|f| {
            let mut family = f.clone();
            family.children.retain(|c| people.contains(c.as_str()));
            family
        })
        .collect();

    GraphSnapshot::new(people_out, families_out)
}
