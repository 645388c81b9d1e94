//! Data quality report. Nothing here affects layout; the engine skips the
//! same problems silently and this pass lets the caller log them.

use crate::generation::assign_generations;
use crate::model::GraphSnapshot;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefKind {
    /// `Person::families` names a missing family.
    Family,
    /// `Person::parent_families` names a missing family.
    ParentFamily,
    Father,
    Mother,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingRef {
    /// Person or family holding the reference.
    pub owner: String,
    pub target: String,
    pub kind: RefKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub dangling: Vec<DanglingRef>,
    /// References whose target exists but does not point back, e.g. a
    /// family naming a mother whose `families` lacks it.
    pub one_sided: Vec<DanglingRef>,
    /// Groups of persons that are their own ancestors, handles sorted.
    pub cycles: Vec<Vec<String>>,
    /// Persons no patrilineal root reaches.
    pub unreachable: Vec<String>,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty()
            && self.one_sided.is_empty()
            && self.cycles.is_empty()
            && self.unreachable.is_empty()
    }

    pub fn log(&self) {
        for r in &self.dangling {
            warn!(owner = %r.owner, target = %r.target, kind = ?r.kind, "dangling reference");
        }
        for r in &self.one_sided {
            warn!(owner = %r.owner, target = %r.target, kind = ?r.kind, "one-sided reference");
        }
        for cycle in &self.cycles {
            warn!(members = ?cycle, "descent cycle");
        }
        if !self.unreachable.is_empty() {
            warn!(
                count = self.unreachable.len(),
                first = %self.unreachable[0],
                "persons unreachable from any root"
            );
        }
    }
}

pub fn diagnose(snapshot: &GraphSnapshot) -> Diagnostics {
    let index = snapshot.index();
    let mut report = Diagnostics::default();

    for person in &snapshot.people {
        let refs = person
            .families
            .iter()
            .map(|f| (f, RefKind::Family))
            .chain(person.parent_families.iter().map(|f| (f, RefKind::ParentFamily)));
        for (family, kind) in refs {
            let Some(target) = index.family(family) else {
                report.dangling.push(DanglingRef {
                    owner: person.handle.clone(),
                    target: family.clone(),
                    kind,
                });
                continue;
            };
            let mirrored = match kind {
                RefKind::ParentFamily => target.children.contains(&person.handle),
                _ => target.parents().any(|p| p == person.handle),
            };
            if !mirrored {
                report.one_sided.push(DanglingRef {
                    owner: person.handle.clone(),
                    target: family.clone(),
                    kind,
                });
            }
        }
    }

    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for person in &snapshot.people {
        nodes
            .entry(person.handle.as_str())
            .or_insert_with(|| graph.add_node(person.handle.as_str()));
    }

    for family in &snapshot.families {
        let parents = family
            .father_handle
            .iter()
            .map(|h| (h, RefKind::Father))
            .chain(family.mother_handle.iter().map(|h| (h, RefKind::Mother)))
            .chain(family.children.iter().map(|h| (h, RefKind::Child)));
        for (handle, kind) in parents {
            let Some(target) = index.person(handle) else {
                report.dangling.push(DanglingRef {
                    owner: family.handle.clone(),
                    target: handle.clone(),
                    kind,
                });
                continue;
            };
            let listed = match kind {
                RefKind::Child => &target.parent_families,
                _ => &target.families,
            };
            if !listed.contains(&family.handle) {
                report.one_sided.push(DanglingRef {
                    owner: family.handle.clone(),
                    target: handle.clone(),
                    kind,
                });
            }
        }

        for parent in family.parents() {
            let Some(&from) = nodes.get(parent) else {
                continue;
            };
            for child in &family.children {
                if let Some(&to) = nodes.get(child.as_str()) {
                    graph.update_edge(from, to, ());
                }
            }
        }
    }

    for component in tarjan_scc(&graph) {
        let looped = match component.as_slice() {
            [single] => graph.contains_edge(*single, *single),
            _ => true,
        };
        if looped {
            let mut members: Vec<String> = component.iter().map(|&n| graph[n].to_string()).collect();
            members.sort();
            report.cycles.push(members);
        }
    }
    report.cycles.sort();

    let generations = assign_generations(snapshot);
    report.unreachable = snapshot
        .people
        .iter()
        .filter(|p| !generations.contains_key(&p.handle))
        .map(|p| p.handle.clone())
        .collect();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Family, Person};
    use tracing_test::traced_test;

    #[test]
    fn clean_snapshot_reports_nothing() {
        let snapshot = GraphSnapshot::new(
            vec![
                Person::new("A", "A").patrilineal(true).in_families(["F1"]),
                Person::new("B", "B").child_of(["F1"]),
            ],
            vec![Family::new("F1").father("A").with_children(["B"])],
        );
        assert!(diagnose(&snapshot).is_clean());
    }

    #[test]
    fn dangling_and_cycles_are_reported() {
        let snapshot = GraphSnapshot::new(
            vec![
                Person::new("R", "R").patrilineal(true).in_families(["F0", "F404"]),
                Person::new("A", "A").in_families(["F1"]).child_of(["F0", "F2"]),
                Person::new("B", "B").in_families(["F2"]).child_of(["F1"]),
                Person::new("Z", "Z"),
            ],
            vec![
                Family::new("F0").father("R").with_children(["A", "P999"]),
                Family::new("F1").father("A").with_children(["B"]),
                Family::new("F2").father("B").mother("M404").with_children(["A"]),
            ],
        );
        let report = diagnose(&snapshot);

        assert_eq!(report.cycles, vec![vec!["A".to_string(), "B".to_string()]]);
        assert_eq!(report.unreachable, vec!["Z".to_string()]);
        assert!(report.one_sided.is_empty());
        let kinds: Vec<_> = report.dangling.iter().map(|d| (d.target.as_str(), d.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("F404", RefKind::Family),
                ("P999", RefKind::Child),
                ("M404", RefKind::Mother),
            ]
        );
    }

    #[test]
    fn one_sided_links_are_reported() {
        let snapshot = GraphSnapshot::new(
            vec![
                Person::new("H", "H").patrilineal(true).in_families(["F1"]),
                // Married in but does not list the family.
                Person::new("W", "W"),
                // Listed as a child without naming the family.
                Person::new("C", "C"),
                // Claims a family that never lists them.
                Person::new("D", "D").child_of(["F1"]),
            ],
            vec![Family::new("F1").father("H").mother("W").with_children(["C"])],
        );
        let report = diagnose(&snapshot);

        assert!(report.dangling.is_empty());
        assert!(!report.is_clean());
        let links: Vec<_> = report
            .one_sided
            .iter()
            .map(|r| (r.owner.as_str(), r.target.as_str(), r.kind))
            .collect();
        assert_eq!(
            links,
            vec![
                ("D", "F1", RefKind::ParentFamily),
                ("F1", "W", RefKind::Mother),
                ("F1", "C", RefKind::Child),
            ]
        );
    }

    #[test]
    #[traced_test]
    fn log_emits_warnings() {
        let snapshot = GraphSnapshot::new(
            vec![Person::new("A", "A").patrilineal(true).in_families(["F404"])],
            vec![],
        );
        diagnose(&snapshot).log();
        assert!(logs_contain("dangling reference"));
    }
}
