use crate::generation::{Leveling, Reach};
use crate::model::{GraphIndex, GraphSnapshot};
use crate::types::*;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::debug;

/// Lay out `snapshot` with the default card geometry.
pub fn compute_layout(snapshot: &GraphSnapshot) -> LayoutResult {
    LayoutConfig::default().layout(snapshot)
}

/// Batch connections into one SVG path string (`M x,y L x,y` per segment).
pub fn path_spec<'c>(connections: impl IntoIterator<Item = &'c Connection>) -> String {
    let mut spec = String::new();
    for c in connections {
        let _ = write!(spec, "M{},{}L{},{}", c.from_x, c.from_y, c.to_x, c.to_y);
    }
    spec
}

/// A person reached as root or child, with the spouses they brought into
/// the row. Everything below it lives inside `[left, left + width)`.
struct Block<'a> {
    generation: i32,
    members: Vec<&'a str>,
    parent: Option<usize>,
    /// Family handle and the child blocks hanging from it.
    families: Vec<(&'a str, Vec<usize>)>,
    children_width: f64,
    width: f64,
}

impl<'a> Block<'a> {
    fn new(owner: &'a str, generation: i32, parent: Option<usize>) -> Self {
        Self {
            generation,
            members: vec![owner],
            parent,
            families: Vec::new(),
            children_width: 0.0,
            width: 0.0,
        }
    }

    fn attach(&mut self, family: &'a str, child: usize) {
        match self.families.iter_mut().find(|(f, _)| *f == family) {
            Some((_, children)) => children.push(child),
            None => self.families.push((family, vec![child])),
        }
    }

    /// Owner's unions in declaration order, then each spouse's other unions.
    fn sort_families(&mut self, index: &GraphIndex<'a>) {
        let mut rank: HashMap<&str, usize> = HashMap::new();
        for member in &self.members {
            let Some(person) = index.person(member) else {
                continue;
            };
            for family in &person.families {
                let next = rank.len();
                rank.entry(family.as_str()).or_insert(next);
            }
        }
        self.families
            .sort_by_key(|(f, _)| rank.get(f).copied().unwrap_or(usize::MAX));
    }

    /// Left-to-right seat order of the couple group. A single spouse sits
    /// to the right. With more, the first union's spouse sits left and the
    /// others follow to the right in union order, matching the order their
    /// children are laid out in.
    fn seats(&self) -> Vec<&'a str> {
        if self.members.len() <= 2 {
            return self.members.clone();
        }
        let mut seats = vec![self.members[1], self.members[0]];
        seats.extend(self.members[2..].iter().copied());
        seats
    }
}

impl LayoutConfig {
    pub fn layout(&self, snapshot: &GraphSnapshot) -> LayoutResult {
        let index = snapshot.index();

        // Phase 1: generation rows, remembering how each person was reached
        let leveling = Leveling::compute(snapshot, self.unreachable);

        // Phase 2: placement forest of couple blocks
        let mut blocks = self.build_blocks(&index, &leveling);

        // Phase 3: subtree widths, bottom-up
        self.measure(&mut blocks);

        // Phase 4: absolute positions, top-down
        let (nodes, width) = self.place(&index, &leveling, &blocks);

        // Phase 5: couples and connectors
        let (couples, connections) = self.connect(snapshot, &nodes);

        let height = self.calculate_height(&nodes);
        debug!(
            people = snapshot.people.len(),
            nodes = nodes.len(),
            couples = couples.len(),
            width,
            height,
            "computed pedigree layout"
        );

        LayoutResult {
            nodes,
            connections,
            couples,
            width,
            height,
        }
    }

    fn build_blocks<'a>(&self, index: &GraphIndex<'a>, leveling: &Leveling) -> Vec<Block<'a>> {
        let mut blocks: Vec<Block<'a>> = Vec::with_capacity(leveling.len());
        let mut block_of: HashMap<&'a str, usize> = HashMap::with_capacity(leveling.len());

        for handle in leveling.order() {
            let (Some(person), Some(entry)) = (index.person(handle), leveling.get(handle)) else {
                continue;
            };
            let handle = person.handle.as_str();
            match &entry.reach {
                Reach::Spouse { partner } if block_of.contains_key(partner.as_str()) => {
                    let b = block_of[partner.as_str()];
                    blocks[b].members.push(handle);
                    block_of.insert(handle, b);
                }
                Reach::Child { parent, family } if block_of.contains_key(parent.as_str()) => {
                    let parent_block = block_of[parent.as_str()];
                    let family = index
                        .family(family)
                        .map(|f| f.handle.as_str())
                        .unwrap_or_default();
                    let b = blocks.len();
                    blocks.push(Block::new(handle, entry.generation, Some(parent_block)));
                    blocks[parent_block].attach(family, b);
                    block_of.insert(handle, b);
                }
                _ => {
                    let b = blocks.len();
                    blocks.push(Block::new(handle, entry.generation, None));
                    block_of.insert(handle, b);
                }
            }
        }

        for block in &mut blocks {
            block.sort_families(index);
        }
        blocks
    }

    fn measure(&self, blocks: &mut [Block<'_>]) {
        let slot = self.slot_width();
        // Children are always created after their parent block.
        for i in (0..blocks.len()).rev() {
            let children_width: f64 = blocks[i]
                .families
                .iter()
                .flat_map(|(_, children)| children)
                .map(|&c| blocks[c].width)
                .sum();
            let group_width = blocks[i].members.len() as f64 * slot;
            blocks[i].children_width = children_width;
            blocks[i].width = group_width.max(children_width);
        }
    }

    fn place(
        &self,
        index: &GraphIndex<'_>,
        leveling: &Leveling,
        blocks: &[Block<'_>],
    ) -> (Vec<PositionedNode>, f64) {
        let slot = self.slot_width();
        let mut lefts = vec![0.0; blocks.len()];
        let mut cursor = 0.0;
        for (i, block) in blocks.iter().enumerate() {
            if block.parent.is_none() {
                lefts[i] = cursor;
                cursor += block.width;
            }
        }

        let mut nodes = Vec::with_capacity(leveling.len());
        for (i, block) in blocks.iter().enumerate() {
            let left = lefts[i];
            let start = left + (block.width - block.children_width) / 2.0;
            let mut x = start;
            for (_, children) in &block.families {
                for &c in children {
                    lefts[c] = x;
                    x += blocks[c].width;
                }
            }

            let group_width = block.members.len() as f64 * slot;
            let group_left = if block.children_width > 0.0 {
                let center = start + block.children_width / 2.0;
                // Rounding can leave the block a hair narrower than its group.
                let right = (left + block.width - group_width).max(left);
                (center - group_width / 2.0).clamp(left, right)
            } else {
                left
            };

            for (seat, handle) in block.seats().into_iter().enumerate() {
                let Some(person) = index.person(handle) else {
                    continue;
                };
                let generation = leveling.generation(handle).unwrap_or(block.generation);
                nodes.push(PositionedNode {
                    node: person.clone(),
                    x: group_left + seat as f64 * slot + self.horizontal_spacing / 2.0,
                    y: generation as f64 * self.row_height(),
                    generation,
                });
            }
        }
        (nodes, cursor)
    }

    fn connect(
        &self,
        snapshot: &GraphSnapshot,
        nodes: &[PositionedNode],
    ) -> (Vec<PositionedCouple>, Vec<Connection>) {
        let placed: HashMap<&str, &PositionedNode> =
            nodes.iter().map(|n| (n.handle(), n)).collect();
        let center = |n: &PositionedNode| n.x + self.card_width / 2.0;

        let mut couples = Vec::new();
        let mut connections = Vec::new();
        for family in &snapshot.families {
            let father = family
                .father_handle
                .as_deref()
                .and_then(|h| placed.get(h).copied());
            let mother = family
                .mother_handle
                .as_deref()
                .and_then(|h| placed.get(h).copied());

            let (mid_x, y) = match (father, mother) {
                (Some(f), Some(m)) => {
                    let (l, r) = if f.x <= m.x { (f, m) } else { (m, f) };
                    connections.push(Connection {
                        kind: ConnectionKind::Couple,
                        from_x: l.x + self.card_width,
                        from_y: l.y + self.card_height / 2.0,
                        to_x: r.x,
                        to_y: r.y + self.card_height / 2.0,
                    });
                    ((center(f) + center(m)) / 2.0, f.y)
                }
                (Some(p), None) | (None, Some(p)) => (center(p), p.y),
                (None, None) => continue,
            };

            couples.push(PositionedCouple {
                family_handle: family.handle.clone(),
                father_pos: father.cloned(),
                mother_pos: mother.cloned(),
                mid_x,
                y,
            });

            for child in &family.children {
                let Some(c) = placed.get(child.as_str()) else {
                    continue;
                };
                connections.push(Connection {
                    kind: ConnectionKind::Parent,
                    from_x: mid_x,
                    from_y: y + self.card_height,
                    to_x: center(c),
                    to_y: c.y,
                });
            }
        }
        (couples, connections)
    }

    fn calculate_height(&self, nodes: &[PositionedNode]) -> f64 {
        nodes
            .iter()
            .map(|n| n.y + self.card_height)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Family, Person};

    fn two_marriages() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![
                Person::new("X", "X").patrilineal(true).in_families(["F1", "F2"]),
                Person::new("W1", "W1").in_families(["F1"]),
                Person::new("W2", "W2").in_families(["F2"]),
                Person::new("A", "A").patrilineal(true).child_of(["F1"]),
                Person::new("B", "B").patrilineal(true).child_of(["F1"]),
                Person::new("C", "C").patrilineal(true).child_of(["F2"]),
            ],
            vec![
                Family::new("F1").father("X").mother("W1").with_children(["A", "B"]),
                Family::new("F2").father("X").mother("W2").with_children(["C"]),
            ],
        )
    }

    fn span(layout: &LayoutResult, handles: &[&str]) -> (f64, f64) {
        handles
            .iter()
            .filter_map(|h| layout.node(h))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), n| {
                (lo.min(n.x), hi.max(n.x + CARD_W))
            })
    }

    #[test]
    fn test_two_marriages_place_person_once() {
        let layout = compute_layout(&two_marriages());

        assert_eq!(layout.nodes.iter().filter(|n| n.handle() == "X").count(), 1);
        assert_eq!(layout.nodes.len(), 6);
        assert_eq!(layout.connections_of(ConnectionKind::Couple).count(), 2);
        assert_eq!(layout.connections_of(ConnectionKind::Parent).count(), 3);

        let (_, f1_right) = span(&layout, &["A", "B"]);
        let (f2_left, _) = span(&layout, &["C"]);
        assert!(f1_right <= f2_left, "F1 subtree must end before F2 starts");

        // First wife on the left, second on the right of X.
        let x = layout.node("X").unwrap().x;
        assert!(layout.node("W1").unwrap().x < x);
        assert!(layout.node("W2").unwrap().x > x);
    }

    #[test]
    fn test_each_spouse_sits_beside_own_children() {
        let snapshot = GraphSnapshot::new(
            vec![
                Person::new("X", "X").patrilineal(true).in_families(["F1", "F2", "F3"]),
                Person::new("W1", "W1").in_families(["F1"]),
                Person::new("W2", "W2").in_families(["F2"]),
                Person::new("W3", "W3").in_families(["F3"]),
                Person::new("A", "A").patrilineal(true).child_of(["F1"]),
                Person::new("B", "B").patrilineal(true).child_of(["F2"]),
                Person::new("C", "C").patrilineal(true).child_of(["F3"]),
            ],
            vec![
                Family::new("F1").father("X").mother("W1").with_children(["A"]),
                Family::new("F2").father("X").mother("W2").with_children(["B"]),
                Family::new("F3").father("X").mother("W3").with_children(["C"]),
            ],
        );
        let layout = compute_layout(&snapshot);
        let x = |h: &str| layout.node(h).unwrap().x;

        assert!(x("W1") < x("X"));
        assert!(x("X") < x("W2") && x("W2") < x("W3"));
        assert!(x("A") < x("B") && x("B") < x("C"));
        for (spouse, child) in [("W1", "A"), ("W2", "B"), ("W3", "C")] {
            assert_eq!(
                (x(spouse) - x("X")).signum(),
                (x(child) - x("X")).signum(),
                "{spouse} and {child} on different sides"
            );
        }
    }

    #[test]
    fn test_fractional_card_width_places_every_couple() {
        let mut people = Vec::new();
        let mut families = Vec::new();
        for i in 0..4 {
            let family = format!("F{i}");
            people.extend([
                Person::new(format!("H{i}"), "H")
                    .patrilineal(true)
                    .in_families([family.clone()]),
                Person::new(format!("W{i}"), "W").in_families([family.clone()]),
                Person::new(format!("C{i}"), "C")
                    .patrilineal(true)
                    .child_of([family.clone()]),
            ]);
            families.push(
                Family::new(family)
                    .father(format!("H{i}"))
                    .mother(format!("W{i}"))
                    .with_children([format!("C{i}")]),
            );
        }
        let config = LayoutConfig {
            card_width: 150.7,
            ..Default::default()
        };
        let layout = config.layout(&GraphSnapshot::new(people, families));
        assert_eq!(layout.nodes.len(), 12);

        let mut top: Vec<f64> = layout
            .nodes
            .iter()
            .filter(|n| n.generation == 0)
            .map(|n| n.x)
            .collect();
        top.sort_by(f64::total_cmp);
        assert_eq!(top.len(), 8);
        for pair in top.windows(2) {
            assert!(pair[1] - pair[0] >= config.card_width - 1e-9, "cards overlap: {pair:?}");
        }
    }

    #[test]
    fn test_rows_follow_generations() {
        let layout = compute_layout(&two_marriages());
        let row = CARD_H + V_SPACING;
        assert_eq!(layout.node("X").unwrap().y, 0.0);
        assert_eq!(layout.node("W2").unwrap().y, 0.0);
        assert_eq!(layout.node("A").unwrap().y, row);
        assert_eq!(layout.node("C").unwrap().generation, 1);
        assert_eq!(layout.height, row + CARD_H);
    }

    #[test]
    fn test_couple_centered_over_children() {
        let snapshot = GraphSnapshot::new(
            vec![
                Person::new("P", "P").patrilineal(true).in_families(["F"]),
                Person::new("M", "M").in_families(["F"]),
                Person::new("C1", "C1").child_of(["F"]),
                Person::new("C2", "C2").child_of(["F"]),
                Person::new("C3", "C3").child_of(["F"]),
            ],
            vec![Family::new("F").father("P").mother("M").with_children(["C1", "C2", "C3"])],
        );
        let layout = compute_layout(&snapshot);
        let couple = &layout.couples[0];
        let (lo, hi) = span(&layout, &["C1", "C2", "C3"]);
        assert!((couple.mid_x - (lo + hi) / 2.0).abs() < 1e-9);
        assert_eq!(layout.width, 3.0 * (CARD_W + H_SPACING));
    }

    #[test]
    fn test_single_parent_family_draws_from_parent() {
        let snapshot = GraphSnapshot::new(
            vec![
                Person::new("M", "M").patrilineal(true).in_families(["F"]),
                Person::new("C", "C").child_of(["F"]),
            ],
            vec![Family::new("F").mother("M").with_children(["C"])],
        );
        let layout = compute_layout(&snapshot);
        let m = layout.node("M").unwrap();
        let parent: Vec<_> = layout.connections_of(ConnectionKind::Parent).collect();
        assert_eq!(parent.len(), 1);
        assert_eq!(parent[0].from_x, m.x + CARD_W / 2.0);
        assert_eq!(parent[0].from_y, m.y + CARD_H);
        assert_eq!(layout.connections_of(ConnectionKind::Couple).count(), 0);
        assert!(layout.couples[0].father_pos.is_none());
    }

    #[test]
    fn test_dangling_child_is_omitted() {
        let mut snapshot = two_marriages();
        snapshot.families[1].children.push("P999".into());
        let layout = compute_layout(&snapshot);
        assert!(layout.node("P999").is_none());
        assert_eq!(layout.nodes.len(), 6);
        assert_eq!(layout.connections_of(ConnectionKind::Parent).count(), 3);
    }

    #[test]
    fn test_unreachable_person_policy() {
        let mut snapshot = two_marriages();
        snapshot.people.push(Person::new("Z", "Loner"));

        let layout = compute_layout(&snapshot);
        let z = layout.node("Z").unwrap();
        assert_eq!(z.generation, 0);
        assert_eq!(z.y, 0.0);

        let omit = LayoutConfig {
            unreachable: crate::UnreachablePolicy::Omit,
            ..Default::default()
        };
        assert!(omit.layout(&snapshot).node("Z").is_none());
    }

    #[test]
    fn test_layout_is_deterministic() {
        let snapshot = two_marriages();
        assert_eq!(compute_layout(&snapshot), compute_layout(&snapshot));
    }

    #[test]
    fn test_path_spec_batches_segments() {
        let connections = [
            Connection {
                kind: ConnectionKind::Parent,
                from_x: 0.0,
                from_y: 1.0,
                to_x: 2.5,
                to_y: 3.0,
            },
            Connection {
                kind: ConnectionKind::Parent,
                from_x: 4.0,
                from_y: 5.0,
                to_x: 6.0,
                to_y: 7.0,
            },
        ];
        assert_eq!(path_spec(&connections), "M0,1L2.5,3M4,5L6,7");
    }
}
