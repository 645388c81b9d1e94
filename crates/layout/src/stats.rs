use crate::types::LayoutResult;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerationCount {
    pub generation: i32,
    pub count: usize,
}

/// Head counts over a laid-out tree, for the overview panel and the
/// generation row headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeStats {
    pub total: usize,
    pub total_families: usize,
    pub total_generations: usize,
    /// Ascending by generation.
    pub per_generation: Vec<GenerationCount>,
    pub living_count: usize,
    pub deceased_count: usize,
    pub patrilineal_count: usize,
    pub non_patrilineal_count: usize,
}

impl TreeStats {
    /// `families` is the snapshot's family count; placed nodes give the rest.
    pub fn from_layout(layout: &LayoutResult, families: usize) -> Self {
        let mut per_generation: BTreeMap<i32, usize> = BTreeMap::new();
        let mut stats = Self {
            total: layout.nodes.len(),
            total_families: families,
            ..Default::default()
        };
        for n in &layout.nodes {
            *per_generation.entry(n.generation).or_default() += 1;
            if n.node.is_living {
                stats.living_count += 1;
            } else {
                stats.deceased_count += 1;
            }
            if n.node.is_patrilineal {
                stats.patrilineal_count += 1;
            } else {
                stats.non_patrilineal_count += 1;
            }
        }
        stats.total_generations = per_generation.len();
        stats.per_generation = per_generation
            .into_iter()
            .map(|(generation, count)| GenerationCount { generation, count })
            .collect();
        stats
    }

    pub fn count_in(&self, generation: i32) -> usize {
        self.per_generation
            .iter()
            .find(|g| g.generation == generation)
            .map_or(0, |g| g.count)
    }
}
