use giapha_layout::*;
use proptest::prelude::*;
use std::collections::HashMap;

fn svg_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("giapha_{name}.svg"))
}

fn overlapping_pair(layout: &LayoutResult, config: &LayoutConfig) -> Option<(String, String)> {
    for (i, a) in layout.nodes.iter().enumerate() {
        for b in &layout.nodes[i + 1..] {
            let x_overlap = a.x < b.x + config.card_width && b.x < a.x + config.card_width;
            let y_overlap = a.y < b.y + config.card_height && b.y < a.y + config.card_height;
            if x_overlap && y_overlap {
                return Some((a.handle().to_string(), b.handle().to_string()));
            }
        }
    }
    None
}

fn check_generation_steps(snapshot: &GraphSnapshot, layout: &LayoutResult) {
    let placed: HashMap<&str, i32> = layout
        .nodes
        .iter()
        .map(|n| (n.handle(), n.generation))
        .collect();
    for family in &snapshot.families {
        let Some(parent) = family.parents().find_map(|p| placed.get(p)) else {
            continue;
        };
        for child in &family.children {
            if let Some(generation) = placed.get(child.as_str()) {
                assert_eq!(*generation, parent + 1, "child {child} of {}", family.handle);
            }
        }
    }
}

#[test]
fn test_layout_sample_clan() {
    let snapshot = generate_sample(&SampleConfig::default());
    let config = LayoutConfig::default();
    let layout = config.layout(&snapshot);

    println!(
        "{} people, {} families, canvas {}x{}",
        snapshot.people.len(),
        snapshot.families.len(),
        layout.width,
        layout.height
    );

    assert_eq!(layout.nodes.len(), snapshot.people.len());
    assert_eq!(overlapping_pair(&layout, &config), None);
    check_generation_steps(&snapshot, &layout);
    for node in &layout.nodes {
        assert!(node.x >= 0.0 && node.x + config.card_width <= layout.width);
        assert!(node.y + config.card_height <= layout.height);
    }

    generate_svg(&layout, &config, svg_path("sample_clan")).unwrap();
}

#[test]
fn test_layout_agrees_with_generation_map() {
    let snapshot = generate_sample(&SampleConfig {
        generations: 6,
        seed: 11,
        ..Default::default()
    });
    let generations = assign_generations(&snapshot);
    let layout = compute_layout(&snapshot);
    for node in &layout.nodes {
        assert_eq!(generations.get(node.handle()), Some(&node.generation));
        assert_eq!(node.y, node.generation as f64 * (CARD_H + V_SPACING));
    }
}

#[test]
fn test_layout_filtered_views() {
    // A married son of the founder's line, from the first seed that has one.
    let (snapshot, focus) = (0..64)
        .find_map(|seed| {
            let snapshot = generate_sample(&SampleConfig {
                seed,
                ..Default::default()
            });
            let focus = snapshot
                .people
                .iter()
                .find(|p| !p.parent_families.is_empty() && !p.families.is_empty())?
                .handle
                .clone();
            Some((snapshot, focus))
        })
        .unwrap();
    let config = LayoutConfig::default();

    let descendants = filter_descendants(&focus, &snapshot);
    let down = config.layout(&descendants);
    assert_eq!(down.node(&focus).unwrap().generation, 0);
    assert_eq!(overlapping_pair(&down, &config), None);

    let ancestors = filter_ancestors(&focus, &snapshot);
    let up = config.layout(&ancestors);
    assert!(up.node(&focus).unwrap().generation > 0);
    assert_eq!(overlapping_pair(&up, &config), None);

    println!(
        "focus {focus}: {} descendants view, {} ancestors view",
        down.nodes.len(),
        up.nodes.len()
    );
    generate_svg(&down, &config, svg_path("descendants")).unwrap();
    generate_svg(&up, &config, svg_path("ancestors")).unwrap();
}

#[test]
fn test_layout_empty_snapshot() {
    let layout = compute_layout(&GraphSnapshot::default());
    assert!(layout.nodes.is_empty());
    assert_eq!((layout.width, layout.height), (0.0, 0.0));
}

#[test]
fn test_layout_json_round_trip() {
    let snapshot = generate_sample(&SampleConfig {
        generations: 3,
        ..Default::default()
    });
    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: GraphSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(compute_layout(&parsed), compute_layout(&snapshot));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_no_overlap(
        seed in any::<u64>(),
        generations in 1u32..6,
        max_children in 1u32..5,
        second_marriage_rate in 0.0f64..0.6,
    ) {
        let snapshot = generate_sample(&SampleConfig {
            generations,
            max_children,
            second_marriage_rate,
            seed,
            ..Default::default()
        });
        let config = LayoutConfig::default();
        let layout = config.layout(&snapshot);
        prop_assert_eq!(overlapping_pair(&layout, &config), None);
        prop_assert_eq!(layout.nodes.len(), snapshot.people.len());
        check_generation_steps(&snapshot, &layout);
    }

    #[test]
    fn prop_focus_is_in_both_projections(seed in any::<u64>(), pick in any::<prop::sample::Index>()) {
        let snapshot = generate_sample(&SampleConfig { generations: 4, seed, ..Default::default() });
        let focus = &snapshot.people[pick.index(snapshot.people.len())].handle;
        prop_assert!(filter_descendants(focus, &snapshot).person(focus).is_some());
        prop_assert!(filter_ancestors(focus, &snapshot).person(focus).is_some());
    }
}
