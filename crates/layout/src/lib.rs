//! Pedigree layout: generation leveling, block placement, sub-graph filters
//! and a few read-only passes over the same snapshot.

mod diagnose;
mod filter;
mod generation;
mod layout;
mod model;
mod render;
mod sample;
mod stats;
mod types;

pub use diagnose::{DanglingRef, Diagnostics, RefKind, diagnose};
pub use filter::{filter_ancestors, filter_descendants};
pub use generation::{
    Generations, Leveled, Leveling, Reach, UnreachablePolicy, assign_generations,
};
pub use layout::{compute_layout, path_spec};
pub use model::{Family, Gender, GraphIndex, GraphSnapshot, Person};
pub use sample::{SampleConfig, generate_sample};
pub use stats::{GenerationCount, TreeStats};
pub use render::{Scene, SvgOptions, generate_svg, render_document};
pub use types::*;
