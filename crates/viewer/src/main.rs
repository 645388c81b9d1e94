//! Command-line viewer: load a clan, drive the tree view the way a user
//! would and write out what the renderer would draw.
//!
//! ```text
//! giapha-viewer data/clan.kdl --link "view=descendant&person=P007" \
//!     --viewport 1280x720 --fit --svg /tmp/clan.svg --frame -
//! ```

mod snapshot;

use anyhow::{Context, Result, bail};
use clap::Parser;
use giapha_layout::{
    GraphSnapshot, SampleConfig, Scene, Size, SvgOptions, diagnose, generate_sample,
    render_document,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use treeview::{DeepLink, TreeView, ViewConfig, ViewMode, ZoomLevel};

const BUNDLED_CLAN: &str = include_str!("../data/clan.kdl");

#[derive(Parser, Debug)]
#[command(name = "giapha-viewer")]
#[command(about = "Lay out a family tree and render the visible frame")]
struct Args {
    /// Snapshot file (.kdl or .json). The bundled clan is used when absent
    /// or unreadable.
    input: Option<PathBuf>,

    /// Generate a synthetic clan instead of loading one
    #[arg(long, conflicts_with = "input")]
    sample: bool,

    /// Generation rows of the synthetic clan
    #[arg(long, default_value_t = 5)]
    generations: u32,

    /// Seed of the synthetic clan
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// ViewConfig as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deep-link query, e.g. "view=descendant&person=P007"
    #[arg(long)]
    link: Option<String>,

    /// Switch to this view mode after loading
    #[arg(long, value_parser = parse_mode)]
    mode: Option<ViewMode>,

    /// Focus person for --mode
    #[arg(long)]
    person: Option<String>,

    /// Viewport size as WIDTHxHEIGHT. Without it nothing is culled.
    #[arg(long, value_parser = parse_size)]
    viewport: Option<Size>,

    /// Fit the whole tree into the viewport
    #[arg(long)]
    fit: bool,

    /// Centre this person's card
    #[arg(long)]
    center: Option<String>,

    /// Zoom steps about the viewport centre; negative zooms out
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    zoom: i32,

    /// Drag by DX,DY screen pixels
    #[arg(long, value_parser = parse_offset, allow_hyphen_values = true)]
    pan: Option<(f64, f64)>,

    /// Expand every branch before applying toggles
    #[arg(long, conflicts_with = "collapse_all")]
    expand_all: bool,

    /// Collapse every branch before applying toggles
    #[arg(long)]
    collapse_all: bool,

    /// Toggle this person's branch (repeatable)
    #[arg(long)]
    toggle: Vec<String>,

    /// Print up to the configured limit of name matches
    #[arg(long)]
    search: Option<String>,

    /// Print head counts for the current view
    #[arg(long)]
    stats: bool,

    /// Write the render frame as JSON ("-" for stdout)
    #[arg(long)]
    frame: Option<PathBuf>,

    /// Write the culled frame as SVG
    #[arg(long)]
    svg: Option<PathBuf>,
}

fn parse_mode(s: &str) -> Result<ViewMode, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_size(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("Invalid size: {s}, expected WIDTHxHEIGHT"))?;
    let w: f64 = w.trim().parse().map_err(|_| format!("Invalid width: {w}"))?;
    let h: f64 = h.trim().parse().map_err(|_| format!("Invalid height: {h}"))?;
    Ok(Size::new(w, h))
}

fn parse_offset(s: &str) -> Result<(f64, f64), String> {
    let (dx, dy) = s
        .split_once(',')
        .ok_or_else(|| format!("Invalid offset: {s}, expected DX,DY"))?;
    let dx: f64 = dx.trim().parse().map_err(|_| format!("Invalid dx: {dx}"))?;
    let dy: f64 = dy.trim().parse().map_err(|_| format!("Invalid dy: {dy}"))?;
    Ok((dx, dy))
}

/// Input file, then the bundled clan, then a generated one.
fn load(args: &Args) -> GraphSnapshot {
    let sample = SampleConfig {
        generations: args.generations,
        seed: args.seed,
        ..Default::default()
    };
    if args.sample {
        return generate_sample(&sample);
    }
    if let Some(path) = &args.input {
        match snapshot::load_snapshot(path) {
            Ok(snapshot) => {
                info!(path = %path.display(), people = snapshot.people.len(), "loaded snapshot");
                return snapshot;
            }
            Err(err) => warn!(path = %path.display(), %err, "falling back to the bundled clan"),
        }
    }
    match snapshot::parse_kdl_snapshot(BUNDLED_CLAN) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(%err, "bundled clan is unreadable, generating one");
            generate_sample(&sample)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ViewConfig> {
    let Some(path) = path else {
        return Ok(ViewConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
}

fn write_svg(view: &mut TreeView, path: &Path) -> Result<()> {
    let layout = view.layout();
    let frame = view.frame();
    let size = view.viewport().container_size;
    let scene = Scene {
        nodes: &frame.visible_nodes,
        couples: &frame.visible_couples,
        parent_path: frame.visible_connections.parent_path.clone(),
        couple_path: frame.visible_connections.couple_path.clone(),
        width: layout.width,
        height: layout.height,
    };
    let options = SvgOptions {
        mini: frame.zoom_level == ZoomLevel::Mini,
        translate: (frame.transform.x, frame.transform.y),
        scale: frame.transform.scale,
        canvas: (!size.is_empty()).then_some(size),
    };
    let document = render_document(&scene, &view.config().layout, &options);
    svg::save(path, &document).with_context(|| format!("Failed to write {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let snapshot = load(&args);
    diagnose(&snapshot).log();

    let link = args.link.as_deref().map(DeepLink::parse).unwrap_or_default();
    let mut view = TreeView::from_deep_link(snapshot, config, &link);

    if let Some(mode) = args.mode {
        if let Some(person) = &args.person {
            if !view.set_focus(person) {
                bail!("Unknown person: {person}");
            }
        }
        view.set_view_mode(mode);
    }
    if args.expand_all {
        view.expand_all();
    }
    if args.collapse_all {
        view.collapse_all();
    }
    for handle in &args.toggle {
        if !view.has_children(handle) {
            warn!(%handle, "nothing to collapse");
        }
        view.toggle_collapse(handle);
    }

    if let Some(size) = args.viewport {
        view.resize(size);
    }
    if args.fit {
        view.fit_all();
    }
    if let Some(handle) = &args.center {
        if !view.pan_to_person(handle) {
            bail!("{handle} is not in the current view");
        }
    }
    for _ in 0..args.zoom.unsigned_abs() {
        if args.zoom > 0 {
            view.viewport_mut().zoom_in();
        } else {
            view.viewport_mut().zoom_out();
        }
    }
    if let Some((dx, dy)) = args.pan {
        let viewport = view.viewport_mut();
        viewport.pointer_down(0.0, 0.0);
        viewport.pointer_move(dx, dy);
        viewport.pointer_up();
    }

    if let Some(query) = &args.search {
        for person in view.search(query) {
            println!("{}\t{}", person.handle, person.display_name);
        }
    }
    if args.stats {
        println!("{}", serde_json::to_string_pretty(&view.stats())?);
    }

    let frame = view.frame();
    info!(
        mode = %view.view_mode(),
        link = %view.deep_link().to_query(),
        nodes = frame.visible_nodes.len(),
        collapsed = frame.branch_summaries.len(),
        zoom = ?frame.zoom_level,
        "frame ready"
    );

    if let Some(path) = &args.frame {
        let json = serde_json::to_string_pretty(&frame)?;
        if path.as_os_str() == "-" {
            println!("{json}");
        } else {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }
    if let Some(path) = &args.svg {
        write_svg(&mut view, path)?;
        info!(path = %path.display(), "wrote svg");
    }
    Ok(())
}
