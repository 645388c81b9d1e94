use crate::layout::path_spec;
use crate::model::Gender;
use crate::types::*;
use std::path::Path;
use svg::Document;
use svg::node::element::{Circle, Group, Path as SvgPath, Rectangle, Text};

/// What gets drawn: person cards, couple markers and the two batched
/// connector paths, inside a `width` × `height` tree-space canvas.
#[derive(Debug, Clone)]
pub struct Scene<'a> {
    pub nodes: &'a [PositionedNode],
    pub couples: &'a [PositionedCouple],
    pub parent_path: String,
    pub couple_path: String,
    pub width: f64,
    pub height: f64,
}

impl<'a> Scene<'a> {
    pub fn from_layout(result: &'a LayoutResult) -> Self {
        Self {
            nodes: &result.nodes,
            couples: &result.couples,
            parent_path: path_spec(result.connections_of(ConnectionKind::Parent)),
            couple_path: path_spec(result.connections_of(ConnectionKind::Couple)),
            width: result.width,
            height: result.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgOptions {
    /// Dots instead of cards, for far zoom levels.
    pub mini: bool,
    pub translate: (f64, f64),
    pub scale: f64,
    /// Output size; the scene size when unset.
    pub canvas: Option<Size>,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            mini: false,
            translate: (0.0, 0.0),
            scale: 1.0,
            canvas: None,
        }
    }
}

fn card_colors(gender: Gender, patrilineal: bool) -> (&'static str, &'static str) {
    let fill = match gender {
        Gender::Male => "#dbeafe",
        Gender::Female => "#fce7f3",
        Gender::Unknown => "#f5f5f4",
    };
    let stroke = if patrilineal { "#b45309" } else { "#a8a29e" };
    (fill, stroke)
}

fn years(node: &PositionedNode) -> Option<String> {
    match (node.node.birth_year, node.node.death_year) {
        (None, None) => None,
        (Some(b), None) if node.node.is_living => Some(format!("{b}")),
        (b, d) => Some(format!(
            "{} - {}",
            b.map_or("?".to_string(), |y| y.to_string()),
            d.map_or("?".to_string(), |y| y.to_string())
        )),
    }
}

pub fn render_document(scene: &Scene<'_>, config: &LayoutConfig, options: &SvgOptions) -> Document {
    let canvas = options
        .canvas
        .unwrap_or_else(|| Size::new(scene.width, scene.height));
    let (tx, ty) = options.translate;

    let mut tree = Group::new()
        .set("transform", format!("translate({tx},{ty}) scale({})", options.scale))
        .add(
            SvgPath::new()
                .set("d", scene.parent_path.as_str())
                .set("stroke", "#78716c")
                .set("stroke-width", 1.5)
                .set("fill", "none"),
        )
        .add(
            SvgPath::new()
                .set("d", scene.couple_path.as_str())
                .set("stroke", "#dc2626")
                .set("stroke-width", 2)
                .set("fill", "none"),
        );

    for couple in scene.couples {
        tree = tree.add(
            Circle::new()
                .set("cx", couple.mid_x)
                .set("cy", couple.y + config.card_height / 2.0)
                .set("r", 4)
                .set("fill", "#dc2626"),
        );
    }

    for node in scene.nodes {
        let (fill, stroke) = card_colors(node.node.gender, node.node.is_patrilineal);
        if options.mini {
            tree = tree.add(
                Circle::new()
                    .set("cx", node.x + config.card_width / 2.0)
                    .set("cy", node.y + config.card_height / 2.0)
                    .set("r", 8)
                    .set("fill", fill)
                    .set("stroke", stroke),
            );
            continue;
        }

        let mut card = Group::new()
            .set("data-handle", node.handle())
            .add(
                Rectangle::new()
                    .set("x", node.x)
                    .set("y", node.y)
                    .set("width", config.card_width)
                    .set("height", config.card_height)
                    .set("rx", 8)
                    .set("fill", fill)
                    .set("stroke", stroke)
                    .set("stroke-width", if node.node.is_patrilineal { 2 } else { 1 }),
            )
            .add(
                Text::new(node.node.display_name.clone())
                    .set("x", node.x + config.card_width / 2.0)
                    .set("y", node.y + config.card_height / 2.0 - 4.0)
                    .set("text-anchor", "middle")
                    .set("font-family", "Helvetica, Arial, sans-serif")
                    .set("font-size", 13)
                    .set("fill", "#1c1917"),
            );
        if let Some(years) = years(node) {
            card = card.add(
                Text::new(years)
                    .set("x", node.x + config.card_width / 2.0)
                    .set("y", node.y + config.card_height / 2.0 + 14.0)
                    .set("text-anchor", "middle")
                    .set("font-family", "Helvetica, Arial, sans-serif")
                    .set("font-size", 10)
                    .set("fill", "#57534e"),
            );
        }
        tree = tree.add(card);
    }

    Document::new()
        .set("viewBox", (0.0, 0.0, canvas.width, canvas.height))
        .set("width", canvas.width)
        .set("height", canvas.height)
        .add(
            Rectangle::new()
                .set("width", "100%")
                .set("height", "100%")
                .set("fill", "white"),
        )
        .add(tree)
}

/// Render a whole layout at scale 1 and write it to `filename`.
pub fn generate_svg(
    result: &LayoutResult,
    config: &LayoutConfig,
    filename: impl AsRef<Path>,
) -> std::io::Result<()> {
    let document = render_document(&Scene::from_layout(result), config, &SvgOptions::default());
    svg::save(filename, &document)
}
