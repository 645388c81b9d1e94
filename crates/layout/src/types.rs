use crate::generation::UnreachablePolicy;
use crate::model::Person;
use serde::{Deserialize, Serialize};

pub const CARD_W: f64 = 180.0;
pub const CARD_H: f64 = 80.0;
pub const H_SPACING: f64 = 20.0;
pub const V_SPACING: f64 = 80.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A person card placed in tree space. `x`/`y` is the card's top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedNode {
    pub node: Person,
    pub x: f64,
    pub y: f64,
    pub generation: i32,
}

impl PositionedNode {
    pub fn handle(&self) -> &str {
        &self.node.handle
    }
}

/// Midpoint marker of a union, for drawing the couple symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedCouple {
    pub family_handle: String,
    pub father_pos: Option<PositionedNode>,
    pub mother_pos: Option<PositionedNode>,
    pub mid_x: f64,
    pub y: f64,
}

impl PositionedCouple {
    pub fn has_parent(&self, handle: &str) -> bool {
        self.father_pos
            .iter()
            .chain(self.mother_pos.iter())
            .any(|p| p.handle() == handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Parent,
    Couple,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutResult {
    pub nodes: Vec<PositionedNode>,
    pub connections: Vec<Connection>,
    pub couples: Vec<PositionedCouple>,
    pub width: f64,
    pub height: f64,
}

impl LayoutResult {
    pub fn node(&self, handle: &str) -> Option<&PositionedNode> {
        self.nodes.iter().find(|n| n.handle() == handle)
    }

    pub fn connections_of(&self, kind: ConnectionKind) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.kind == kind)
    }
}

/// Card geometry and leniency knobs for [`LayoutConfig::layout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub card_width: f64,
    pub card_height: f64,
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
    pub unreachable: UnreachablePolicy,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            card_width: CARD_W,
            card_height: CARD_H,
            horizontal_spacing: H_SPACING,
            vertical_spacing: V_SPACING,
            unreachable: UnreachablePolicy::default(),
        }
    }
}

impl LayoutConfig {
    /// Horizontal room one card takes, spacing included.
    pub fn slot_width(&self) -> f64 {
        self.card_width + self.horizontal_spacing
    }

    /// Distance between two generation rows.
    pub fn row_height(&self) -> f64 {
        self.card_height + self.vertical_spacing
    }

    pub fn card_size(&self) -> Size {
        Size::new(self.card_width, self.card_height)
    }
}
