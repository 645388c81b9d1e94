//! Pan/zoom transform, level of detail and viewport culling.

use giapha_layout::{
    Connection, ConnectionKind, LayoutConfig, LayoutResult, PositionedCouple, PositionedNode, Size,
    path_spec,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MIN_SCALE: f64 = 0.15;
pub const MAX_SCALE: f64 = 3.0;
pub const FIT_MIN_SCALE: f64 = 0.12;
pub const FIT_MAX_SCALE: f64 = 1.2;
pub const FIT_PADDING: f64 = 40.0;
/// Tree-space slack around the viewport when culling.
pub const CULL_PAD: f64 = 300.0;
pub const WHEEL_ZOOM_IN: f64 = 1.1;
pub const WHEEL_ZOOM_OUT: f64 = 0.9;

/// Screen = tree × scale + (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn new(x: f64, y: f64, scale: f64) -> Self {
        Self { x, y, scale }
    }

    /// Scale clamped to the interactive range. Non-finite or non-positive
    /// requests keep the current scale.
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        if !scale.is_finite() || scale <= 0.0 {
            return self.scale;
        }
        scale.clamp(MIN_SCALE, MAX_SCALE)
    }

    /// Zoom to `scale` keeping screen point `(px, py)` fixed.
    pub fn zoom_about(&self, scale: f64, px: f64, py: f64) -> Self {
        let current = self.sanitized();
        let scale = current.clamp_scale(scale);
        if !px.is_finite() || !py.is_finite() {
            return Self { scale, ..current };
        }
        let ratio = scale / current.scale;
        Self {
            x: px - (px - current.x) * ratio,
            y: py - (py - current.y) * ratio,
            scale,
        }
    }

    /// Copy safe to divide by: a non-finite or non-positive scale becomes
    /// 1 and non-finite offsets become 0. Valid values pass through
    /// unclamped since fitting may go below `MIN_SCALE`.
    pub fn sanitized(&self) -> Self {
        let finite_or_zero = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            x: finite_or_zero(self.x),
            y: finite_or_zero(self.y),
            scale: if self.scale.is_finite() && self.scale > 0.0 {
                self.scale
            } else {
                1.0
            },
        }
    }

    pub fn to_tree(&self, sx: f64, sy: f64) -> (f64, f64) {
        ((sx - self.x) / self.scale, (sy - self.y) / self.scale)
    }

    pub fn zoom_level(&self) -> ZoomLevel {
        ZoomLevel::for_scale(self.scale)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomLevel {
    #[default]
    Full,
    Compact,
    Mini,
}

impl ZoomLevel {
    pub fn for_scale(scale: f64) -> Self {
        if scale > 0.6 {
            ZoomLevel::Full
        } else if scale > 0.3 {
            ZoomLevel::Compact
        } else {
            ZoomLevel::Mini
        }
    }
}

/// Axis-aligned rectangle in tree space, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    pub fn intersects_box(&self, x: f64, y: f64, width: f64, height: f64) -> bool {
        x + width >= self.left && x <= self.right && y + height >= self.top && y <= self.bottom
    }
}

/// Tree-space rectangle the viewport shows, grown by `pad` tree units.
pub fn visible_rect(transform: &Transform, viewport: Size, pad: f64) -> Rect {
    let transform = transform.sanitized();
    let (left, top) = transform.to_tree(0.0, 0.0);
    let (right, bottom) = transform.to_tree(viewport.width, viewport.height);
    Rect {
        left: left - pad,
        top: top - pad,
        right: right + pad,
        bottom: bottom + pad,
    }
}

/// Transform showing a `content` sized tree centred in `viewport`.
pub fn fit_to_view(content: Size, viewport: Size) -> Transform {
    let tw = content.width + FIT_PADDING * 2.0;
    let th = content.height + FIT_PADDING * 2.0;
    let scale = (viewport.width / tw)
        .min(viewport.height / th)
        .min(FIT_MAX_SCALE)
        .max(FIT_MIN_SCALE);
    Transform {
        x: (viewport.width - content.width * scale) / 2.0,
        y: (viewport.height - content.height * scale) / 2.0,
        scale,
    }
}

/// The subset of a layout worth drawing at the current transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CulledLayout {
    pub nodes: Vec<PositionedNode>,
    pub parent_path: String,
    pub couple_path: String,
    pub couples: Vec<PositionedCouple>,
}

pub fn cull(
    layout: &LayoutResult,
    config: &LayoutConfig,
    transform: &Transform,
    viewport: Size,
) -> CulledLayout {
    if viewport.is_empty() {
        return CulledLayout {
            nodes: layout.nodes.clone(),
            parent_path: path_spec(layout.connections_of(ConnectionKind::Parent)),
            couple_path: path_spec(layout.connections_of(ConnectionKind::Couple)),
            couples: layout.couples.clone(),
        };
    }

    let rect = visible_rect(transform, viewport, CULL_PAD);
    let nodes: Vec<PositionedNode> = layout
        .nodes
        .iter()
        .filter(|n| rect.intersects_box(n.x, n.y, config.card_width, config.card_height))
        .cloned()
        .collect();
    let shown: HashSet<&str> = nodes.iter().map(|n| n.handle()).collect();

    let parent_path = path_spec(connections_in(layout, rect, ConnectionKind::Parent));
    let couple_path = path_spec(connections_in(layout, rect, ConnectionKind::Couple));

    let couples = layout
        .couples
        .iter()
        .filter(|c| {
            c.father_pos
                .iter()
                .chain(c.mother_pos.iter())
                .any(|p| shown.contains(p.handle()))
        })
        .cloned()
        .collect();

    CulledLayout {
        nodes,
        parent_path,
        couple_path,
        couples,
    }
}

/// Connections with at least one endpoint inside `rect`.
fn connections_in(
    layout: &LayoutResult,
    rect: Rect,
    kind: ConnectionKind,
) -> impl Iterator<Item = &Connection> {
    layout
        .connections_of(kind)
        .filter(move |c| rect.contains(c.from_x, c.from_y) || rect.contains(c.to_x, c.to_y))
}

/// Interactive pan/zoom state. Gestures only ever touch the transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Viewport {
    pub transform: Transform,
    pub container_size: Size,
    pub is_panning: bool,
    pan_start: (f64, f64),
    pan_start_pos: (f64, f64),
    pinch_start_distance: f64,
    pinch_start_scale: f64,
}

impl Viewport {
    pub fn new(container_size: Size) -> Self {
        Self {
            container_size,
            ..Default::default()
        }
    }

    pub fn resize(&mut self, container_size: Size) {
        self.container_size = container_size;
    }

    pub fn zoom_level(&self) -> ZoomLevel {
        self.transform.zoom_level()
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.is_panning = true;
        self.pan_start = (self.transform.x, self.transform.y);
        self.pan_start_pos = (x, y);
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) {
        if !self.is_panning || !x.is_finite() || !y.is_finite() {
            return;
        }
        self.transform.x = self.pan_start.0 + (x - self.pan_start_pos.0);
        self.transform.y = self.pan_start.1 + (y - self.pan_start_pos.1);
    }

    pub fn pointer_up(&mut self) {
        self.is_panning = false;
    }

    /// Wheel step about the cursor: scrolling down zooms out.
    pub fn wheel(&mut self, delta_y: f64, cursor_x: f64, cursor_y: f64) {
        let factor = if delta_y > 0.0 {
            WHEEL_ZOOM_OUT
        } else {
            WHEEL_ZOOM_IN
        };
        self.transform = self
            .transform
            .zoom_about(self.transform.scale * factor, cursor_x, cursor_y);
    }

    /// Touches are screen points. One finger pans, two pinch.
    pub fn touch_start(&mut self, touches: &[(f64, f64)]) {
        match touches {
            [(x, y)] => self.pointer_down(*x, *y),
            [a, b, ..] => {
                self.is_panning = false;
                self.pinch_start_distance = (a.0 - b.0).hypot(a.1 - b.1);
                self.pinch_start_scale = self.transform.scale;
            }
            [] => {}
        }
    }

    pub fn touch_move(&mut self, touches: &[(f64, f64)]) {
        match touches {
            [(x, y)] => self.pointer_move(*x, *y),
            [a, b, ..] => {
                if self.pinch_start_distance <= 0.0 {
                    return;
                }
                let distance = (a.0 - b.0).hypot(a.1 - b.1);
                let ratio = distance / self.pinch_start_distance;
                let mid = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
                self.transform = self
                    .transform
                    .zoom_about(self.pinch_start_scale * ratio, mid.0, mid.1);
            }
            [] => {}
        }
    }

    pub fn touch_end(&mut self) {
        self.is_panning = false;
        self.pinch_start_distance = 0.0;
    }

    fn zoom_about_center(&mut self, factor: f64) {
        let (cx, cy) = (
            self.container_size.width / 2.0,
            self.container_size.height / 2.0,
        );
        self.transform = self
            .transform
            .zoom_about(self.transform.scale * factor, cx, cy);
    }

    pub fn zoom_in(&mut self) {
        self.zoom_about_center(WHEEL_ZOOM_IN);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_about_center(WHEEL_ZOOM_OUT);
    }

    pub fn set_transform(&mut self, transform: Transform) {
        if transform.x.is_finite() && transform.y.is_finite() {
            let scale = self.transform.clamp_scale(transform.scale);
            self.transform = Transform { scale, ..transform };
        }
    }

    /// Fit the whole tree into the container. The fit scale may go below
    /// the interactive minimum for very large trees.
    pub fn fit_to_content(&mut self, content: Size) {
        if self.container_size.is_empty() {
            return;
        }
        self.transform = fit_to_view(content, self.container_size);
    }

    /// Centre the card at `(x, y)` keeping the current scale.
    pub fn pan_to(&mut self, x: f64, y: f64, card: Size) {
        let scale = self.transform.scale;
        self.transform.x = self.container_size.width / 2.0 - (x + card.width / 2.0) * scale;
        self.transform.y = self.container_size.height / 2.0 - (y + card.height / 2.0) * scale;
    }
}
