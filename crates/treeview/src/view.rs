//! View mode, focus and deep-link state, plus the staged pipeline that
//! turns a snapshot into a [`RenderFrame`].
//!
//! Every stage is memoized on the inputs it reads, so a pan only re-culls
//! and a collapse toggle never re-levels the full tree.

use crate::collapse::{
    AUTO_COLLAPSE_GEN, BranchSummary, CollapseState, branch_summary, hidden_handles,
    visible_snapshot,
};
use crate::edit::{Edit, EditError, EditFailure, EditId, EditJournal, EditSink, WriteFailurePolicy};
use crate::viewport::{CulledLayout, Transform, Viewport, ZoomLevel, cull};
use giapha_layout::{
    Generations, GraphSnapshot, LayoutConfig, LayoutResult, Person, PositionedCouple,
    PositionedNode, Size, TreeStats, assign_generations, filter_ancestors, filter_descendants,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Full,
    Ancestor,
    Descendant,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Full => "full",
            ViewMode::Ancestor => "ancestor",
            ViewMode::Descendant => "descendant",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown view mode: {0}")]
pub struct UnknownViewMode(pub String);

impl FromStr for ViewMode {
    type Err = UnknownViewMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ViewMode::Full),
            "ancestor" => Ok(ViewMode::Ancestor),
            "descendant" => Ok(ViewMode::Descendant),
            other => Err(UnknownViewMode(other.to_string())),
        }
    }
}

/// The `view` and `person` query parameters of a shareable tree URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeepLink {
    pub view: Option<ViewMode>,
    pub person: Option<String>,
}

impl DeepLink {
    /// Accepts a bare query (`view=..&person=..`), a query with its leading
    /// `?`, or a path with a query. Unknown keys and view names are ignored.
    pub fn parse(query: &str) -> Self {
        let query = query.split_once('?').map_or(query, |(_, q)| q);
        let mut link = DeepLink::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "view" => link.view = value.parse().ok(),
                "person" if !value.is_empty() => link.person = Some(value.into_owned()),
                _ => {}
            }
        }
        link
    }

    pub fn to_query(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(view) = self.view {
            query.append_pair("view", view.as_str());
        }
        if let Some(person) = &self.person {
            query.append_pair("person", person);
        }
        query.finish()
    }
}

/// Everything the view needs besides the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewConfig {
    pub auto_collapse_generation: i32,
    pub layout: LayoutConfig,
    pub write_failure: WriteFailurePolicy,
    pub search_limit: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            auto_collapse_generation: AUTO_COLLAPSE_GEN,
            layout: LayoutConfig::default(),
            write_failure: WriteFailurePolicy::default(),
            search_limit: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisibleConnections {
    #[serde(rename = "parentPathSpec")]
    pub parent_path: String,
    #[serde(rename = "couplePathSpec")]
    pub couple_path: String,
}

/// What the renderer draws for one transform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderFrame {
    pub visible_nodes: Vec<PositionedNode>,
    pub visible_connections: VisibleConnections,
    pub visible_couples: Vec<PositionedCouple>,
    pub branch_summaries: BTreeMap<String, BranchSummary>,
    pub zoom_level: ZoomLevel,
    pub transform: Transform,
}

/// Single-slot cache: recompute only when the key changes.
#[derive(Debug)]
struct Memo<K, V> {
    entry: Option<(K, V)>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<K: PartialEq, V: Clone> Memo<K, V> {
    fn get_or_update(&mut self, key: K, compute: impl FnOnce() -> V) -> V {
        match &self.entry {
            Some((cached, value)) if *cached == key => value.clone(),
            _ => {
                let value = compute();
                self.entry = Some((key, value.clone()));
                value
            }
        }
    }
}

type ProjectionKey = (u64, ViewMode, Option<String>);
type HiddenKey = (u64, u64);
type LayoutKey = (u64, ViewMode, Option<String>, u64);
type CullKey = (LayoutKey, Transform, Size);

#[derive(Debug, Default)]
struct Stages {
    generations: Memo<u64, Arc<Generations>>,
    projection: Memo<ProjectionKey, Arc<GraphSnapshot>>,
    hidden: Memo<HiddenKey, Arc<HashSet<String>>>,
    summaries: Memo<HiddenKey, Arc<BTreeMap<String, BranchSummary>>>,
    layout: Memo<LayoutKey, Arc<LayoutResult>>,
    culled: Memo<CullKey, Arc<CulledLayout>>,
}

/// The interactive tree: snapshot, view mode, focus, collapsed branches
/// and viewport, with a memoized path to each derived stage.
#[derive(Debug)]
pub struct TreeView {
    config: ViewConfig,
    journal: EditJournal,
    mode: ViewMode,
    focus: Option<String>,
    collapse: CollapseState,
    viewport: Viewport,
    stages: Stages,
}

impl TreeView {
    /// Panoramic view of the whole tree.
    pub fn new(snapshot: impl Into<Arc<GraphSnapshot>>, config: ViewConfig) -> Self {
        Self::from_deep_link(snapshot, config, &DeepLink::default())
    }

    pub fn from_deep_link(
        snapshot: impl Into<Arc<GraphSnapshot>>,
        config: ViewConfig,
        link: &DeepLink,
    ) -> Self {
        let journal = EditJournal::new(snapshot.into(), config.write_failure);
        let mut view = Self {
            config,
            journal,
            mode: link.view.unwrap_or_default(),
            focus: None,
            collapse: CollapseState::default(),
            viewport: Viewport::default(),
            stages: Stages::default(),
        };
        if let Some(person) = link.person.as_deref().filter(|p| !view.set_focus(p)) {
            debug!(person, "deep link names an unknown person");
        }
        match (link.view, view.focus.clone()) {
            (None | Some(ViewMode::Full), _) => view.auto_collapse_panoramic(),
            (Some(ViewMode::Descendant), Some(focus)) => view.auto_collapse_descendants(&focus),
            _ => {}
        }
        debug!(mode = %view.mode, focus = ?view.focus, collapsed = view.collapse.len(), "tree view opened");
        view
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &Arc<GraphSnapshot> {
        self.journal.current()
    }

    pub fn journal(&self) -> &EditJournal {
        &self.journal
    }

    pub fn view_mode(&self) -> ViewMode {
        self.mode
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    pub fn collapse_state(&self) -> &CollapseState {
        &self.collapse
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Gesture handlers go straight to the viewport; only culling depends
    /// on what they change.
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn resize(&mut self, size: Size) {
        self.viewport.resize(size);
    }

    /// Returns false, leaving the focus alone, for an unknown handle.
    pub fn set_focus(&mut self, handle: &str) -> bool {
        if self.journal.current().person(handle).is_none() {
            return false;
        }
        self.focus = Some(handle.to_string());
        true
    }

    /// Switch modes and apply the matching collapse policy. A focused mode
    /// without a focus falls back to the first person.
    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if mode != ViewMode::Full && self.focus.is_none() {
            self.focus = self.journal.current().people.first().map(|p| p.handle.clone());
        }
        self.mode = mode;
        match mode {
            ViewMode::Full => self.auto_collapse_panoramic(),
            ViewMode::Descendant => {
                if let Some(focus) = self.focus.clone() {
                    self.auto_collapse_descendants(&focus);
                }
            }
            ViewMode::Ancestor => self.collapse.expand_all(),
        }
        debug!(%mode, focus = ?self.focus, "view mode changed");
    }

    pub fn show_descendants(&mut self, handle: &str) -> bool {
        if !self.set_focus(handle) {
            return false;
        }
        self.set_view_mode(ViewMode::Descendant);
        true
    }

    pub fn show_ancestors(&mut self, handle: &str) -> bool {
        if !self.set_focus(handle) {
            return false;
        }
        self.set_view_mode(ViewMode::Ancestor);
        true
    }

    pub fn show_full(&mut self) {
        self.set_view_mode(ViewMode::Full);
    }

    fn auto_collapse_panoramic(&mut self) {
        let generations = self.generations();
        let threshold = self.config.auto_collapse_generation;
        self.collapse
            .auto_collapse_panoramic(self.journal.current(), &generations, threshold);
    }

    fn auto_collapse_descendants(&mut self, focus: &str) {
        let threshold = self.config.auto_collapse_generation;
        self.collapse
            .auto_collapse_descendants(self.journal.current(), focus, threshold);
    }

    pub fn toggle_collapse(&mut self, handle: &str) {
        self.collapse.toggle(self.journal.current(), handle);
    }

    pub fn expand_all(&mut self) {
        self.collapse.expand_all();
    }

    pub fn collapse_all(&mut self) {
        self.collapse.collapse_all(self.journal.current());
    }

    /// The link for the current state: `view` is left out in full mode and
    /// `person` only travels with a focused mode.
    pub fn deep_link(&self) -> DeepLink {
        if self.mode == ViewMode::Full {
            return DeepLink::default();
        }
        DeepLink {
            view: Some(self.mode),
            person: self.focus.clone(),
        }
    }

    /// Query for sharing `handle`'s branch.
    pub fn share_link(handle: &str) -> String {
        DeepLink {
            view: Some(ViewMode::Descendant),
            person: Some(handle.to_string()),
        }
        .to_query()
    }

    /// Generations over the whole current snapshot.
    pub fn generations(&mut self) -> Arc<Generations> {
        let snapshot = self.journal.current();
        self.stages
            .generations
            .get_or_update(self.journal.revision(), || {
                Arc::new(assign_generations(snapshot))
            })
    }

    /// The mode's projection of the current snapshot.
    pub fn projection(&mut self) -> Arc<GraphSnapshot> {
        let snapshot = self.journal.current();
        let key = (self.journal.revision(), self.mode, self.projection_focus());
        self.stages.projection.get_or_update(key, || {
            match (self.mode, self.focus.as_deref()) {
                (ViewMode::Descendant, Some(focus)) => {
                    Arc::new(filter_descendants(focus, snapshot))
                }
                (ViewMode::Ancestor, Some(focus)) => Arc::new(filter_ancestors(focus, snapshot)),
                _ => snapshot.clone(),
            }
        })
    }

    /// Hidden persons, derived from the whole snapshot so a projection
    /// never changes what a collapse hides.
    pub fn hidden_handles(&mut self) -> Arc<HashSet<String>> {
        let snapshot = self.journal.current();
        let collapsed = self.collapse.collapsed();
        let key = (self.journal.revision(), self.collapse.revision());
        self.stages
            .hidden
            .get_or_update(key, || Arc::new(hidden_handles(snapshot, collapsed)))
    }

    pub fn branch_summaries(&mut self) -> Arc<BTreeMap<String, BranchSummary>> {
        let generations = self.generations();
        let snapshot = self.journal.current();
        let collapsed = self.collapse.collapsed();
        let key = (self.journal.revision(), self.collapse.revision());
        self.stages.summaries.get_or_update(key, || {
            let summaries = collapsed
                .iter()
                .map(|h| (h.clone(), branch_summary(snapshot, h, &generations)))
                .collect();
            Arc::new(summaries)
        })
    }

    /// Focus only shapes the projection outside full mode.
    fn projection_focus(&self) -> Option<String> {
        match self.mode {
            ViewMode::Full => None,
            _ => self.focus.clone(),
        }
    }

    fn layout_key(&self) -> LayoutKey {
        (
            self.journal.revision(),
            self.mode,
            self.projection_focus(),
            self.collapse.revision(),
        )
    }

    /// Layout of the projected, un-hidden persons. Unchanged by pan and zoom.
    pub fn layout(&mut self) -> Arc<LayoutResult> {
        let key = self.layout_key();
        let projection = self.projection();
        let hidden = self.hidden_handles();
        let config = &self.config.layout;
        self.stages.layout.get_or_update(key, || {
            let shown = visible_snapshot(&projection, &hidden);
            let layout = config.layout(&shown);
            debug!(
                nodes = layout.nodes.len(),
                hidden = hidden.len(),
                width = layout.width,
                height = layout.height,
                "recomputed layout"
            );
            Arc::new(layout)
        })
    }

    pub fn frame(&mut self) -> RenderFrame {
        let layout = self.layout();
        let branch_summaries = self.branch_summaries();
        let transform = self.viewport.transform.sanitized();
        let size = self.viewport.container_size;
        let key = (self.layout_key(), transform, size);
        let config = &self.config.layout;
        let culled = self.stages.culled.get_or_update(key, || {
            Arc::new(cull(&layout, config, &transform, size))
        });
        RenderFrame {
            visible_nodes: culled.nodes.clone(),
            visible_connections: VisibleConnections {
                parent_path: culled.parent_path.clone(),
                couple_path: culled.couple_path.clone(),
            },
            visible_couples: culled.couples.clone(),
            branch_summaries: (*branch_summaries).clone(),
            zoom_level: transform.zoom_level(),
            transform,
        }
    }

    /// Head counts over the laid-out tree; families count the whole
    /// snapshot.
    pub fn stats(&mut self) -> TreeStats {
        let layout = self.layout();
        TreeStats::from_layout(&layout, self.journal.current().families.len())
    }

    /// Case-insensitive substring match on display names.
    pub fn search(&self, query: &str) -> Vec<&Person> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.journal
            .current()
            .people
            .iter()
            .filter(|p| p.display_name.to_lowercase().contains(&query))
            .take(self.config.search_limit)
            .collect()
    }

    /// Whether `handle` heads a family with children, i.e. has something
    /// to collapse.
    pub fn has_children(&self, handle: &str) -> bool {
        self.journal
            .current()
            .families
            .iter()
            .any(|f| f.has_parent(handle) && !f.children.is_empty())
    }

    pub fn fit_all(&mut self) {
        let layout = self.layout();
        self.viewport
            .fit_to_content(Size::new(layout.width, layout.height));
    }

    /// Centre `handle`'s card and make them the focus. False when they are
    /// not in the current layout.
    pub fn pan_to_person(&mut self, handle: &str) -> bool {
        let layout = self.layout();
        let Some(node) = layout.node(handle) else {
            return false;
        };
        self.viewport
            .pan_to(node.x, node.y, self.config.layout.card_size());
        self.focus = Some(handle.to_string());
        true
    }

    pub fn apply_edit(&mut self, edit: Edit, sink: &mut impl EditSink) -> Result<EditId, EditError> {
        self.journal.submit(edit, sink)
    }

    pub fn resolve_edit(&mut self, id: EditId, outcome: Result<(), EditFailure>) -> bool {
        self.journal.resolve(id, outcome)
    }

    pub fn retry_edit(&mut self, id: EditId, sink: &mut impl EditSink) -> bool {
        self.journal.retry(id, sink)
    }

    pub fn reset_edits(&mut self) {
        self.journal.reset();
    }

    /// Replace the snapshot wholesale and reopen the panoramic view.
    pub fn reload(&mut self, snapshot: impl Into<Arc<GraphSnapshot>>) {
        self.journal.reload(snapshot.into());
        self.stages = Stages::default();
        self.focus = None;
        self.mode = ViewMode::Full;
        self.auto_collapse_panoramic();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use giapha_layout::{Family, Person};

    fn chain() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![
                Person::new("A", "An").patrilineal(true).in_families(["F1"]),
                Person::new("B", "Binh")
                    .patrilineal(true)
                    .child_of(["F1"])
                    .in_families(["F2"]),
                Person::new("C", "Chi").patrilineal(true).living(true).child_of(["F2"]),
            ],
            vec![
                Family::new("F1").father("A").with_children(["B"]),
                Family::new("F2").father("B").with_children(["C"]),
            ],
        )
    }

    #[test]
    fn collapsing_the_root_hides_the_chain() {
        let mut view = TreeView::new(chain(), ViewConfig::default());
        assert!(view.hidden_handles().is_empty());

        view.toggle_collapse("A");
        let hidden = view.hidden_handles();
        assert_eq!(hidden.len(), 2);
        assert!(hidden.contains("B") && hidden.contains("C"));

        let frame = view.frame();
        assert_eq!(frame.branch_summaries["A"].total_descendants, 2);
        assert_eq!(frame.visible_nodes.len(), 1);
        assert_eq!(frame.visible_connections.parent_path, "");
    }

    #[test]
    fn deep_link_round_trip() {
        let link = DeepLink::parse("/tree?view=descendant&person=P007");
        assert_eq!(link.view, Some(ViewMode::Descendant));
        assert_eq!(link.person.as_deref(), Some("P007"));
        assert_eq!(link.to_query(), "view=descendant&person=P007");

        let ignored = DeepLink::parse("view=sideways&person=");
        assert_eq!(ignored, DeepLink::default());
        assert_eq!(TreeView::share_link("P 1"), "view=descendant&person=P+1");
    }

    #[test]
    fn link_follows_the_mode() {
        let mut view = TreeView::new(chain(), ViewConfig::default());
        view.set_focus("B");
        assert_eq!(view.deep_link().to_query(), "");

        view.set_view_mode(ViewMode::Ancestor);
        assert_eq!(view.deep_link().to_query(), "view=ancestor&person=B");
    }

    #[test]
    fn unknown_link_person_is_ignored() {
        let link = DeepLink::parse("view=descendant&person=NOPE");
        let mut view = TreeView::from_deep_link(chain(), ViewConfig::default(), &link);
        assert_eq!(view.view_mode(), ViewMode::Descendant);
        assert_eq!(view.focus(), None);
        assert_eq!(view.layout().nodes.len(), 3);
    }

    #[test]
    fn focused_mode_defaults_to_first_person() {
        let mut view = TreeView::new(chain(), ViewConfig::default());
        view.set_view_mode(ViewMode::Descendant);
        assert_eq!(view.focus(), Some("A"));
    }

    #[test]
    fn pan_keeps_the_layout() {
        let mut view = TreeView::new(chain(), ViewConfig::default());
        view.resize(Size::new(800.0, 600.0));
        let before = view.layout();
        view.viewport_mut().pointer_down(0.0, 0.0);
        view.viewport_mut().pointer_move(120.0, -40.0);
        view.viewport_mut().pointer_up();
        let frame = view.frame();
        assert!(Arc::ptr_eq(&before, &view.layout()));
        assert_eq!((frame.transform.x, frame.transform.y), (120.0, -40.0));

        view.toggle_collapse("B");
        assert!(!Arc::ptr_eq(&before, &view.layout()));
    }

    #[test]
    fn edits_flow_into_the_layout() {
        let mut view = TreeView::new(chain(), ViewConfig::default());
        let mut sent = Vec::new();
        let mut sink = |id: EditId, _: &Edit| sent.push(id);
        let id = view
            .apply_edit(
                Edit::RemoveChild {
                    child: "C".into(),
                    family: "F2".into(),
                },
                &mut sink,
            )
            .unwrap();
        assert!(!view.has_children("B"));
        assert_eq!(view.layout().connections.len(), 1);

        assert!(view.resolve_edit(id, Err(EditFailure::new("offline"))));
        assert!(view.has_children("B"));
        assert_eq!(view.layout().connections.len(), 2);
        assert_eq!(sent, vec![id]);
    }

    #[test]
    fn search_is_case_insensitive_and_capped() {
        let people = (0..12)
            .map(|i| Person::new(format!("P{i}"), format!("Nguyen Van {i}")))
            .collect();
        let view = TreeView::new(GraphSnapshot::new(people, Vec::new()), ViewConfig::default());
        assert_eq!(view.search("nguyen").len(), 8);
        assert_eq!(view.search("VAN 1").len(), 3);
        assert!(view.search("  ").is_empty());
    }

    #[test]
    fn pan_to_person_sets_focus() {
        let mut view = TreeView::new(chain(), ViewConfig::default());
        view.resize(Size::new(1000.0, 800.0));
        assert!(view.pan_to_person("C"));
        assert_eq!(view.focus(), Some("C"));
        assert!(!view.pan_to_person("Z"));
    }
}
