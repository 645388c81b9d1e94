//! Interactive state on top of `giapha-layout`: collapsed branches, the
//! pan/zoom viewport, optimistic edits and the view-mode state machine
//! that ties them into a render frame.

mod collapse;
mod edit;
mod view;
mod viewport;

pub use collapse::{
    AUTO_COLLAPSE_GEN, BranchSummary, CollapseState, branch_summary, descendant_handles,
    family_visible, hidden_handles, visible_snapshot,
};
pub use edit::{
    Edit, EditError, EditFailure, EditId, EditJournal, EditSink, EditStatus, PendingEdit,
    PersonPatch, WriteFailurePolicy,
};
pub use view::{
    DeepLink, RenderFrame, TreeView, UnknownViewMode, ViewConfig, ViewMode, VisibleConnections,
};
pub use viewport::{
    CULL_PAD, CulledLayout, FIT_MAX_SCALE, FIT_MIN_SCALE, FIT_PADDING, MAX_SCALE, MIN_SCALE, Rect,
    Transform, Viewport, WHEEL_ZOOM_IN, WHEEL_ZOOM_OUT, ZoomLevel, cull, fit_to_view,
    visible_rect,
};
