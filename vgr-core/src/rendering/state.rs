//! Per-item render state and the stack mirroring the item ancestry.

use tracing::warn;

use crate::core::geom::{Affine, Rect};
use crate::core::style::{Overflow, Style};

/// A clip path or mask id together with the bounding box of the item
/// that references it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceView {
    pub id: String,
    /// Bounding box of the referencing item in its own user space
    pub bbox: Option<Rect>,
}

impl ReferenceView {
    pub fn new(id: impl Into<String>, bbox: Option<Rect>) -> Self {
        ReferenceView {
            id: id.into(),
            bbox,
        }
    }
}

/// Attributes of one item being rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// User space to device space
    pub transform: Affine,
    /// The item's own transform; used as user space for clip and mask content
    pub item_transform: Affine,
    pub opacity: f64,
    /// Whether opacity is folded into fill and stroke alpha instead of a layer
    pub merge_opacity: bool,
    pub clip_path: Option<ReferenceView>,
    pub mask: Option<ReferenceView>,
    /// A compositing layer was pushed for this item
    pub need_layer: bool,
    pub has_overflow_clip: bool,
    pub has_filter: bool,
    /// Clip and mask content is relative to the parent's transform
    pub parent_has_userspace: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        RenderState {
            transform: Affine::IDENTITY,
            item_transform: Affine::IDENTITY,
            opacity: 1.0,
            merge_opacity: true,
            clip_path: None,
            mask: None,
            need_layer: false,
            has_overflow_clip: false,
            has_filter: false,
            parent_has_userspace: false,
        }
    }
}

impl RenderState {
    /// Take opacity, overflow and filter flags from a style.
    ///
    /// Opacity stays mergeable only when a single flat-coloured paint is
    /// drawn; paint servers or fill plus stroke need a group.
    pub fn set_for_style(&mut self, style: &Style) {
        self.opacity = style.opacity.clamp(0.0, 1.0);
        self.has_overflow_clip = style.overflow != Overflow::Visible;
        self.has_filter = style.filter;

        if style.fill.is_server() || style.stroke.is_server() {
            self.merge_opacity = false;
        }
        if self.merge_opacity && !style.fill.is_none() && !style.stroke.is_none() {
            self.merge_opacity = false;
        }
    }
}

/// Stack of [`RenderState`]s. The bottom state belongs to the context and
/// is never popped.
#[derive(Debug, Clone)]
pub struct StateStack {
    states: Vec<RenderState>,
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStack {
    pub fn new() -> Self {
        StateStack {
            states: vec![RenderState::default()],
        }
    }

    /// Push a fresh state that inherits only the current transform.
    pub fn push(&mut self) {
        let state = RenderState {
            transform: self.current().transform,
            ..RenderState::default()
        };
        self.states.push(state);
    }

    /// Pop the top state; returns false when only the base state is left.
    pub fn pop(&mut self) -> bool {
        if self.states.len() <= 1 {
            warn!("state stack underflow");
            return false;
        }
        self.states.pop();
        true
    }

    pub fn current(&self) -> &RenderState {
        // The base state is never removed
        &self.states[self.states.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut RenderState {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    /// The state beneath the current one, or the current one at the base.
    pub fn parent(&self) -> &RenderState {
        let len = self.states.len();
        if len == 1 {
            &self.states[0]
        } else {
            &self.states[len - 2]
        }
    }

    /// Number of states above the base.
    pub fn depth(&self) -> usize {
        self.states.len() - 1
    }
}
