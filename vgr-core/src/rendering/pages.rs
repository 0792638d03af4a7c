//! Page geometry and the per-page setup of paginated output.

use tracing::warn;

use crate::core::document::Page;
use crate::core::geom::{Affine, Rect};
use crate::rendering::context::RenderContext;

/// Where one page lands on the output surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Page rectangle in user units
    pub user_rect: Rect,
    /// Page rectangle in device units
    pub exact: Rect,
    /// `exact` grown to whole device units; the page size
    pub rounded: Rect,
    /// Per-axis stretch applied so content fills `rounded`
    pub distortion: (f64, f64),
}

/// Turns page descriptors into surface sizes and transforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSequencer {
    document_scale: f64,
    stretch_to_fit: bool,
}

impl PageSequencer {
    pub fn new(document_scale: f64, stretch_to_fit: bool) -> Self {
        let document_scale = if document_scale > 0.0 && document_scale.is_finite() {
            document_scale
        } else {
            1.0
        };
        PageSequencer {
            document_scale,
            stretch_to_fit,
        }
    }

    /// Geometry of `page` on a surface with `unit_scale` device units per
    /// document unit.
    pub fn geometry(&self, page: &Page, unit_scale: f64) -> PageGeometry {
        let to_user = 1.0 / self.document_scale;
        let user_rect = page.bleed.transform(&Affine::scale(to_user, to_user));
        let to_device = self.document_scale * unit_scale;
        let exact = user_rect.transform(&Affine::scale(to_device, to_device));
        let rounded = exact.round_outwards();

        let distortion = if self.stretch_to_fit && !exact.is_empty() {
            (
                rounded.width() / exact.width(),
                rounded.height() / exact.height(),
            )
        } else {
            (1.0, 1.0)
        };

        PageGeometry {
            user_rect,
            exact,
            rounded,
            distortion,
        }
    }

    /// User units to document units, including the stretch.
    pub fn page_transform(&self, geometry: &PageGeometry) -> Affine {
        let (dx, dy) = geometry.distortion;
        Affine::scale(self.document_scale * dx, self.document_scale * dy)
    }

    /// Start `page`: set up its transform, then resize and label the
    /// surface on vector targets.
    pub fn begin_page(
        &self,
        ctx: &mut RenderContext<'_>,
        page: &Page,
        root_transform: &Affine,
    ) -> bool {
        let geometry = self.geometry(page, ctx.unit_scale());
        if geometry.rounded.is_empty() {
            warn!(label = ?page.label, "page has no area");
            return false;
        }

        ctx.transform(&self.page_transform(&geometry));
        ctx.transform(root_transform);
        if ctx.is_vector()
            && !ctx.next_page(
                geometry.rounded.width(),
                geometry.rounded.height(),
                page.label.as_deref(),
            )
        {
            return false;
        }
        let user_rect = geometry.user_rect;
        ctx.transform(&Affine::translate(-user_rect.left(), -user_rect.top()));
        true
    }

    /// Close the current page.
    pub fn finish_page(&self, ctx: &mut RenderContext<'_>) -> bool {
        ctx.finish_page()
    }
}
