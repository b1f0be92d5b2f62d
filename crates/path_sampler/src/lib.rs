//! Deterministic stroke-path sampling for brush previews.
//!
//! A fixed cubic Bézier curve is walked by arc length; each step derives a
//! pressure-modulated dab that is stamped through a throwaway
//! [`stroke_compositor::StrokeSession`] into a scratch texture, which is then
//! read back as the preview bitmap.

mod curve;
mod plan;
mod preview;


pub use curve::{ARC_LENGTH_SAMPLES, ArcLengthTable, CubicBezier};
pub use plan::{JitterSource, PlannedDab, PreviewSettings, plan_dabs, pressure_at};
pub use preview::{
    PREVIEW_HEIGHT, PREVIEW_WIDTH, PreviewBitmap, PreviewError, PreviewGenerator,
};
