//! Cubic Bézier evaluation and arc-length parameterization.

/// Number of `(t, cumulative length)` samples in an [`ArcLengthTable`].
pub const ARC_LENGTH_SAMPLES: usize = 65;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    control_points: [(f32, f32); 4],
}

impl CubicBezier {
    pub fn new(control_points: [(f32, f32); 4]) -> Self {
        assert!(
            control_points
                .iter()
                .all(|(x, y)| x.is_finite() && y.is_finite()),
            "curve control points must be finite",
        );
        Self { control_points }
    }

    pub fn control_points(&self) -> &[(f32, f32); 4] {
        &self.control_points
    }

    /// De Casteljau evaluation at `t`, clamped to `0..=1`.
    pub fn point_at(&self, t: f32) -> (f32, f32) {
        let t = t.clamp(0.0, 1.0);
        let [p0, p1, p2, p3] = self.control_points;
        let a = lerp(p0, p1, t);
        let b = lerp(p1, p2, t);
        let c = lerp(p2, p3, t);
        let ab = lerp(a, b, t);
        let bc = lerp(b, c, t);
        lerp(ab, bc, t)
    }
}

fn lerp(from: (f32, f32), to: (f32, f32), t: f32) -> (f32, f32) {
    (
        from.0 + (to.0 - from.0) * t,
        from.1 + (to.1 - from.1) * t,
    )
}

/// Cumulative chord-length samples over a curve, used to walk the curve at a
/// uniform spatial pace regardless of how `t` stretches along it.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcLengthTable {
    entries: [(f32, f32); ARC_LENGTH_SAMPLES],
}

impl ArcLengthTable {
    pub fn new(curve: &CubicBezier) -> Self {
        let mut entries = [(0.0f32, 0.0f32); ARC_LENGTH_SAMPLES];
        let mut cumulative_length = 0.0f32;
        let mut previous = curve.point_at(0.0);
        for (index, entry) in entries.iter_mut().enumerate() {
            let t = index as f32 / (ARC_LENGTH_SAMPLES - 1) as f32;
            let point = curve.point_at(t);
            cumulative_length += distance(previous, point);
            previous = point;
            *entry = (t, cumulative_length);
        }
        Self { entries }
    }

    pub fn total_length(&self) -> f32 {
        self.entries[ARC_LENGTH_SAMPLES - 1].1
    }

    /// Maps a distance along the curve back to a `t` parameter.
    ///
    /// Clamps to `0` at or below zero length and `1` at or beyond the total,
    /// and is non-decreasing in between.
    pub fn t_at_length(&self, target_length: f32) -> f32 {
        if target_length <= 0.0 {
            return 0.0;
        }
        if target_length >= self.total_length() {
            return 1.0;
        }
        // First sample whose cumulative length reaches the target; the
        // zero-length first entry guarantees a predecessor.
        let high = self
            .entries
            .partition_point(|&(_, length)| length < target_length);
        let (low_t, low_length) = self.entries[high - 1];
        let (high_t, high_length) = self.entries[high];
        let span = high_length - low_length;
        if span <= f32::EPSILON {
            return high_t;
        }
        low_t + (high_t - low_t) * (target_length - low_length) / span
    }
}

fn distance(from: (f32, f32), to: (f32, f32)) -> f32 {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    (dx * dx + dy * dy).sqrt()
}
