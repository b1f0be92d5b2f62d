//! Turns a curve into a discrete dab sequence: triangular pressure ramp,
//! pressure-modulated parameters, and bounded positional jitter.

use crate::curve::{ArcLengthTable, CubicBezier};

/// Triangular pressure ramp over the stroke: ramps up over the first 40%,
/// holds at full pressure through the middle, ramps back down over the last
/// 40%.
pub fn pressure_at(t: f32) -> f32 {
    if t < 0.4 {
        t / 0.4
    } else if t > 0.6 {
        (1.0 - t) / 0.4
    } else {
        1.0
    }
}

/// Brush configuration for preview strokes. Each `pressure_min_*` field is
/// the fraction of the full value used at zero pressure; `1.0` disables
/// pressure modulation for that parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewSettings {
    /// Straight-alpha RGBA brush color.
    pub color: [f32; 4],
    pub size: f32,
    pub hardness: f32,
    /// Dab step as a fraction of the current dab size.
    pub spacing: f32,
    /// Positional jitter range as a fraction of the current dab size.
    pub jitter: f32,
    pub density: f32,
    pub concentration: f32,
    pub color_blending_strength: f32,
    pub pressure_min_size: f32,
    pub pressure_min_density: f32,
    pub pressure_min_concentration: f32,
    pub pressure_min_color_blending_strength: f32,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            size: 20.0,
            hardness: 0.8,
            spacing: 0.1,
            jitter: 0.0,
            density: 1.0,
            concentration: 1.0,
            color_blending_strength: 0.5,
            pressure_min_size: 0.2,
            pressure_min_density: 0.5,
            pressure_min_concentration: 1.0,
            pressure_min_color_blending_strength: 1.0,
        }
    }
}

impl PreviewSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err("brush size must be finite and positive");
        }
        if !self.spacing.is_finite() || self.spacing <= 0.0 {
            return Err("spacing must be finite and positive");
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err("jitter must be finite and non-negative");
        }
        if !(0.0..=1.0).contains(&self.hardness) {
            return Err("hardness must be in 0..=1");
        }
        let unit_fields = [
            self.density,
            self.concentration,
            self.color_blending_strength,
            self.pressure_min_size,
            self.pressure_min_density,
            self.pressure_min_concentration,
            self.pressure_min_color_blending_strength,
        ];
        if unit_fields.iter().any(|value| !(0.0..=1.0).contains(value)) {
            return Err("modulation parameters must be in 0..=1");
        }
        if self.color.iter().any(|channel| !channel.is_finite()) {
            return Err("brush color must be finite");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedDab {
    pub center_x: f32,
    pub center_y: f32,
    pub size: f32,
    pub density: f32,
    pub color_blend_strength: f32,
    pub concentration: f32,
}

/// Deterministic xorshift64 offset source for dab jitter.
#[derive(Debug, Clone)]
pub struct JitterSource {
    state: u64,
}

impl JitterSource {
    pub fn from_seed(seed: u64) -> Self {
        // xorshift has a zero fixed point.
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut state = self.state;
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        self.state = state;
        state
    }

    /// Uniform offset in `[-range, range]`; zero when `range` is zero.
    pub fn next_offset(&mut self, range: f32) -> f32 {
        if range <= 0.0 {
            return 0.0;
        }
        let unit = (self.next_u64() >> 11) as f32 / (1u64 << 53) as f32;
        (unit * 2.0 - 1.0) * range
    }
}

fn modulated(pressure_min: f32, pressure: f32) -> f32 {
    pressure_min + (1.0 - pressure_min) * pressure
}

/// Marches the curve by arc length and emits the dab at each step.
///
/// The step is recomputed every iteration from the current dab size, so a
/// pressure-shrunk dab advances in smaller increments. Dabs whose modulated
/// size reaches zero deposit nothing and are dropped, though the march still
/// advances past them.
pub fn plan_dabs(
    curve: &CubicBezier,
    table: &ArcLengthTable,
    settings: &PreviewSettings,
    jitter: &mut JitterSource,
) -> Vec<PlannedDab> {
    let total_length = table.total_length();
    let mut dabs = Vec::new();
    let mut distance = 0.0f32;
    while distance <= total_length {
        let t = table.t_at_length(distance);
        let pressure = pressure_at(t);
        let size = settings.size * modulated(settings.pressure_min_size, pressure);
        let density = settings.density * modulated(settings.pressure_min_density, pressure);
        let concentration =
            settings.concentration * modulated(settings.pressure_min_concentration, pressure);
        // Inverted on purpose: picked-up color bleeds most where the brush
        // presses lightest.
        let color_blend_strength = settings.color_blending_strength
            * modulated(settings.pressure_min_color_blending_strength, 1.0 - pressure);

        if size > 0.0 {
            let (curve_x, curve_y) = curve.point_at(t);
            let jitter_range = settings.jitter * size;
            dabs.push(PlannedDab {
                center_x: curve_x + jitter.next_offset(jitter_range),
                center_y: curve_y + jitter.next_offset(jitter_range),
                size,
                density,
                color_blend_strength,
                concentration,
            });
        }
        distance += (size * settings.spacing).max(1.0);
    }
    dabs
}
