//! Column-major 4x4 transforms for mapping dab footprints between layer
//! space, screen space, and tile-local pixel space.

use tile_grid::{BoundingBox, TileRect};

/// Column-major, following the WGSL `mat4x4<f32>` memory layout.
pub type TransformMatrix4x4 = [f32; 16];

pub const IDENTITY_MATRIX: TransformMatrix4x4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, //
];

pub fn multiply(a: &TransformMatrix4x4, b: &TransformMatrix4x4) -> TransformMatrix4x4 {
    let mut result = [0.0f32; 16];
    for column in 0..4 {
        for row in 0..4 {
            let mut sum = 0.0f32;
            for k in 0..4 {
                sum += a[k * 4 + row] * b[column * 4 + k];
            }
            result[column * 4 + row] = sum;
        }
    }
    result
}

pub fn translation(x: f32, y: f32) -> TransformMatrix4x4 {
    let mut matrix = IDENTITY_MATRIX;
    matrix[12] = x;
    matrix[13] = y;
    matrix
}

pub fn scale(x: f32, y: f32) -> TransformMatrix4x4 {
    let mut matrix = IDENTITY_MATRIX;
    matrix[0] = x;
    matrix[5] = y;
    matrix
}

pub fn transform_point(matrix: &TransformMatrix4x4, x: f32, y: f32) -> (f32, f32) {
    (
        matrix[0] * x + matrix[4] * y + matrix[12],
        matrix[1] * x + matrix[5] * y + matrix[13],
    )
}

/// Inverts the 2D affine part (upper-left 2x2 plus translation) of a
/// column-major matrix. Returns `None` when the 2x2 block is singular.
pub fn invert_affine(matrix: &TransformMatrix4x4) -> Option<TransformMatrix4x4> {
    let a = matrix[0];
    let b = matrix[1];
    let c = matrix[4];
    let d = matrix[5];
    let tx = matrix[12];
    let ty = matrix[13];

    let determinant = a * d - b * c;
    if !determinant.is_finite() || determinant.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / determinant;

    let mut inverse = IDENTITY_MATRIX;
    inverse[0] = d * inv_det;
    inverse[1] = -b * inv_det;
    inverse[4] = -c * inv_det;
    inverse[5] = a * inv_det;
    inverse[12] = -(inverse[0] * tx + inverse[4] * ty);
    inverse[13] = -(inverse[1] * tx + inverse[5] * ty);
    Some(inverse)
}

/// Returns true when the matrix only moves, scales, rotates, or shears the
/// XY plane: no projection terms and no Z coupling.
fn is_affine_2d(matrix: &TransformMatrix4x4) -> bool {
    let must_be_zero = [2, 3, 6, 7, 8, 9, 11, 14];
    let must_be_one = [10, 15];
    must_be_zero.iter().all(|&index| matrix[index] == 0.0)
        && must_be_one.iter().all(|&index| matrix[index] == 1.0)
        && matrix.iter().all(|value| value.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerTransformError {
    NotAffine2d,
    NonInvertible,
}

impl std::fmt::Display for LayerTransformError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAffine2d => {
                write!(formatter, "layer transform must be a 2D affine matrix")
            }
            Self::NonInvertible => write!(formatter, "layer transform is not invertible"),
        }
    }
}

impl std::error::Error for LayerTransformError {}

/// A validated layer-to-screen transform with its precomputed inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerTransform {
    forward: TransformMatrix4x4,
    inverse: TransformMatrix4x4,
}

impl LayerTransform {
    pub fn new(forward: TransformMatrix4x4) -> Result<Self, LayerTransformError> {
        if !is_affine_2d(&forward) {
            return Err(LayerTransformError::NotAffine2d);
        }
        let inverse = invert_affine(&forward).ok_or(LayerTransformError::NonInvertible)?;
        Ok(Self { forward, inverse })
    }

    pub fn identity() -> Self {
        Self {
            forward: IDENTITY_MATRIX,
            inverse: IDENTITY_MATRIX,
        }
    }

    pub fn forward(&self) -> &TransformMatrix4x4 {
        &self.forward
    }

    pub fn inverse(&self) -> &TransformMatrix4x4 {
        &self.inverse
    }
}

/// A dab's placement in layer space; `size` is the footprint's edge length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DabFootprint {
    pub center_x: f32,
    pub center_y: f32,
    pub size: f32,
}

/// Layer-space bounding box of a dab whose screen-space footprint is an
/// axis-aligned square. The square's corners are mapped back through the
/// layer inverse, so rotation or shear widens the box as needed.
pub fn dab_bounding_box(footprint: &DabFootprint, layer: &LayerTransform) -> BoundingBox {
    assert!(
        footprint.center_x.is_finite() && footprint.center_y.is_finite(),
        "dab center must be finite, got ({}, {})",
        footprint.center_x,
        footprint.center_y,
    );
    assert!(
        footprint.size.is_finite() && footprint.size > 0.0,
        "dab size must be finite and positive, got {}",
        footprint.size,
    );

    let (screen_x, screen_y) =
        transform_point(layer.forward(), footprint.center_x, footprint.center_y);
    let half = footprint.size * 0.5;
    let corners = [
        (screen_x - half, screen_y - half),
        (screen_x + half, screen_y - half),
        (screen_x - half, screen_y + half),
        (screen_x + half, screen_y + half),
    ];

    let mut bounds = BoundingBox {
        min_x: f32::INFINITY,
        min_y: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        max_y: f32::NEG_INFINITY,
    };
    for (corner_x, corner_y) in corners {
        let (layer_x, layer_y) = transform_point(layer.inverse(), corner_x, corner_y);
        bounds.min_x = bounds.min_x.min(layer_x);
        bounds.min_y = bounds.min_y.min(layer_y);
        bounds.max_x = bounds.max_x.max(layer_x);
        bounds.max_y = bounds.max_y.max(layer_y);
    }
    bounds
}

/// Builds the matrix the dab shader applies to tile pixel coordinates to
/// reach the footprint's unit square.
///
/// Composed right to left: offset the tile's pixel into layer space, map it
/// through the layer transform into screen space, then undo the footprint's
/// screen placement so the dab spans `[0, 1]` on both axes.
pub fn dab_tile_transform(
    footprint: &DabFootprint,
    layer: &LayerTransform,
    tile: &TileRect,
) -> TransformMatrix4x4 {
    let (screen_x, screen_y) =
        transform_point(layer.forward(), footprint.center_x, footprint.center_y);
    let half = footprint.size * 0.5;
    let inv_size = 1.0 / footprint.size;

    let footprint_reset = multiply(
        &scale(inv_size, inv_size),
        &translation(half - screen_x, half - screen_y),
    );
    let tile_offset = translation(tile.x as f32, tile.y as f32);
    let result = multiply(&footprint_reset, &multiply(layer.forward(), &tile_offset));
    assert!(
        result.iter().all(|value| value.is_finite()),
        "dab tile transform produced a non-finite matrix",
    );
    result
}
