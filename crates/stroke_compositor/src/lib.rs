//! Tile-based GPU stroke compositing.
//!
//! A stroke lives in a [`StrokeSession`]: dabs are stamped into per-tile
//! accumulation textures, and dirty tiles are composited over frozen
//! snapshots of the master texture when the session is flushed. The
//! [`StrokeOrchestrator`] owns sessions and drives their flushes through
//! before-render hooks.

mod orchestrator;
mod pipeline;
mod session;
pub mod transforms;
mod viewport;

#[cfg(test)]
mod tests;

pub use orchestrator::{OrchestratorError, StrokeOrchestrator, StrokeSessionId};
pub use session::{SessionCreateError, StrokeSession};
pub use transforms::{
    IDENTITY_MATRIX, LayerTransform, LayerTransformError, TransformMatrix4x4,
};
pub use viewport::{Viewport, ViewportGuard, ViewportState};

use pipeline::CompositorPipelines;
use render_targets::RenderTargetError;
use tile_grid::TileGridError;

/// Device, queue, shared viewport state, and the compositor's pipelines.
///
/// One context serves any number of sessions; the dab uniform buffer and the
/// per-format composite pipelines inside it are shared by all of them.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    viewport: ViewportState,
    blend_format: wgpu::TextureFormat,
    pipelines: CompositorPipelines,
}

impl GpuContext {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, viewport: Viewport) -> Self {
        let blend_format = render_targets::blend_pass_format(device);
        let pipelines = CompositorPipelines::new(device, blend_format);
        Self {
            device: device.clone(),
            queue: queue.clone(),
            viewport: ViewportState::new(viewport),
            blend_format,
            pipelines,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    /// Format used for accumulation and blend scratch targets.
    pub fn blend_format(&self) -> wgpu::TextureFormat {
        self.blend_format
    }

    pub(crate) fn pipelines(&self) -> &CompositorPipelines {
        &self.pipelines
    }

    pub(crate) fn pipelines_mut(&mut self) -> &mut CompositorPipelines {
        &mut self.pipelines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterTextureError {
    MissingCopySrcUsage,
    MissingCopyDstUsage,
    ZeroExtent,
}

impl std::fmt::Display for MasterTextureError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCopySrcUsage => {
                write!(formatter, "master texture must carry COPY_SRC usage")
            }
            Self::MissingCopyDstUsage => {
                write!(formatter, "master texture must carry COPY_DST usage")
            }
            Self::ZeroExtent => write!(formatter, "master texture extent must be non-zero"),
        }
    }
}

impl std::error::Error for MasterTextureError {}

/// The stroke's destination texture. Tiles are snapshotted out of it with
/// `COPY_SRC` and composited results land back in it with `COPY_DST`.
#[derive(Debug, Clone)]
pub struct MasterTexture {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl MasterTexture {
    pub fn new(texture: wgpu::Texture) -> Result<Self, MasterTextureError> {
        let usage = texture.usage();
        if !usage.contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(MasterTextureError::MissingCopySrcUsage);
        }
        if !usage.contains(wgpu::TextureUsages::COPY_DST) {
            return Err(MasterTextureError::MissingCopyDstUsage);
        }
        let width = texture.width();
        let height = texture.height();
        if width == 0 || height == 0 {
            return Err(MasterTextureError::ZeroExtent);
        }
        let format = texture.format();
        Ok(Self {
            texture,
            width,
            height,
            format,
        })
    }

    /// Convenience for callers that do not already own a destination
    /// texture, such as preview rendering.
    pub fn create(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Result<Self, MasterTextureError> {
        if width == 0 || height == 0 {
            return Err(MasterTextureError::ZeroExtent);
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Self::new(texture)
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

/// Brush state fixed for the whole stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeBrush {
    /// Straight-alpha RGBA brush color.
    pub color: [f32; 4],
    /// Fraction of the dab radius that stays at full coverage, in `0..=1`.
    pub hardness: f32,
}

impl Default for StrokeBrush {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            hardness: 0.8,
        }
    }
}

/// One dab along a stroke. `center_x`/`center_y` are layer-space
/// coordinates; `size` is the screen-space footprint edge in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DabParams {
    pub center_x: f32,
    pub center_y: f32,
    pub size: f32,
    pub density: f32,
    pub color_blend_strength: f32,
    pub concentration: f32,
}

/// What a flush actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub tiles_flushed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampError {
    SessionDisposed,
    Grid(TileGridError),
    Target(RenderTargetError),
}

impl std::fmt::Display for StampError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionDisposed => write!(formatter, "stroke session is disposed"),
            Self::Grid(error) => write!(formatter, "tile grid error during stamp: {error}"),
            Self::Target(error) => {
                write!(formatter, "render target error during stamp: {error}")
            }
        }
    }
}

impl std::error::Error for StampError {}

impl From<TileGridError> for StampError {
    fn from(error: TileGridError) -> Self {
        Self::Grid(error)
    }
}

impl From<RenderTargetError> for StampError {
    fn from(error: RenderTargetError) -> Self {
        Self::Target(error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    SessionDisposed,
    Grid(TileGridError),
    Target(RenderTargetError),
}

impl std::fmt::Display for FlushError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionDisposed => write!(formatter, "stroke session is disposed"),
            Self::Grid(error) => write!(formatter, "tile grid error during flush: {error}"),
            Self::Target(error) => {
                write!(formatter, "render target error during flush: {error}")
            }
        }
    }
}

impl std::error::Error for FlushError {}

impl From<TileGridError> for FlushError {
    fn from(error: TileGridError) -> Self {
        Self::Grid(error)
    }
}

impl From<RenderTargetError> for FlushError {
    fn from(error: RenderTargetError) -> Self {
        Self::Target(error)
    }
}
