//! Fixed-size GPU render-target allocation and exact-size pooling.
//!
//! Off-screen color targets are expensive to allocate, so each stroke keeps
//! two pools keyed by exact `(width, height, format)`: one for transient
//! blend-pass targets (linear, half-float where renderable) and one for final
//! composited tile output (master-texture format). Same-sized requests reuse
//! the pooled texture instead of reallocating.

use std::fmt;

use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTargetError {
    ZeroExtent,
    ExtentExceedsDeviceLimit,
    Allocation(String),
}

impl fmt::Display for RenderTargetError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderTargetError::ZeroExtent => {
                write!(formatter, "render target extent must be at least 1x1")
            }
            RenderTargetError::ExtentExceedsDeviceLimit => {
                write!(formatter, "render target extent exceeds device limit")
            }
            RenderTargetError::Allocation(message) => {
                write!(formatter, "render target allocation failed: {message}")
            }
        }
    }
}

impl std::error::Error for RenderTargetError {}

/// One GPU-addressable 2D color buffer with immutable dimensions. Handles are
/// cheap clones of the underlying ref-counted wgpu resources.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl RenderTarget {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
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

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

fn render_target_usages() -> wgpu::TextureUsages {
    wgpu::TextureUsages::RENDER_ATTACHMENT
        | wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::COPY_SRC
        | wgpu::TextureUsages::COPY_DST
}

/// Allocates an unpooled render target. Allocation runs inside a validation
/// error scope so device-side failures surface as `RenderTargetError` instead
/// of an uncaptured error, leaving the caller usable.
pub fn create_render_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    label: &'static str,
) -> Result<RenderTarget, RenderTargetError> {
    if width == 0 || height == 0 {
        return Err(RenderTargetError::ZeroExtent);
    }
    let limit = device.limits().max_texture_dimension_2d;
    if width > limit || height > limit {
        return Err(RenderTargetError::ExtentExceedsDeviceLimit);
    }

    let oom_scope = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let validation_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
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
        usage: render_target_usages(),
        view_formats: &[],
    });
    let validation_error = pollster::block_on(validation_scope.pop());
    let oom_error = pollster::block_on(oom_scope.pop());
    if let Some(error) = oom_error.or(validation_error) {
        return Err(RenderTargetError::Allocation(error.to_string()));
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(RenderTarget {
        texture,
        view,
        width,
        height,
        format,
    })
}

/// Pool of render targets reused by exact `(width, height, format)` match.
///
/// Reuse is unconditional: a request matching a pooled entry always returns
/// that entry, so a caller must not hold overlapping references to one slot
/// across reentrant use within a single pass.
#[derive(Debug)]
pub struct RenderTargetPool {
    device: wgpu::Device,
    label: &'static str,
    entries: Vec<RenderTarget>,
}

impl RenderTargetPool {
    pub fn new(device: &wgpu::Device, label: &'static str) -> Self {
        Self {
            device: device.clone(),
            label,
            entries: Vec::new(),
        }
    }

    pub fn acquire(
        &mut self,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<RenderTarget, RenderTargetError> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.width == width && entry.height == height && entry.format == format)
        {
            return Ok(entry.clone());
        }
        let target = create_render_target(&self.device, width, height, format, self.label)?;
        trace!(
            pool = self.label,
            width, height, "pooled new render target"
        );
        self.entries.push(target.clone());
        Ok(target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn release_all(&mut self) {
        self.entries.clear();
    }
}

/// Format for intermediate blend-pass targets: linear half-float where the
/// device can render to it, 8-bit otherwise. Blending repeatedly in a
/// low-precision non-linear format accumulates visible banding during
/// multi-pass ink buildup.
pub fn blend_pass_format(device: &wgpu::Device) -> wgpu::TextureFormat {
    if supports_render_attachment(device, wgpu::TextureFormat::Rgba16Float) {
        wgpu::TextureFormat::Rgba16Float
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

fn supports_render_attachment(device: &wgpu::Device, format: wgpu::TextureFormat) -> bool {
    let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let _probe_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("render_targets.format_usage_probe"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    pollster::block_on(error_scope.pop()).is_none()
}
