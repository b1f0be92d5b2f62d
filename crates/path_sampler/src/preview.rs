//! Renders a brush preview: a fixed S-curve stroked into a scratch texture
//! through a throwaway stroke session, then read back as a bitmap.

use stroke_compositor::{
    DabParams, FlushError, GpuContext, LayerTransform, MasterTexture, MasterTextureError,
    SessionCreateError, StampError, StrokeBrush, StrokeSession,
};
use tracing::debug;

use crate::curve::{ArcLengthTable, CubicBezier};
use crate::plan::{JitterSource, PreviewSettings, plan_dabs};

pub const PREVIEW_WIDTH: u32 = 256;
pub const PREVIEW_HEIGHT: u32 = 128;

// Default jitter seed; previews with the same settings come out identical.
const PREVIEW_JITTER_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewError {
    InvalidSettings(&'static str),
    Master(MasterTextureError),
    SessionCreate(SessionCreateError),
    Stamp(StampError),
    Flush(FlushError),
    ReadbackFailed,
}

impl std::fmt::Display for PreviewError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSettings(reason) => {
                write!(formatter, "invalid preview settings: {reason}")
            }
            Self::Master(error) => write!(formatter, "preview scratch texture: {error}"),
            Self::SessionCreate(error) => write!(formatter, "preview session: {error}"),
            Self::Stamp(error) => write!(formatter, "preview stamp: {error}"),
            Self::Flush(error) => write!(formatter, "preview flush: {error}"),
            Self::ReadbackFailed => write!(formatter, "preview pixel readback failed"),
        }
    }
}

impl std::error::Error for PreviewError {}

impl From<MasterTextureError> for PreviewError {
    fn from(error: MasterTextureError) -> Self {
        Self::Master(error)
    }
}

impl From<SessionCreateError> for PreviewError {
    fn from(error: SessionCreateError) -> Self {
        Self::SessionCreate(error)
    }
}

impl From<StampError> for PreviewError {
    fn from(error: StampError) -> Self {
        Self::Stamp(error)
    }
}

impl From<FlushError> for PreviewError {
    fn from(error: FlushError) -> Self {
        Self::Flush(error)
    }
}

/// Tightly packed RGBA8 rows, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PreviewBitmap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} bitmap",
            self.width,
            self.height,
        );
        let offset = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
            self.pixels[offset + 3],
        ]
    }
}

pub struct PreviewGenerator {
    curve: CubicBezier,
    table: ArcLengthTable,
}

impl Default for PreviewGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewGenerator {
    /// Uses an S-curve sized for the 256x128 preview canvas.
    pub fn new() -> Self {
        let curve =
            CubicBezier::new([(24.0, 96.0), (88.0, 16.0), (168.0, 112.0), (232.0, 32.0)]);
        let table = ArcLengthTable::new(&curve);
        Self { curve, table }
    }

    pub fn curve(&self) -> &CubicBezier {
        &self.curve
    }

    pub fn arc_length_table(&self) -> &ArcLengthTable {
        &self.table
    }

    /// Strokes the preview curve into a fresh scratch texture and reads the
    /// result back. The throwaway session is flushed synchronously; nothing
    /// is left registered on the GPU context afterwards.
    pub fn generate(
        &self,
        gpu: &mut GpuContext,
        settings: &PreviewSettings,
    ) -> Result<PreviewBitmap, PreviewError> {
        settings.validate().map_err(PreviewError::InvalidSettings)?;

        let scratch = MasterTexture::create(
            gpu.device(),
            PREVIEW_WIDTH,
            PREVIEW_HEIGHT,
            wgpu::TextureFormat::Rgba8Unorm,
            "preview.scratch",
        )?;
        let brush = StrokeBrush {
            color: settings.color,
            hardness: settings.hardness,
        };
        let mut session = StrokeSession::new(
            gpu,
            scratch.clone(),
            LayerTransform::identity(),
            brush,
            settings.size,
        )?;

        let mut jitter = JitterSource::from_seed(PREVIEW_JITTER_SEED);
        let dabs = plan_dabs(&self.curve, &self.table, settings, &mut jitter);
        debug!(dab_count = dabs.len(), "preview stroke planned");
        for dab in &dabs {
            session.stamp(
                gpu,
                &DabParams {
                    center_x: dab.center_x,
                    center_y: dab.center_y,
                    size: dab.size,
                    density: dab.density,
                    color_blend_strength: dab.color_blend_strength,
                    concentration: dab.concentration,
                },
            )?;
        }
        session.flush(gpu)?;

        let pixels = read_scratch(gpu, &scratch)?;
        session.dispose(gpu)?;
        Ok(PreviewBitmap {
            width: PREVIEW_WIDTH,
            height: PREVIEW_HEIGHT,
            pixels,
        })
    }
}

fn read_scratch(gpu: &GpuContext, scratch: &MasterTexture) -> Result<Vec<u8>, PreviewError> {
    let unpadded_bytes_per_row = scratch.width() * 4;
    let padded_bytes_per_row = unpadded_bytes_per_row.next_multiple_of(256);
    let buffer = gpu.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("preview.readback"),
        size: (padded_bytes_per_row * scratch.height()) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("preview.readback"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: scratch.texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(scratch.height()),
            },
        },
        wgpu::Extent3d {
            width: scratch.width(),
            height: scratch.height(),
            depth_or_array_layers: 1,
        },
    );
    gpu.queue().submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    gpu.device()
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|_| PreviewError::ReadbackFailed)?;
    match receiver.try_recv() {
        Ok(Ok(())) => {}
        _ => return Err(PreviewError::ReadbackFailed),
    }

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * scratch.height()) as usize);
    for row in 0..scratch.height() {
        let start = (row * padded_bytes_per_row) as usize;
        pixels.extend_from_slice(&mapped[start..start + unpadded_bytes_per_row as usize]);
    }
    drop(mapped);
    buffer.unmap();
    Ok(pixels)
}
