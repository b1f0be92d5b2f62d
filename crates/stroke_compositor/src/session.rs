//! One in-progress stroke: per-tile accumulation, dirty tracking, and the
//! flush that composites dirty tiles back into the master texture.

use render_targets::{RenderTarget, RenderTargetPool, create_render_target};
use tile_grid::{DirtyTileBitmap, TileGrid, TileRect, tile_size_for_stroke};
use tracing::{debug, trace};

use crate::pipeline::DabUniformGpu;
use crate::transforms::{DabFootprint, LayerTransform, dab_bounding_box, dab_tile_transform};
use crate::viewport::{Viewport, ViewportGuard};
use crate::{
    DabParams, FlushError, FlushReport, GpuContext, MasterTexture, StampError, StrokeBrush,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCreateError {
    Grid(tile_grid::TileGridError),
}

impl std::fmt::Display for SessionCreateError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grid(error) => write!(formatter, "failed to build stroke tile grid: {error}"),
        }
    }
}

impl std::error::Error for SessionCreateError {}

impl From<tile_grid::TileGridError> for SessionCreateError {
    fn from(error: tile_grid::TileGridError) -> Self {
        Self::Grid(error)
    }
}

/// An active stroke over one master texture.
///
/// The tile size is chosen once from the brush size at session start and
/// stays fixed even when later dabs grow or shrink. Accumulation targets and
/// snapshots are allocated lazily, only for tiles the stroke touches.
pub struct StrokeSession {
    master: MasterTexture,
    layer_transform: LayerTransform,
    brush: StrokeBrush,
    grid: TileGrid,
    dirty: DirtyTileBitmap,
    accumulation_targets: Box<[Option<RenderTarget>]>,
    snapshot_targets: Box<[Option<RenderTarget>]>,
    blend_pool: RenderTargetPool,
    output_pool: RenderTargetPool,
    composite_pipeline: wgpu::RenderPipeline,
    disposed: bool,
}

fn empty_targets(tile_count: usize) -> Box<[Option<RenderTarget>]> {
    let mut targets = Vec::new();
    targets.resize_with(tile_count, || None);
    targets.into_boxed_slice()
}

impl StrokeSession {
    pub fn new(
        gpu: &mut GpuContext,
        master: MasterTexture,
        layer_transform: LayerTransform,
        brush: StrokeBrush,
        initial_brush_size: f32,
    ) -> Result<Self, SessionCreateError> {
        let tile_size = tile_size_for_stroke(master.width(), master.height(), initial_brush_size);
        let grid = TileGrid::new(master.width(), master.height(), tile_size)?;
        let tile_count = grid.tile_count();
        debug!(
            tile_size,
            x_tiles = grid.x_tile_count(),
            y_tiles = grid.y_tile_count(),
            "stroke session created",
        );
        let device = gpu.device().clone();
        let composite_pipeline = gpu
            .pipelines_mut()
            .composite_pipeline(&device, master.format())
            .clone();
        Ok(Self {
            dirty: DirtyTileBitmap::new(tile_count),
            accumulation_targets: empty_targets(tile_count),
            snapshot_targets: empty_targets(tile_count),
            blend_pool: RenderTargetPool::new(gpu.device(), "stroke.blend_target"),
            output_pool: RenderTargetPool::new(gpu.device(), "stroke.output_target"),
            composite_pipeline,
            master,
            layer_transform,
            brush,
            grid,
            disposed: false,
        })
    }

    pub fn tile_size(&self) -> u32 {
        self.grid.tile_size()
    }

    pub fn dirty_tile_count(&self) -> usize {
        self.dirty.dirty_count()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Stamps one dab, marking every tile its footprint reaches as dirty. A
    /// dab entirely outside the grid is a no-op.
    pub fn stamp(&mut self, gpu: &GpuContext, dab: &DabParams) -> Result<(), StampError> {
        if self.disposed {
            return Err(StampError::SessionDisposed);
        }
        let footprint = DabFootprint {
            center_x: dab.center_x,
            center_y: dab.center_y,
            size: dab.size,
        };
        let bounds = dab_bounding_box(&footprint, &self.layer_transform);
        let candidate_tiles = self.grid.tiles_intersecting(bounds);
        trace!(candidates = candidate_tiles.len(), "stamp dab");

        let _viewport_guard = ViewportGuard::save(gpu.viewport());
        for (tile_x, tile_y) in candidate_tiles {
            let tile_index = self.grid.tile_index(tile_x, tile_y)?;
            let tile_rect = self.grid.tile_rect(tile_x, tile_y)?;
            self.stamp_tile(gpu, tile_index, &tile_rect, &footprint, dab)?;
            self.dirty.mark(tile_index)?;
        }
        Ok(())
    }

    fn stamp_tile(
        &mut self,
        gpu: &GpuContext,
        tile_index: usize,
        tile_rect: &TileRect,
        footprint: &DabFootprint,
        dab: &DabParams,
    ) -> Result<(), StampError> {
        let accumulation = match &self.accumulation_targets[tile_index] {
            Some(target) => target.clone(),
            None => {
                // A fresh wgpu texture is zero-initialized, which is exactly
                // the empty accumulation state.
                let target = create_render_target(
                    gpu.device(),
                    tile_rect.width,
                    tile_rect.height,
                    gpu.blend_format(),
                    "stroke.accumulation",
                )?;
                self.accumulation_targets[tile_index] = Some(target.clone());
                target
            }
        };
        let blend_target =
            self.blend_pool
                .acquire(tile_rect.width, tile_rect.height, gpu.blend_format())?;

        let footprint_transform = dab_tile_transform(footprint, &self.layer_transform, tile_rect);
        gpu.pipelines().write_dab_uniform(
            gpu.queue(),
            &DabUniformGpu {
                footprint_transform,
                color: self.brush.color,
                density: dab.density,
                color_blend_strength: dab.color_blend_strength,
                concentration: dab.concentration,
                hardness: self.brush.hardness,
            },
        );
        let dab_bind_group = gpu.pipelines().dab_bind_group(gpu.device(), accumulation.view());

        gpu.viewport().set(Viewport {
            width: tile_rect.width,
            height: tile_rect.height,
        });

        let mut encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stroke.stamp"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stroke.stamp.dab_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: blend_target.view(),
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let viewport = gpu.viewport().current();
            render_pass.set_viewport(
                0.0,
                0.0,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(gpu.pipelines().dab_pipeline());
            render_pass.set_bind_group(0, &dab_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        // The blend target and accumulation share format and extent, so the
        // writeback is a plain texture copy.
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: blend_target.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: accumulation.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            accumulation.extent(),
        );
        gpu.queue().submit(Some(encoder.finish()));
        Ok(())
    }

    /// Composites every dirty tile over its snapshot and writes the results
    /// into the master texture. Each tile is a single command submission.
    pub fn flush(&mut self, gpu: &GpuContext) -> Result<FlushReport, FlushError> {
        if self.disposed {
            return Err(FlushError::SessionDisposed);
        }
        if self.dirty.is_empty() {
            return Ok(FlushReport::default());
        }

        let _viewport_guard = ViewportGuard::save(gpu.viewport());
        let dirty_indices: Vec<usize> = self.dirty.iter_dirty().collect();
        let mut tiles_flushed = 0u32;
        for tile_index in dirty_indices {
            // Cleared before the GPU work so a stamp landing mid-flush is
            // picked up next frame; re-marked on failure so the tile is
            // retried rather than dropped.
            self.dirty.clear(tile_index)?;
            if let Err(error) = self.flush_tile(gpu, tile_index) {
                self.dirty.mark(tile_index)?;
                return Err(error);
            }
            tiles_flushed += 1;
        }
        debug!(tiles_flushed, "flushed stroke tiles");
        Ok(FlushReport { tiles_flushed })
    }

    fn flush_tile(&mut self, gpu: &GpuContext, tile_index: usize) -> Result<(), FlushError> {
        let (tile_x, tile_y) = self.grid.tile_coords(tile_index)?;
        let tile_rect = self.grid.tile_rect(tile_x, tile_y)?;
        let accumulation = self.accumulation_targets[tile_index]
            .clone()
            .unwrap_or_else(|| panic!("dirty tile {tile_index} has no accumulation target"));
        let output =
            self.output_pool
                .acquire(tile_rect.width, tile_rect.height, self.master.format())?;

        let mut encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stroke.flush"),
            });

        let snapshot = match &self.snapshot_targets[tile_index] {
            Some(target) => target.clone(),
            None => {
                // Captured once per session. Later mutations of the master
                // tile do not feed back into the stroke; accumulation, not
                // the snapshot, carries the growing ink.
                let target = create_render_target(
                    gpu.device(),
                    tile_rect.width,
                    tile_rect.height,
                    self.master.format(),
                    "stroke.snapshot",
                )?;
                encoder.copy_texture_to_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: self.master.texture(),
                        mip_level: 0,
                        origin: wgpu::Origin3d {
                            x: tile_rect.x,
                            y: tile_rect.y,
                            z: 0,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture: target.texture(),
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    target.extent(),
                );
                self.snapshot_targets[tile_index] = Some(target.clone());
                target
            }
        };

        let composite_bind_group = gpu.pipelines().composite_bind_group(
            gpu.device(),
            accumulation.view(),
            snapshot.view(),
        );

        gpu.viewport().set(Viewport {
            width: tile_rect.width,
            height: tile_rect.height,
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stroke.flush.composite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output.view(),
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let viewport = gpu.viewport().current();
            render_pass.set_viewport(
                0.0,
                0.0,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(&self.composite_pipeline);
            render_pass.set_bind_group(0, &composite_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: output.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: self.master.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: tile_rect.x,
                    y: tile_rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            output.extent(),
        );
        // Snapshot copy, composite, and master writeback share one
        // submission, so the tile's master rectangle updates atomically.
        gpu.queue().submit(Some(encoder.finish()));
        Ok(())
    }

    /// Flushes remaining dirty tiles, then releases every GPU resource the
    /// session holds. Disposing twice is a no-op.
    pub fn dispose(&mut self, gpu: &GpuContext) -> Result<FlushReport, FlushError> {
        if self.disposed {
            return Ok(FlushReport::default());
        }
        let report = self.flush(gpu)?;
        self.disposed = true;
        for slot in self.accumulation_targets.iter_mut() {
            *slot = None;
        }
        for slot in self.snapshot_targets.iter_mut() {
            *slot = None;
        }
        self.blend_pool.release_all();
        self.output_pool.release_all();
        debug!("stroke session disposed");
        Ok(report)
    }
}
