use crate::{
    DabParams, FlushError, LayerTransform, MasterTexture, OrchestratorError, StampError,
    StrokeBrush, StrokeOrchestrator, StrokeSession, Viewport,
};

fn create_device_queue() -> (wgpu::Device, wgpu::Queue) {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .expect("request wgpu adapter");
        let limits = adapter.limits();
        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("stroke_compositor tests"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .expect("request wgpu device")
    })
}

const TEST_VIEWPORT: Viewport = Viewport {
    width: 800,
    height: 600,
};

fn create_master(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    fill: [u8; 4],
) -> MasterTexture {
    let master = MasterTexture::create(
        device,
        width,
        height,
        wgpu::TextureFormat::Rgba8Unorm,
        "test.master",
    )
    .expect("create master texture");
    fill_master(queue, &master, fill);
    master
}

fn fill_master(queue: &wgpu::Queue, master: &MasterTexture, fill: [u8; 4]) {
    let pixel_count = (master.width() * master.height()) as usize;
    let mut data = Vec::with_capacity(pixel_count * 4);
    for _ in 0..pixel_count {
        data.extend_from_slice(&fill);
    }
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: master.texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(master.width() * 4),
            rows_per_image: Some(master.height()),
        },
        wgpu::Extent3d {
            width: master.width(),
            height: master.height(),
            depth_or_array_layers: 1,
        },
    );
}

/// Reads the whole texture back as tightly packed RGBA8 rows.
fn read_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let unpadded_bytes_per_row = width * 4;
    let padded_bytes_per_row = unpadded_bytes_per_row.next_multiple_of(256);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test.readback"),
        size: (padded_bytes_per_row * height) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder =
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    slice.map_async(wgpu::MapMode::Read, |result| {
        result.expect("map readback buffer");
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("wait for readback");

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
    for row in 0..height {
        let start = (row * padded_bytes_per_row) as usize;
        pixels.extend_from_slice(&mapped[start..start + unpadded_bytes_per_row as usize]);
    }
    drop(mapped);
    buffer.unmap();
    pixels
}

fn pixel_at(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * width + x) * 4) as usize;
    [
        pixels[offset],
        pixels[offset + 1],
        pixels[offset + 2],
        pixels[offset + 3],
    ]
}

fn black_brush() -> StrokeBrush {
    StrokeBrush {
        color: [0.0, 0.0, 0.0, 1.0],
        hardness: 0.8,
    }
}

fn center_dab() -> DabParams {
    DabParams {
        center_x: 128.0,
        center_y: 128.0,
        size: 64.0,
        density: 1.0,
        color_blend_strength: 1.0,
        concentration: 1.0,
    }
}

#[test]
fn stamp_dirties_covered_tiles_and_flush_writes_the_master() {
    let (device, queue) = create_device_queue();
    let mut gpu = crate::GpuContext::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 256, 256, [255, 255, 255, 255]);

    let mut session = StrokeSession::new(
        &mut gpu,
        master.clone(),
        LayerTransform::identity(),
        black_brush(),
        64.0,
    )
    .expect("create session");
    assert_eq!(session.tile_size(), 64);

    session.stamp(&gpu, &center_dab()).expect("stamp dab");
    // The 64px dab at (128, 128) straddles the corner of four 64px tiles.
    assert_eq!(session.dirty_tile_count(), 4);

    let report = session.flush(&gpu).expect("flush");
    assert_eq!(report.tiles_flushed, 4);
    assert_eq!(session.dirty_tile_count(), 0);

    let pixels = read_rgba8(&device, &queue, master.texture(), 256, 256);
    let center = pixel_at(&pixels, 256, 128, 128);
    assert!(
        center[0] < 30 && center[1] < 30 && center[2] < 30,
        "dab center should be near black, got {center:?}",
    );
    let untouched = pixel_at(&pixels, 256, 10, 10);
    assert_eq!(untouched, [255, 255, 255, 255]);
}

#[test]
fn flush_without_new_stamps_does_nothing() {
    let (device, queue) = create_device_queue();
    let mut gpu = crate::GpuContext::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 256, 256, [255, 255, 255, 255]);

    let mut session = StrokeSession::new(
        &mut gpu,
        master,
        LayerTransform::identity(),
        black_brush(),
        64.0,
    )
    .expect("create session");

    session.stamp(&gpu, &center_dab()).expect("stamp dab");
    session.flush(&gpu).expect("first flush");

    let report = session.flush(&gpu).expect("second flush");
    assert_eq!(report.tiles_flushed, 0);
}

#[test]
fn out_of_bounds_dab_is_a_no_op() {
    let (device, queue) = create_device_queue();
    let mut gpu = crate::GpuContext::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 256, 256, [255, 255, 255, 255]);

    let mut session = StrokeSession::new(
        &mut gpu,
        master,
        LayerTransform::identity(),
        black_brush(),
        64.0,
    )
    .expect("create session");

    let dab = DabParams {
        center_x: -500.0,
        center_y: -500.0,
        ..center_dab()
    };
    session.stamp(&gpu, &dab).expect("stamp off-canvas dab");
    assert_eq!(session.dirty_tile_count(), 0);
    let report = session.flush(&gpu).expect("flush");
    assert_eq!(report.tiles_flushed, 0);
}

#[test]
fn snapshots_stay_frozen_while_the_session_lives() {
    let (device, queue) = create_device_queue();
    let mut gpu = crate::GpuContext::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 256, 256, [255, 255, 255, 255]);

    let mut session = StrokeSession::new(
        &mut gpu,
        master.clone(),
        LayerTransform::identity(),
        black_brush(),
        64.0,
    )
    .expect("create session");

    session.stamp(&gpu, &center_dab()).expect("first stamp");
    session.flush(&gpu).expect("first flush");

    // Clobber the master with red, then stroke again. The session must keep
    // compositing over the white content it snapshotted, not the red.
    fill_master(&queue, &master, [255, 0, 0, 255]);
    session.stamp(&gpu, &center_dab()).expect("second stamp");
    session.flush(&gpu).expect("second flush");

    let pixels = read_rgba8(&device, &queue, master.texture(), 256, 256);
    // (70, 128) is inside a stroked tile but outside the dab's radius.
    let in_tile = pixel_at(&pixels, 256, 70, 128);
    assert_eq!(
        in_tile,
        [255, 255, 255, 255],
        "frozen snapshot should restore the original background",
    );
    // A tile the stroke never touched keeps the red overwrite.
    let outside = pixel_at(&pixels, 256, 10, 10);
    assert_eq!(outside, [255, 0, 0, 255]);
}

#[test]
fn disposed_session_rejects_further_work() {
    let (device, queue) = create_device_queue();
    let mut gpu = crate::GpuContext::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 256, 256, [255, 255, 255, 255]);

    let mut session = StrokeSession::new(
        &mut gpu,
        master,
        LayerTransform::identity(),
        black_brush(),
        64.0,
    )
    .expect("create session");

    session.stamp(&gpu, &center_dab()).expect("stamp dab");
    let report = session.dispose(&gpu).expect("dispose");
    assert_eq!(report.tiles_flushed, 4);
    assert!(session.is_disposed());

    assert_eq!(
        session.stamp(&gpu, &center_dab()).expect_err("stamp"),
        StampError::SessionDisposed,
    );
    assert_eq!(
        session.flush(&gpu).expect_err("flush"),
        FlushError::SessionDisposed,
    );

    // A second dispose is inert.
    let report = session.dispose(&gpu).expect("second dispose");
    assert_eq!(report.tiles_flushed, 0);
}

#[test]
fn non_square_texture_flushes_clamped_edge_tiles() {
    let (device, queue) = create_device_queue();
    let mut gpu = crate::GpuContext::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 300, 130, [0, 0, 255, 255]);

    let mut session = StrokeSession::new(
        &mut gpu,
        master.clone(),
        LayerTransform::identity(),
        black_brush(),
        20.0,
    )
    .expect("create session");

    // Dab hanging over the bottom-right corner reaches the clamped tiles.
    let dab = DabParams {
        center_x: 298.0,
        center_y: 128.0,
        size: 20.0,
        density: 1.0,
        color_blend_strength: 1.0,
        concentration: 1.0,
    };
    session.stamp(&gpu, &dab).expect("stamp corner dab");
    assert!(session.dirty_tile_count() > 0);
    session.flush(&gpu).expect("flush corner tiles");

    let pixels = read_rgba8(&device, &queue, master.texture(), 300, 130);
    let corner = pixel_at(&pixels, 300, 298, 128);
    assert!(corner[0] < 30 && corner[2] < 30, "corner dab, got {corner:?}");
    let far = pixel_at(&pixels, 300, 5, 5);
    assert_eq!(far, [0, 0, 255, 255]);
}

#[test]
fn orchestrator_drives_sessions_through_before_render_hooks() {
    let (device, queue) = create_device_queue();
    let mut orchestrator = StrokeOrchestrator::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 256, 256, [255, 255, 255, 255]);

    let session_id = orchestrator
        .start_stroke(
            master.clone(),
            LayerTransform::identity(),
            black_brush(),
            64.0,
        )
        .expect("start stroke");
    assert_eq!(orchestrator.active_session_count(), 1);

    orchestrator
        .move_stroke(session_id, &center_dab())
        .expect("move stroke");
    let report = orchestrator.run_before_render().expect("before-render flush");
    assert_eq!(report.tiles_flushed, 4);

    let report = orchestrator.run_before_render().expect("idle flush");
    assert_eq!(report.tiles_flushed, 0);

    let report = orchestrator.stop_stroke(session_id).expect("stop stroke");
    assert_eq!(report.tiles_flushed, 0);
    assert_eq!(orchestrator.active_session_count(), 0);

    assert_eq!(
        orchestrator
            .move_stroke(session_id, &center_dab())
            .expect_err("stamp on stopped stroke"),
        OrchestratorError::UnknownSession,
    );
}

#[test]
fn orchestrator_validates_sizes() {
    let (device, queue) = create_device_queue();
    let mut orchestrator = StrokeOrchestrator::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 256, 256, [255, 255, 255, 255]);

    assert_eq!(
        orchestrator
            .start_stroke(
                master.clone(),
                LayerTransform::identity(),
                black_brush(),
                0.0,
            )
            .expect_err("zero brush size"),
        OrchestratorError::InvalidBrushSize,
    );

    let session_id = orchestrator
        .start_stroke(master, LayerTransform::identity(), black_brush(), 64.0)
        .expect("start stroke");
    let dab = DabParams {
        size: f32::NAN,
        ..center_dab()
    };
    assert_eq!(
        orchestrator
            .move_stroke(session_id, &dab)
            .expect_err("nan dab size"),
        OrchestratorError::InvalidDabSize,
    );
    let dab = DabParams {
        center_x: f32::INFINITY,
        ..center_dab()
    };
    assert_eq!(
        orchestrator
            .move_stroke(session_id, &dab)
            .expect_err("infinite dab position"),
        OrchestratorError::NonFiniteDabPosition,
    );
}

#[test]
fn scaled_layer_stroke_lands_where_the_screen_footprint_says() {
    let (device, queue) = create_device_queue();
    let mut gpu = crate::GpuContext::new(&device, &queue, TEST_VIEWPORT);
    let master = create_master(&device, &queue, 256, 256, [255, 255, 255, 255]);

    // Layer drawn at 2x on screen: a dab centered at layer (64, 64) with a
    // 32px screen footprint covers only a 16px square of layer pixels.
    let layer = LayerTransform::new(crate::transforms::scale(2.0, 2.0))
        .expect("valid layer transform");
    let mut session = StrokeSession::new(&mut gpu, master.clone(), layer, black_brush(), 32.0)
        .expect("create session");

    let dab = DabParams {
        center_x: 64.0,
        center_y: 64.0,
        size: 32.0,
        density: 1.0,
        color_blend_strength: 1.0,
        concentration: 1.0,
    };
    session.stamp(&gpu, &dab).expect("stamp dab");
    session.flush(&gpu).expect("flush");

    let pixels = read_rgba8(&device, &queue, master.texture(), 256, 256);
    let center = pixel_at(&pixels, 256, 64, 64);
    assert!(center[0] < 30, "dab center should be inked, got {center:?}");
    // 12 layer pixels out is past the 8px layer-space radius.
    let beyond = pixel_at(&pixels, 256, 76, 64);
    assert_eq!(beyond, [255, 255, 255, 255]);
}
