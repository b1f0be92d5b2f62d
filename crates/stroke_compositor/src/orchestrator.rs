//! Session lifecycle and the before-render flush driver.

use std::collections::HashMap;

use frame_hooks::{BeforeRenderHooks, HookId};
use tracing::debug;

use crate::session::{SessionCreateError, StrokeSession};
use crate::transforms::LayerTransform;
use crate::viewport::Viewport;
use crate::{
    DabParams, FlushError, FlushReport, GpuContext, MasterTexture, StampError, StrokeBrush,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrokeSessionId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    UnknownSession,
    InvalidBrushSize,
    InvalidDabSize,
    NonFiniteDabPosition,
    SessionCreate(SessionCreateError),
    Stamp(StampError),
    Flush(FlushError),
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSession => write!(formatter, "no stroke session with that id"),
            Self::InvalidBrushSize => {
                write!(formatter, "brush size must be finite and positive")
            }
            Self::InvalidDabSize => write!(formatter, "dab size must be finite and positive"),
            Self::NonFiniteDabPosition => write!(formatter, "dab position must be finite"),
            Self::SessionCreate(error) => write!(formatter, "{error}"),
            Self::Stamp(error) => write!(formatter, "{error}"),
            Self::Flush(error) => write!(formatter, "{error}"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<SessionCreateError> for OrchestratorError {
    fn from(error: SessionCreateError) -> Self {
        Self::SessionCreate(error)
    }
}

impl From<StampError> for OrchestratorError {
    fn from(error: StampError) -> Self {
        Self::Stamp(error)
    }
}

impl From<FlushError> for OrchestratorError {
    fn from(error: FlushError) -> Self {
        Self::Flush(error)
    }
}

/// Owns the GPU context and every active stroke session. Each session is
/// registered as a before-render hook so [`Self::run_before_render`] flushes
/// all pending stroke work in registration order.
pub struct StrokeOrchestrator {
    gpu: GpuContext,
    sessions: HashMap<StrokeSessionId, StrokeSession>,
    hooks: BeforeRenderHooks<StrokeSessionId>,
    hook_ids: HashMap<StrokeSessionId, HookId>,
    next_session_id: u64,
}

impl StrokeOrchestrator {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, viewport: Viewport) -> Self {
        Self {
            gpu: GpuContext::new(device, queue, viewport),
            sessions: HashMap::new(),
            hooks: BeforeRenderHooks::new(),
            hook_ids: HashMap::new(),
            next_session_id: 0,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, session_id: StrokeSessionId) -> Option<&StrokeSession> {
        self.sessions.get(&session_id)
    }

    pub fn start_stroke(
        &mut self,
        master: MasterTexture,
        layer_transform: LayerTransform,
        brush: StrokeBrush,
        initial_brush_size: f32,
    ) -> Result<StrokeSessionId, OrchestratorError> {
        if !initial_brush_size.is_finite() || initial_brush_size <= 0.0 {
            return Err(OrchestratorError::InvalidBrushSize);
        }
        let session = StrokeSession::new(
            &mut self.gpu,
            master,
            layer_transform,
            brush,
            initial_brush_size,
        )?;

        let session_id = StrokeSessionId(self.next_session_id);
        self.next_session_id = self
            .next_session_id
            .checked_add(1)
            .unwrap_or_else(|| panic!("stroke session id space exhausted"));
        let hook_id = self.hooks.register(session_id);
        self.hook_ids.insert(session_id, hook_id);
        self.sessions.insert(session_id, session);
        debug!(session_id = session_id.0, "stroke started");
        Ok(session_id)
    }

    pub fn move_stroke(
        &mut self,
        session_id: StrokeSessionId,
        dab: &DabParams,
    ) -> Result<(), OrchestratorError> {
        if !dab.size.is_finite() || dab.size <= 0.0 {
            return Err(OrchestratorError::InvalidDabSize);
        }
        if !dab.center_x.is_finite() || !dab.center_y.is_finite() {
            return Err(OrchestratorError::NonFiniteDabPosition);
        }
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(OrchestratorError::UnknownSession)?;
        session.stamp(&self.gpu, dab)?;
        Ok(())
    }

    /// Final flush, resource release, and removal of the session.
    pub fn stop_stroke(
        &mut self,
        session_id: StrokeSessionId,
    ) -> Result<FlushReport, OrchestratorError> {
        let mut session = self
            .sessions
            .remove(&session_id)
            .ok_or(OrchestratorError::UnknownSession)?;
        if let Some(hook_id) = self.hook_ids.remove(&session_id) {
            self.hooks.unregister(hook_id);
        }
        let report = session.dispose(&self.gpu)?;
        debug!(session_id = session_id.0, "stroke stopped");
        Ok(report)
    }

    /// Flushes every active session, in the order their hooks were
    /// registered. Call once per frame before rendering the master texture.
    pub fn run_before_render(&mut self) -> Result<FlushReport, OrchestratorError> {
        let session_ids: Vec<StrokeSessionId> = self.hooks.keys().copied().collect();
        let mut tiles_flushed = 0u32;
        for session_id in session_ids {
            let session = self
                .sessions
                .get_mut(&session_id)
                .unwrap_or_else(|| panic!("before-render hook refers to an unknown session"));
            let report = session.flush(&self.gpu)?;
            tiles_flushed += report.tiles_flushed;
        }
        Ok(FlushReport { tiles_flushed })
    }
}
