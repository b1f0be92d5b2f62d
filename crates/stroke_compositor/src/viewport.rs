//! Shared viewport state and a guard that restores the caller's viewport on
//! every exit path, including early returns and panics.

use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct ViewportState {
    current: Cell<Viewport>,
}

impl ViewportState {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            current: Cell::new(viewport),
        }
    }

    pub fn current(&self) -> Viewport {
        self.current.get()
    }

    pub fn set(&self, viewport: Viewport) {
        self.current.set(viewport);
    }
}

/// Snapshots the viewport at construction and writes it back on drop.
#[derive(Debug)]
pub struct ViewportGuard<'a> {
    state: &'a ViewportState,
    saved: Viewport,
}

impl<'a> ViewportGuard<'a> {
    pub fn save(state: &'a ViewportState) -> Self {
        Self {
            state,
            saved: state.current(),
        }
    }
}

impl Drop for ViewportGuard<'_> {
    fn drop(&mut self) {
        self.state.set(self.saved);
    }
}
