//! Before-render callback registry.
//!
//! The frame loop guarantees each registered hook runs once before a frame is
//! actually rendered, after all synchronous event handling for that tick. The
//! registry is generic over an opaque hook key so the owner (for strokes, the
//! orchestrator) decides what running a hook means; this keeps the compositor
//! testable without a real rendering loop.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Debug)]
pub struct BeforeRenderHooks<K> {
    entries: Vec<(HookId, K)>,
    next_hook_id: u64,
}

impl<K> BeforeRenderHooks<K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_hook_id: 0,
        }
    }

    pub fn register(&mut self, key: K) -> HookId {
        let hook_id = HookId(self.next_hook_id);
        self.next_hook_id = self
            .next_hook_id
            .checked_add(1)
            .unwrap_or_else(|| panic!("before-render hook id space exhausted"));
        self.entries.push((hook_id, key));
        hook_id
    }

    pub fn unregister(&mut self, hook_id: HookId) -> Option<K> {
        let position = self.entries.iter().position(|(id, _)| *id == hook_id)?;
        Some(self.entries.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hook keys in registration order, one visit per frame.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.iter().map(|(_, key)| key)
    }
}

impl<K> Default for BeforeRenderHooks<K> {
    fn default() -> Self {
        Self::new()
    }
}
