//! Scoped position capture and restore.

use std::ops::{Deref, DerefMut};

use silt_vm::MemoryMap;

use crate::arena::Arena;

/// A guard that captures the arena position and restores it on drop.
///
/// Created by [`Arena::scope`]. The guard derefs to the arena, so pushes
/// go through it unchanged and scopes nest arbitrarily — each guard
/// unwinds to exactly its own capture point, releasing any spill blocks
/// created while it was alive. The guard borrows the arena; it owns
/// nothing itself.
#[must_use = "dropping the scope immediately restores the captured position"]
pub struct ArenaScope<'a, M: MemoryMap> {
    arena: &'a mut Arena<M>,
    saved: u64,
}

impl<'a, M: MemoryMap> ArenaScope<'a, M> {
    pub(crate) fn new(arena: &'a mut Arena<M>) -> Self {
        let saved = arena.position();
        Self { arena, saved }
    }

    /// The position this scope restores on drop.
    pub fn saved_position(&self) -> u64 {
        self.saved
    }
}

impl<M: MemoryMap> Deref for ArenaScope<'_, M> {
    type Target = Arena<M>;

    fn deref(&self) -> &Self::Target {
        self.arena
    }
}

impl<M: MemoryMap> DerefMut for ArenaScope<'_, M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.arena
    }
}

impl<M: MemoryMap> Drop for ArenaScope<'_, M> {
    fn drop(&mut self) {
        self.arena.pop_to(self.saved);
    }
}
