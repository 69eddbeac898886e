//! The global name table and its hook frames.
//!
//! Lexically scoped shadowing is implemented with one table: each name maps to
//! a stack of currently visible declarations, top = current binding. A hook
//! frame is a checkpoint; hooking a declaration pushes onto its name's stack
//! and records the push in the current frame, and popping a frame unbinds
//! everything it hooked, in LIFO order. Every `hook_push` must be paired with
//! a `hook_pop` on all exit paths, including early error returns; pass
//! boundaries assert the balance in debug builds.

use ahash::AHashMap;

use crate::{intern::NameId, node::NodeId};

#[derive(Debug, Default)]
pub struct NameTable {
    /// Per-name binding stacks; the last element is the visible binding.
    stacks: AHashMap<NameId, Vec<NodeId>>,
    /// Open hook frames; each records the names it bound, in bind order.
    frames: Vec<Vec<NameId>>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new hook frame.
    pub fn hook_push(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Binds `dcl` as the visible declaration for `name` within the current
    /// frame. Returns the previously visible declaration, if any, so callers
    /// can detect duplicates within their own frame.
    pub fn hook_node(&mut self, name: NameId, dcl: NodeId) -> Option<NodeId> {
        let stack = self.stacks.entry(name).or_default();
        let prev = stack.last().copied();
        stack.push(dcl);
        self.frames
            .last_mut()
            .expect("hook_node outside of a hook frame")
            .push(name);
        prev
    }

    /// Closes the current frame, unbinding its names in LIFO order.
    pub fn hook_pop(&mut self) {
        let frame = self.frames.pop().expect("hook_pop without matching hook_push");
        for name in frame.into_iter().rev() {
            let stack = self.stacks.get_mut(&name).expect("unhooking a name that was never hooked");
            stack.pop();
        }
    }

    /// The currently visible declaration for `name`.
    pub fn find(&self, name: NameId) -> Option<NodeId> {
        self.stacks.get(&name).and_then(|stack| stack.last().copied())
    }

    /// True if `name` was bound by the innermost open frame (duplicate
    /// detection at hook sites).
    pub fn bound_in_current_frame(&self, name: NameId) -> bool {
        self.frames.last().is_some_and(|frame| frame.contains(&name))
    }

    /// Number of open frames. Used to assert hook balance at pass boundaries.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    fn ids() -> (NameId, NameId) {
        let mut interner = Interner::new();
        (interner.intern("a"), interner.intern("b"))
    }

    #[test]
    fn shadowing_restores_on_pop() {
        let (a, _) = ids();
        let outer = NodeId::new(10);
        let inner = NodeId::new(20);
        let mut tbl = NameTable::new();

        tbl.hook_push();
        tbl.hook_node(a, outer);
        assert_eq!(tbl.find(a), Some(outer));

        tbl.hook_push();
        tbl.hook_node(a, inner);
        assert_eq!(tbl.find(a), Some(inner));
        tbl.hook_pop();

        assert_eq!(tbl.find(a), Some(outer));
        tbl.hook_pop();
        assert_eq!(tbl.find(a), None);
        assert_eq!(tbl.depth(), 0);
    }

    #[test]
    fn frames_unbind_all_their_names() {
        let (a, b) = ids();
        let mut tbl = NameTable::new();
        tbl.hook_push();
        tbl.hook_node(a, NodeId::new(1));
        tbl.hook_node(b, NodeId::new(2));
        assert!(tbl.bound_in_current_frame(a));
        tbl.hook_pop();
        assert_eq!(tbl.find(a), None);
        assert_eq!(tbl.find(b), None);
    }

    #[test]
    fn hook_reports_previous_binding() {
        let (a, _) = ids();
        let mut tbl = NameTable::new();
        tbl.hook_push();
        assert_eq!(tbl.hook_node(a, NodeId::new(1)), None);
        assert_eq!(tbl.hook_node(a, NodeId::new(2)), Some(NodeId::new(1)));
        tbl.hook_pop();
    }
}
