//! Scope frames.
//!
//! A frame is an ordinary [`Object`]. The stack holds the global frame at
//! the bottom and the current local frame on top; name resolution checks
//! exactly those two, never intermediate frames. Function calls run inside a
//! freshly opened block so parameters and locals cannot leak.

use std::cell::RefCell;
use std::rc::Rc;

use crate::object::Object;

/// Handle returned by [`FrameStack::open_block`]; closing restores the
/// stack to its state before the open. Blocks close in LIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(usize);

/// Ordered stack of scope frames.
pub struct FrameStack {
    frames: Vec<Rc<RefCell<Object>>>,
}

impl FrameStack {
    /// Create a stack with a global frame and an initial local frame.
    pub fn new() -> Self {
        FrameStack {
            frames: vec![
                Rc::new(RefCell::new(Object::new())),
                Rc::new(RefCell::new(Object::new())),
            ],
        }
    }

    /// The global (bottom) frame.
    pub fn global(&self) -> Rc<RefCell<Object>> {
        self.frames[0].clone()
    }

    /// The current local (top) frame.
    pub fn local(&self) -> Rc<RefCell<Object>> {
        self.frames[self.frames.len() - 1].clone()
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a fresh local frame.
    pub fn open_block(&mut self) -> BlockId {
        let id = BlockId(self.frames.len());
        self.frames.push(Rc::new(RefCell::new(Object::new())));
        id
    }

    /// Pop the frame opened as `id` and everything above it.
    pub fn close_block(&mut self, id: BlockId) {
        debug_assert!(id.0 >= 2, "closing a root frame");
        debug_assert!(id.0 < self.frames.len(), "block already closed");
        self.frames.truncate(id.0);
    }

    /// Frame holding `name`: the local frame, else the global frame, else
    /// nothing. Intermediate frames are never consulted.
    pub fn find(&self, name: &str) -> Option<Rc<RefCell<Object>>> {
        let local = self.local();
        if local.borrow().has(name) {
            return Some(local);
        }
        let global = self.global();
        if global.borrow().has(name) {
            return Some(global);
        }
        None
    }

    /// Empty every frame, breaking self-reference cycles at teardown.
    pub fn clear_all(&mut self) {
        for frame in &self.frames {
            frame.borrow_mut().clear();
        }
        self.frames.truncate(2);
    }
}

impl Default for FrameStack {
    fn default() -> Self {
        FrameStack::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn int(v: &Value) -> i32 {
        match v {
            Value::Int(n) => *n,
            other => panic!("not an int: {:?}", other),
        }
    }

    #[test]
    fn resolution_checks_local_then_global() {
        let mut frames = FrameStack::new();
        frames
            .global()
            .borrow_mut()
            .create("g", Value::Int(1))
            .unwrap();
        frames
            .local()
            .borrow_mut()
            .create("l", Value::Int(2))
            .unwrap();
        assert!(frames.find("g").is_some());
        assert!(frames.find("l").is_some());

        // Shadowing: the local frame wins.
        frames
            .local()
            .borrow_mut()
            .create("g", Value::Int(99))
            .unwrap();
        let frame = frames.find("g").unwrap();
        let v = frame.borrow_mut().get("g").unwrap().unwrap();
        assert_eq!(int(&v), 99);
    }

    #[test]
    fn intermediate_frames_are_skipped() {
        let mut frames = FrameStack::new();
        frames
            .local()
            .borrow_mut()
            .create("outer", Value::Int(1))
            .unwrap();
        let block = frames.open_block();
        // `outer` lives in a frame that is neither local nor global now.
        assert!(frames.find("outer").is_none());
        frames.close_block(block);
        assert!(frames.find("outer").is_some());
    }

    #[test]
    fn nested_blocks_restore_in_lifo_order() {
        let mut frames = FrameStack::new();
        let base = frames.depth();
        let a = frames.open_block();
        let b = frames.open_block();
        frames
            .local()
            .borrow_mut()
            .create("x", Value::Int(1))
            .unwrap();
        frames.close_block(b);
        assert!(frames.find("x").is_none());
        frames.close_block(a);
        assert_eq!(frames.depth(), base);
    }

    #[test]
    fn close_pops_everything_above() {
        let mut frames = FrameStack::new();
        let a = frames.open_block();
        frames.open_block();
        frames.open_block();
        frames.close_block(a);
        assert_eq!(frames.depth(), 2);
    }
}
