//! Fixed-capacity control-flow stack shared by calls and loops.
//!
//! Frames are tagged so that a `RETURN` can never consume a loop frame and a loop terminator
//! can never consume a return address. Capacity is counted in slots: a return frame uses one
//! slot, a loop frame two.
//!
//! The stack also remembers where each `EXECUTE` scope begins, so `EXIT_AND_EXECUTE` can drop
//! the frames a scope pushed without touching the caller's return frame.

use thiserror::Error;

use crate::bytecode::format::ScriptPtr;

pub const STACK_SLOTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Return(ScriptPtr),
    Loop { resume: ScriptPtr, remaining: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Return,
    Loop,
}

impl Frame {
    pub const fn slots(&self) -> usize {
        match self {
            Frame::Return(_) => 1,
            Frame::Loop { .. } => 2,
        }
    }

    pub const fn kind(&self) -> FrameKind {
        match self {
            Frame::Return(_) => FrameKind::Return,
            Frame::Loop { .. } => FrameKind::Loop,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StackFault {
    #[error("control stack overflow: {requested} slots requested with {capacity} capacity")]
    Overflow { capacity: usize, requested: usize },
    #[error("control stack underflow")]
    Underflow,
    #[error("expected a {expected:?} frame but found {found:?}")]
    FrameMismatch {
        expected: FrameKind,
        found: FrameKind,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ControlStack {
    frames: Vec<Frame>,
    used: usize,
    /// Frame depth just above each open scope's return frame, innermost last.
    scopes: Vec<usize>,
}

impl ControlStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn used_slots(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Fails without side effects when `slots` more slots would not fit.
    pub fn ensure_room(&self, slots: usize) -> Result<(), StackFault> {
        if self.used + slots > STACK_SLOTS {
            return Err(StackFault::Overflow {
                capacity: STACK_SLOTS,
                requested: self.used + slots,
            });
        }
        Ok(())
    }

    pub fn push(&mut self, frame: Frame) -> Result<(), StackFault> {
        self.ensure_room(frame.slots())?;
        self.used += frame.slots();
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Frame, StackFault> {
        let frame = self.frames.pop().ok_or(StackFault::Underflow)?;
        self.used -= frame.slots();
        while self.scopes.last().is_some_and(|&base| base > self.frames.len()) {
            self.scopes.pop();
        }
        Ok(frame)
    }

    /// Pushes the return frame of an `EXECUTE` and opens a scope above it.
    pub fn push_scope(&mut self, resume: ScriptPtr) -> Result<(), StackFault> {
        self.push(Frame::Return(resume))?;
        self.scopes.push(self.frames.len());
        Ok(())
    }

    /// Drops every frame pushed inside the innermost scope, or every frame at top level.
    /// Returns how many frames were dropped.
    pub fn unwind_scope(&mut self) -> usize {
        let base = self.scopes.last().copied().unwrap_or(0);
        let dropped = self.frames.len().saturating_sub(base);
        for frame in self.frames.drain(base.min(self.frames.len())..) {
            self.used -= frame.slots();
        }
        dropped
    }

    /// Frame `depth` positions below the top; zero is the top.
    pub fn peek(&self, depth: usize) -> Option<&Frame> {
        self.frames.iter().rev().nth(depth)
    }

    fn expect_top(&self, expected: FrameKind) -> Result<(), StackFault> {
        let top = self.frames.last().ok_or(StackFault::Underflow)?;
        if top.kind() != expected {
            return Err(StackFault::FrameMismatch {
                expected,
                found: top.kind(),
            });
        }
        Ok(())
    }

    pub fn pop_return(&mut self) -> Result<ScriptPtr, StackFault> {
        self.expect_top(FrameKind::Return)?;
        match self.pop()? {
            Frame::Return(ptr) => Ok(ptr),
            Frame::Loop { .. } => Err(StackFault::FrameMismatch {
                expected: FrameKind::Return,
                found: FrameKind::Loop,
            }),
        }
    }

    /// Mutable access to the `(resume, remaining)` pair of the loop frame on top.
    pub fn top_loop_mut(&mut self) -> Result<(ScriptPtr, &mut i32), StackFault> {
        self.expect_top(FrameKind::Loop)?;
        match self.frames.last_mut() {
            Some(Frame::Loop { resume, remaining }) => Ok((*resume, remaining)),
            Some(Frame::Return(_)) => Err(StackFault::FrameMismatch {
                expected: FrameKind::Loop,
                found: FrameKind::Return,
            }),
            None => Err(StackFault::Underflow),
        }
    }

    pub fn pop_loop(&mut self) -> Result<(ScriptPtr, i32), StackFault> {
        self.expect_top(FrameKind::Loop)?;
        match self.pop()? {
            Frame::Loop { resume, remaining } => Ok((resume, remaining)),
            Frame::Return(_) => Err(StackFault::FrameMismatch {
                expected: FrameKind::Loop,
                found: FrameKind::Return,
            }),
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.scopes.clear();
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::format::BufferId;

    fn ptr(offset: u32) -> ScriptPtr {
        ScriptPtr::new(BufferId(0), offset)
    }

    #[test]
    fn counts_slots_per_frame_kind() {
        let mut stack = ControlStack::new();
        stack.push(Frame::Return(ptr(4))).unwrap();
        stack
            .push(Frame::Loop {
                resume: ptr(8),
                remaining: 3,
            })
            .unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.used_slots(), 3);
        assert_eq!(stack.pop_loop().unwrap(), (ptr(8), 3));
        assert_eq!(stack.pop_return().unwrap(), ptr(4));
        assert!(stack.is_empty());
    }

    #[test]
    fn overflow_leaves_stack_unchanged() {
        let mut stack = ControlStack::new();
        for offset in 0..STACK_SLOTS as u32 - 1 {
            stack.push(Frame::Return(ptr(offset))).unwrap();
        }
        let err = stack
            .push(Frame::Loop {
                resume: ptr(0),
                remaining: 1,
            })
            .unwrap_err();
        assert!(matches!(err, StackFault::Overflow { capacity: STACK_SLOTS, .. }));
        assert_eq!(stack.used_slots(), STACK_SLOTS - 1);
        stack.push(Frame::Return(ptr(99))).unwrap();
        assert_eq!(stack.used_slots(), STACK_SLOTS);
    }

    #[test]
    fn mismatched_pops_leave_stack_unchanged() {
        let mut stack = ControlStack::new();
        assert_eq!(stack.pop(), Err(StackFault::Underflow));
        stack
            .push(Frame::Loop {
                resume: ptr(0),
                remaining: 0,
            })
            .unwrap();
        assert_eq!(
            stack.pop_return(),
            Err(StackFault::FrameMismatch {
                expected: FrameKind::Return,
                found: FrameKind::Loop,
            })
        );
        assert_eq!(stack.depth(), 1);
        {
            let (_, remaining) = stack.top_loop_mut().unwrap();
            *remaining = 5;
        }
        assert_eq!(
            stack.peek(0),
            Some(&Frame::Loop {
                resume: ptr(0),
                remaining: 5
            })
        );
    }

    #[test]
    fn unwinding_a_scope_keeps_the_callers_frame() {
        let mut stack = ControlStack::new();
        stack.push(Frame::Return(ptr(4))).unwrap();
        stack.push_scope(ptr(8)).unwrap();
        stack
            .push(Frame::Loop {
                resume: ptr(12),
                remaining: 2,
            })
            .unwrap();
        stack.push(Frame::Return(ptr(16))).unwrap();

        assert_eq!(stack.unwind_scope(), 2);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.used_slots(), 2);
        assert_eq!(stack.pop_return().unwrap(), ptr(8));

        assert_eq!(stack.unwind_scope(), 1);
        assert!(stack.is_empty());
        assert_eq!(stack.used_slots(), 0);
    }
}
