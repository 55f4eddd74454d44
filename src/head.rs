//! Heads: cursors into a memory space
//!
//! A head is an index plus the memory space it points into. It never holds
//! the memory itself, so every operation that needs bounds takes the current
//! length of the space it points at.

use serde::{Deserialize, Serialize};

/// Number of named heads per thread.
pub const NUM_HEADS: usize = 4;

/// The four named heads. The numeric value is also the nop modifier that
/// selects the head.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadId {
    #[default]
    Ip = 0,
    Read = 1,
    Write = 2,
    Flow = 3,
}

impl HeadId {
    pub const ALL: [HeadId; NUM_HEADS] = [HeadId::Ip, HeadId::Read, HeadId::Write, HeadId::Flow];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Map a nop modifier to a head; out-of-range modifiers yield `None`.
    pub fn from_index(idx: usize) -> Option<HeadId> {
        Self::ALL.get(idx).copied()
    }
}

/// Position within one memory space. `pos` may transiently be out of range
/// (a pending jump or a -1 "not found" marker) until the next `adjust`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Head {
    pub pos: i32,
    pub space: usize,
}

impl Head {
    pub fn new(pos: i32, space: usize) -> Self {
        Self { pos, space }
    }

    /// Bring `pos` back into `[0, len)`. Negative positions clamp to the
    /// front; positions past the end wrap.
    #[inline]
    pub fn adjust(&mut self, len: usize) {
        let len = len as i32;
        if self.pos >= 0 && self.pos < len {
            return;
        }
        if len == 0 || self.pos < 0 {
            self.pos = 0;
            return;
        }
        self.pos %= len;
    }

    #[inline]
    pub fn advance(&mut self, len: usize) {
        self.pos += 1;
        self.adjust(len);
    }

    #[inline]
    pub fn retreat(&mut self, len: usize) {
        self.pos -= 1;
        self.adjust(len);
    }

    #[inline]
    pub fn jump(&mut self, delta: i32, len: usize) {
        self.pos = self.pos.wrapping_add(delta);
        self.adjust(len);
    }

    /// Set the position within the current space and adjust it.
    #[inline]
    pub fn set(&mut self, pos: i32, len: usize) {
        self.pos = pos;
        self.adjust(len);
    }

    /// Raw move with no bounds handling.
    #[inline]
    pub fn abs_jump(&mut self, delta: i32) {
        self.pos = self.pos.wrapping_add(delta);
    }

    #[inline]
    pub fn at_end(&self, len: usize) -> bool {
        self.pos + 1 >= len as i32
    }

    #[inline]
    pub fn at_front(&self) -> bool {
        self.pos == 0
    }

    #[inline]
    pub fn in_memory(&self, len: usize) -> bool {
        self.pos >= 0 && self.pos < len as i32
    }

    /// Position as an index; only meaningful after `adjust`.
    #[inline]
    pub fn index(&self) -> usize {
        self.pos.max(0) as usize
    }

    /// Pack space and position into one register value.
    #[inline]
    pub fn full_location(&self) -> i32 {
        ((self.space as i32) << 16) | (self.pos & 0xffff)
    }

    /// Unpack a value produced by `full_location`.
    #[inline]
    pub fn from_full_location(value: i32) -> Self {
        Self {
            pos: value & 0xffff,
            space: ((value >> 16) & 0x7fff) as usize,
        }
    }
}
