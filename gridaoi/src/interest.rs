//! Interest mask and the visibility rule.
//!
//! Bit 0 of an entity's [`Mask`] decides whether it registers itself in the
//! watch lists of entities whose view rectangle contains it. The remaining
//! bits belong to the application and are carried through untouched.

use crate::geometry::Cell;

/// Per-entity flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mask(u8);

impl Mask {
    /// Engine-defined interest bit.
    pub const INTEREST: u8 = 0x1;

    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Mask with only the interest bit set.
    pub const fn interested() -> Self {
        Self(Self::INTEREST)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Application-defined bits, with the interest bit cleared.
    pub const fn app_bits(self) -> u8 {
        self.0 & !Self::INTEREST
    }

    /// Returns `true` if this entity joins the watch lists of entities that can see it.
    pub const fn has_interest(self) -> bool {
        self.0 & Self::INTEREST != 0
    }
}

impl From<u8> for Mask {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

impl From<Mask> for u8 {
    fn from(mask: Mask) -> Self {
        mask.0
    }
}

/// Fixed half-extent view rectangle, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewRange {
    pub half_width: i32,
    pub half_height: i32,
}

impl ViewRange {
    pub const fn new(half_width: i32, half_height: i32) -> Self {
        Self {
            half_width,
            half_height,
        }
    }

    /// Returns `true` if `target` lies within the view rectangle centred on
    /// `observer`. Clamping to the grid never excludes an in-grid cell, so the
    /// test is symmetric.
    pub fn sees(&self, observer: Cell, target: Cell) -> bool {
        (target.x - observer.x).abs() <= self.half_width
            && (target.y - observer.y).abs() <= self.half_height
    }

    /// Returns `true` if `watcher` belongs in the watch list of the entity at
    /// `watched`.
    pub fn watches(&self, watcher_mask: Mask, watcher: Cell, watched: Cell) -> bool {
        watcher_mask.has_interest() && self.sees(watched, watcher)
    }
}
