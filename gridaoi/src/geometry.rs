//! Cell coordinates and inclusive cell rectangles.
//!
//! A move's delta region (a view rectangle minus its overlap with the other
//! view rectangle) is generally not a rectangle. [`Rect::subtract_columns`]
//! splits it into one vertical strip per column so enter and exit scans only
//! touch cells whose visibility actually changed.

use smallvec::SmallVec;

use crate::config::STRIPS_INLINE;

/// Grid cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Inclusive rectangle of cells: `[x, dx] × [y, dy]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
}

/// Strips produced by one delta decomposition.
pub type Strips = SmallVec<[Rect; STRIPS_INLINE]>;

/// A column strip whose top ended up below its bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvertedStrip {
    pub column: i32,
    pub top: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, dx: i32, dy: i32) -> Self {
        Self { x, y, dx, dy }
    }

    /// The rectangle `[cx - rw, cx + rw] × [cy - rh, cy + rh]` clamped to a
    /// `width × height` grid.
    pub fn around(center: Cell, rw: i32, rh: i32, width: i32, height: i32) -> Self {
        Self {
            x: center.x.saturating_sub(rw).max(0),
            y: center.y.saturating_sub(rh).max(0),
            dx: center.x.saturating_add(rw).min(width - 1),
            dy: center.y.saturating_add(rh).min(height - 1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x > self.dx || self.y > self.dy
    }

    /// Number of cells covered.
    pub fn area(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.dx - self.x + 1) as usize * (self.dy - self.y + 1) as usize
    }

    /// Overlap of two rectangles, or `None` when they are disjoint.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let it = Rect {
            x: self.x.max(other.x),
            y: self.y.max(other.y),
            dx: self.dx.min(other.dx),
            dy: self.dy.min(other.dy),
        };
        if it.is_empty() {
            None
        } else {
            Some(it)
        }
    }

    /// Decomposes `self` minus `inner` into one-column strips.
    ///
    /// `inner` must lie within `self` (it is the intersection of `self` with
    /// another rectangle). Columns outside `inner`'s horizontal span keep
    /// their full height. Columns inside it keep only the rows above and below
    /// `inner`; for two equally sized clamped view rectangles at most one of
    /// those is non-empty.
    pub fn subtract_columns(&self, inner: &Rect) -> Result<Strips, InvertedStrip> {
        let mut strips = Strips::new();
        for column in self.x..=self.dx {
            if column < inner.x || column > inner.dx {
                push_strip(&mut strips, column, self.y, self.dy)?;
                continue;
            }
            if self.y < inner.y {
                push_strip(&mut strips, column, self.y, inner.y - 1)?;
            }
            if self.dy > inner.dy {
                push_strip(&mut strips, column, inner.dy + 1, self.dy)?;
            }
        }
        Ok(strips)
    }

    /// Iterates covered cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> {
        let Rect { x, y, dx, dy } = *self;
        (y..=dy).flat_map(move |row| (x..=dx).map(move |col| Cell::new(col, row)))
    }
}

fn push_strip(
    strips: &mut Strips,
    column: i32,
    top: i32,
    bottom: i32,
) -> Result<(), InvertedStrip> {
    if top > bottom {
        return Err(InvertedStrip {
            column,
            top,
            bottom,
        });
    }
    strips.push(Rect::new(column, top, column, bottom));
    Ok(())
}
