//! Flat row-major cell storage.
//!
//! Cells hold no container until the first entity arrives. A container that
//! empties is handed back to the pool, so sparse maps only pay for occupied
//! cells.

use crate::entity::Handle;
use crate::geometry::{Cell, Rect};
use crate::pool::Pool;

pub type CellList = Vec<Handle>;

/// Grid of lazily allocated per-cell handle lists.
#[derive(Debug, Default)]
pub struct SpatialGrid {
    width: i32,
    height: i32,
    cells: Vec<Option<CellList>>,
    occupied: usize,
}

impl SpatialGrid {
    /// Creates a `width × height` grid with every cell absent.
    pub fn new(width: i32, height: i32) -> Self {
        let len = width.max(0) as usize * height.max(0) as usize;
        let mut cells = Vec::with_capacity(len);
        cells.resize_with(len, || None);
        Self {
            width,
            height,
            cells,
            occupied: 0,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Number of cells currently holding a container.
    pub fn occupied_cells(&self) -> usize {
        self.occupied
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// Full grid as a rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width - 1, self.height - 1)
    }

    fn index(&self, cell: Cell) -> usize {
        cell.x as usize + cell.y as usize * self.width as usize
    }

    /// Handles stored at `cell`, empty when the cell has no container.
    pub fn get(&self, cell: Cell) -> &[Handle] {
        match &self.cells[self.index(cell)] {
            Some(list) => list.as_slice(),
            None => &[],
        }
    }

    /// Appends `handle` to `cell`, taking a container from `pool` if needed.
    pub fn insert(&mut self, cell: Cell, handle: Handle, pool: &mut Pool<CellList>) {
        let idx = self.index(cell);
        let slot = &mut self.cells[idx];
        if slot.is_none() {
            self.occupied += 1;
        }
        slot.get_or_insert_with(|| pool.acquire()).push(handle);
    }

    /// Swap-removes `handle` from `cell`. An emptied container goes back to
    /// `pool`. Returns `false` if the handle was not there.
    pub fn remove(&mut self, cell: Cell, handle: Handle, pool: &mut Pool<CellList>) -> bool {
        let idx = self.index(cell);
        let Some(list) = self.cells[idx].as_mut() else {
            return false;
        };
        let found = swap_remove_item(list, handle);
        if list.is_empty() {
            if let Some(list) = self.cells[idx].take() {
                self.occupied -= 1;
                pool.release(list);
            }
        }
        found
    }

    /// Releases every container to `pool`.
    pub fn clear(&mut self, pool: &mut Pool<CellList>) {
        for slot in &mut self.cells {
            if let Some(list) = slot.take() {
                pool.release(list);
            }
        }
        self.occupied = 0;
    }

    /// Handles in `rect`, cells in row-major order. `rect` must be in bounds.
    pub fn handles_in(&self, rect: Rect) -> impl Iterator<Item = Handle> + '_ {
        rect.cells().flat_map(move |cell| self.get(cell).iter().copied())
    }

    /// Per-cell occupancy counts in row-major order.
    pub fn occupancy(&self) -> Vec<usize> {
        self.cells
            .iter()
            .map(|slot| slot.as_ref().map_or(0, Vec::len))
            .collect()
    }
}

/// Removes the first occurrence of `item` by swapping in the last element.
pub(crate) fn swap_remove_item<T: PartialEq>(list: &mut Vec<T>, item: T) -> bool {
    match list.iter().position(|x| *x == item) {
        Some(pos) => {
            list.swap_remove(pos);
            true
        }
        None => false,
    }
}
