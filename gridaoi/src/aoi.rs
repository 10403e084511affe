//! Grid area-of-interest engine.
//!
//! [`GridAoi`] maps pixel positions onto a fixed cell grid and keeps, for each
//! entity, the list of entities that can see it (`interest_me`). Moves only
//! scan the cells whose visibility changed: the old view rectangle minus the
//! overlap is exited, the new one minus the overlap is entered, and entities
//! inside the overlap are left alone.
//!
//! All public coordinates are pixels; internally only cell coordinates are
//! kept.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use log::{debug, error, trace, warn};

use crate::config::{ceil_div, AoiConfig, ConfigError, DEFAULT_MAX_ANOMALIES};
use crate::entity::{Entity, EntityId, EntityRegistry, EntityView, Handle};
use crate::geometry::{Cell, InvertedStrip, Rect, Strips};
use crate::grid::{swap_remove_item, CellList, SpatialGrid};
use crate::interest::{Mask, ViewRange};
use crate::pool::Pool;
use crate::stats::AoiStats;
use crate::AoiError;

/// Non-fatal internal inconsistency. Live operations log and record these
/// and keep serving the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// A removal did not find the entity in its recorded cell.
    MissingFromCell { id: EntityId, cell: Cell },
    /// Delta decomposition produced a strip with top below bottom. The move
    /// fell back to a full rescan.
    InvertedStrip { id: EntityId, strip: InvertedStrip },
    /// A scan met handles that no longer resolve to a live entity.
    StaleHandle { id: EntityId, count: usize },
    /// A live entity is not stored exactly once in its recorded cell, or a
    /// cell stores an entity recorded elsewhere.
    Membership { id: EntityId, cell: Cell },
    /// An entity's watch list differs from a full rescan.
    WatchList {
        id: EntityId,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::MissingFromCell { id, cell } => {
                write!(f, "entity {} missing from cell ({},{})", id, cell.x, cell.y)
            }
            Anomaly::InvertedStrip { id, strip } => write!(
                f,
                "entity {} move produced inverted strip at column {}: {} > {}",
                id, strip.column, strip.top, strip.bottom
            ),
            Anomaly::StaleHandle { id, count } => {
                write!(f, "scan for entity {} met {} stale handles", id, count)
            }
            Anomaly::Membership { id, cell } => {
                write!(f, "entity {} cell membership broken at ({},{})", id, cell.x, cell.y)
            }
            Anomaly::WatchList {
                id,
                expected,
                actual,
            } => write!(
                f,
                "entity {} watch list mismatch: expected {} watchers, found {}",
                id, expected, actual
            ),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    enters: u64,
    exits: u64,
    updates: u64,
    same_cell_moves: u64,
    strips_scanned: u64,
    full_rescans: u64,
    anomalies: u64,
}

/// Grid-based interest engine for one map.
///
/// Call [`configure`](Self::configure) and then
/// [`set_visual_range`](Self::set_visual_range) (or use
/// [`from_config`](Self::from_config)) before entering entities.
#[derive(Debug)]
pub struct GridAoi {
    cell_size: i32,
    /// Requested visual range in pixels, re-derived on reconfiguration.
    visual_pixels: Option<(i32, i32)>,
    view: ViewRange,
    grid: SpatialGrid,
    registry: EntityRegistry,
    lists: Pool<CellList>,
    anomalies: VecDeque<Anomaly>,
    max_anomalies: usize,
    counters: Counters,
    #[cfg(test)]
    invert_next_delta: bool,
}

impl Default for GridAoi {
    fn default() -> Self {
        Self::new()
    }
}

impl GridAoi {
    /// Creates an unconfigured map with default pooling.
    pub fn new() -> Self {
        Self::with_pool(Pool::default())
    }

    /// Creates an unconfigured map recycling containers through `lists`.
    pub fn with_pool(lists: Pool<CellList>) -> Self {
        Self {
            cell_size: 0,
            visual_pixels: None,
            view: ViewRange::default(),
            grid: SpatialGrid::default(),
            registry: EntityRegistry::new(),
            lists,
            anomalies: VecDeque::new(),
            max_anomalies: DEFAULT_MAX_ANOMALIES,
            counters: Counters::default(),
            #[cfg(test)]
            invert_next_delta: false,
        }
    }

    /// Creates a configured map with its visual range set.
    pub fn from_config(config: &AoiConfig) -> Result<Self, AoiError> {
        config.validate()?;
        let mut aoi = Self::with_pool(Pool::new(
            config.pool_max_cached,
            config.max_pooled_capacity,
        ));
        aoi.max_anomalies = config.max_anomalies;
        aoi.configure(config.map_width, config.map_height, config.cell_size)?;
        aoi.set_visual_range(config.visual_width, config.visual_height)?;
        Ok(aoi)
    }

    /// Sets the map size in pixels and the pixel size of one cell.
    ///
    /// The grid is `ceil(width / cell_size) × ceil(height / cell_size)` cells.
    /// Reconfiguring releases every entity currently on the map; a visual
    /// range set earlier is re-derived for the new cell size.
    pub fn configure(&mut self, width: i32, height: i32, cell_size: i32) -> Result<(), AoiError> {
        if cell_size <= 0 {
            warn!("Rejected cell size {}", cell_size);
            return Err(ConfigError::InvalidCellSize.into());
        }
        if width <= 0 || height <= 0 {
            warn!("Rejected map size {}x{}", width, height);
            return Err(ConfigError::InvalidMapSize.into());
        }

        self.release_all();
        self.cell_size = cell_size;
        self.grid = SpatialGrid::new(ceil_div(width, cell_size), ceil_div(height, cell_size));
        if let Some((vw, vh)) = self.visual_pixels {
            self.view = self.derive_view(vw, vh);
        }
        debug!(
            "Configured {}x{} px map as {}x{} cells of {} px",
            width,
            height,
            self.grid.width(),
            self.grid.height(),
            cell_size
        );
        Ok(())
    }

    /// Sets the view half-extents in pixels. Each is rounded up to whole
    /// cells and capped at the grid size; zero limits an entity's view to its
    /// own cell.
    pub fn set_visual_range(&mut self, width: i32, height: i32) -> Result<(), AoiError> {
        if self.cell_size <= 0 {
            warn!("Visual range set before map size");
            return Err(ConfigError::VisualRangeBeforeSize.into());
        }
        if width < 0 || height < 0 {
            warn!("Rejected visual range {}x{}", width, height);
            return Err(ConfigError::InvalidVisualRange.into());
        }
        self.visual_pixels = Some((width, height));
        self.view = self.derive_view(width, height);
        debug!(
            "Visual range {}x{} px is {}x{} cells each side",
            width, height, self.view.half_width, self.view.half_height
        );
        Ok(())
    }

    /// Places a new entity at pixel `(x, y)`.
    ///
    /// Every entity already within the new entity's view is appended to
    /// `out_candidates`, whatever its mask; the caller decides what to
    /// broadcast. Watch lists are updated in both directions.
    pub fn enter(
        &mut self,
        id: EntityId,
        x: i32,
        y: i32,
        mask: impl Into<Mask>,
        out_candidates: Option<&mut Vec<EntityId>>,
    ) -> Result<(), AoiError> {
        let cell = self.cell_at(x, y)?;
        if self.registry.contains_id(id) {
            return Err(AoiError::DuplicateId(id));
        }

        let mask = mask.into();
        let handle = self.registry.insert(Entity {
            id,
            cell,
            mask,
            interest_me: self.lists.acquire(),
        });

        // Scan before inserting so the entity never sees itself.
        let rect = self.view_rect(cell);
        let mut scan = Scan::new(&self.grid, &mut self.registry, handle, mask);
        scan.enter(rect, out_candidates);
        let stale = scan.stale;

        self.grid.insert(cell, handle, &mut self.lists);
        self.counters.enters += 1;
        self.note_stale(id, stale);
        trace!("Entity {} entered at ({},{})", id, cell.x, cell.y);
        Ok(())
    }

    /// Removes an entity from the map.
    ///
    /// The ids of entities watching it are appended to `out_watchers`, and
    /// it is dropped from the watch lists of everything in its view.
    pub fn exit(
        &mut self,
        id: EntityId,
        out_watchers: Option<&mut Vec<EntityId>>,
    ) -> Result<(), AoiError> {
        let handle = self.registry.handle_of(id).ok_or(AoiError::NotFound(id))?;
        let (cell, mask) = match self.registry.get(handle) {
            Some(entity) => (entity.cell, entity.mask),
            None => return Err(AoiError::NotFound(id)),
        };

        if !self.grid.remove(cell, handle, &mut self.lists) {
            self.record(Anomaly::MissingFromCell { id, cell });
        }

        if let Some(out) = out_watchers {
            self.watcher_ids(handle, out);
        }

        let mut stale = 0;
        // Only an interested entity appears in other watch lists.
        if mask.has_interest() {
            let rect = self.view_rect(cell);
            let mut scan = Scan::new(&self.grid, &mut self.registry, handle, mask);
            scan.clear_own();
            scan.exit(rect, None);
            stale = scan.stale;
        }

        if let Some(entity) = self.registry.remove(handle) {
            self.lists.release(entity.interest_me);
        }
        self.counters.exits += 1;
        self.note_stale(id, stale);
        trace!("Entity {} exited from ({},{})", id, cell.x, cell.y);
        Ok(())
    }

    /// Moves an entity to pixel `(x, y)`.
    ///
    /// Entities that come into view are appended to `out_entered`, those that
    /// drop out to `out_left`. Moving within the current cell does nothing.
    pub fn update(
        &mut self,
        id: EntityId,
        x: i32,
        y: i32,
        mut out_entered: Option<&mut Vec<EntityId>>,
        mut out_left: Option<&mut Vec<EntityId>>,
    ) -> Result<(), AoiError> {
        let cell = self.cell_at(x, y)?;
        let handle = self.registry.handle_of(id).ok_or(AoiError::NotFound(id))?;
        let (old_cell, mask) = match self.registry.get(handle) {
            Some(entity) => (entity.cell, entity.mask),
            None => return Err(AoiError::NotFound(id)),
        };

        self.counters.updates += 1;
        if cell == old_cell {
            self.counters.same_cell_moves += 1;
            return Ok(());
        }

        let old_rect = self.view_rect(old_cell);
        let new_rect = self.view_rect(cell);
        let delta = match old_rect.intersect(&new_rect) {
            Some(overlap) => match self.decompose(&old_rect, &new_rect, &overlap) {
                Ok(strips) => Some(strips),
                Err(strip) => {
                    self.record(Anomaly::InvertedStrip { id, strip });
                    None
                }
            },
            None => None,
        };

        if !self.grid.remove(old_cell, handle, &mut self.lists) {
            self.record(Anomaly::MissingFromCell { id, cell: old_cell });
        }

        let mut scan = Scan::new(&self.grid, &mut self.registry, handle, mask);
        let scanned = match &delta {
            Some((left, entered)) => {
                for strip in left {
                    scan.exit(*strip, out_left.as_deref_mut());
                }
                for strip in entered {
                    scan.enter(*strip, out_entered.as_deref_mut());
                }
                Some(left.len() + entered.len())
            }
            None => {
                scan.clear_own();
                scan.exit(old_rect, out_left);
                scan.enter(new_rect, out_entered);
                None
            }
        };
        let stale = scan.stale;

        if let Some(entity) = self.registry.get_mut(handle) {
            entity.cell = cell;
        }
        self.grid.insert(cell, handle, &mut self.lists);

        match scanned {
            Some(strips) => self.counters.strips_scanned += strips as u64,
            None => self.counters.full_rescans += 1,
        }
        self.note_stale(id, stale);
        trace!(
            "Entity {} moved ({},{}) -> ({},{})",
            id,
            old_cell.x,
            old_cell.y,
            cell.x,
            cell.y
        );
        Ok(())
    }

    /// Read-only view of an entity.
    pub fn get(&self, id: EntityId) -> Option<EntityView> {
        self.registry.by_id(id).map(EntityView::from)
    }

    /// Ids of the entities watching `id`.
    pub fn interest_me(&self, id: EntityId) -> Option<impl Iterator<Item = EntityId> + '_> {
        let registry = &self.registry;
        let entity = registry.by_id(id)?;
        Some(
            entity
                .interest_me
                .iter()
                .filter_map(move |h| registry.get(*h).map(|e| e.id)),
        )
    }

    /// Lazily yields the ids of entities in the pixel rectangle whose corners
    /// are `(x, y)` and `(dx, dy)`. Cells are visited in row-major order.
    pub fn each_in_rect(
        &self,
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
    ) -> Result<RectEntities<'_>, AoiError> {
        let rect = self.pixel_rect(x, y, dx, dy)?;
        Ok(RectEntities::new(&self.grid, &self.registry, rect))
    }

    /// Calls `visit` with a view of each entity in the pixel rectangle, for
    /// callers that filter on mask bits.
    pub fn each_in_rect_with<F>(
        &self,
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
        mut visit: F,
    ) -> Result<(), AoiError>
    where
        F: FnMut(EntityView),
    {
        let rect = self.pixel_rect(x, y, dx, dy)?;
        let mut iter = RectEntities::new(&self.grid, &self.registry, rect);
        while let Some(entity) = iter.next_entity() {
            visit(EntityView::from(entity));
        }
        Ok(())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.registry.contains_id(id)
    }

    /// Number of entities on the map.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Grid width in cells.
    pub fn width(&self) -> i32 {
        self.grid.width()
    }

    /// Grid height in cells.
    pub fn height(&self) -> i32 {
        self.grid.height()
    }

    /// Pixel size of one cell, zero before configuration.
    pub fn cell_size(&self) -> i32 {
        self.cell_size
    }

    /// View half-extents in cells.
    pub fn visual_range(&self) -> ViewRange {
        self.view
    }

    /// Returns `true` if two pixel positions fall in the same cell.
    pub fn same_cell(&self, x: i32, y: i32, dx: i32, dy: i32) -> bool {
        self.cell_size > 0 && self.to_cell(x, y) == self.to_cell(dx, dy)
    }

    /// Per-cell entity counts in row-major order.
    pub fn occupancy(&self) -> Vec<usize> {
        self.grid.occupancy()
    }

    /// Printable occupancy grid, one row per line.
    pub fn dump_grid(&self) -> GridDump<'_> {
        GridDump { grid: &self.grid }
    }

    pub fn stats(&self) -> AoiStats {
        AoiStats {
            entities: self.registry.len(),
            occupied_cells: self.grid.occupied_cells(),
            enters: self.counters.enters,
            exits: self.counters.exits,
            updates: self.counters.updates,
            same_cell_moves: self.counters.same_cell_moves,
            strips_scanned: self.counters.strips_scanned,
            full_rescans: self.counters.full_rescans,
            anomalies: self.counters.anomalies,
            pooled_lists: self.lists.cached(),
        }
    }

    /// Drains the recorded anomalies, oldest first.
    pub fn take_anomalies(&mut self) -> Vec<Anomaly> {
        self.anomalies.drain(..).collect()
    }

    /// Verifies cell membership and every watch list against a full rescan.
    ///
    /// This costs O(entities × view area) and is meant for tests and
    /// debugging.
    pub fn check_consistency(&self) -> Result<(), AoiError> {
        let mut stored = 0;
        for cell in self.grid.bounds().cells() {
            for &handle in self.grid.get(cell) {
                stored += 1;
                match self.registry.get(handle) {
                    Some(entity) if entity.cell == cell => {}
                    Some(entity) => {
                        return Err(inconsistent(Anomaly::Membership {
                            id: entity.id,
                            cell,
                        }));
                    }
                    None => return Err(inconsistent(Anomaly::StaleHandle { id: -1, count: 1 })),
                }
            }
        }

        for (handle, entity) in self.registry.iter() {
            let copies = self.grid.get(entity.cell).iter().filter(|h| **h == handle).count();
            if copies != 1 {
                return Err(inconsistent(Anomaly::Membership {
                    id: entity.id,
                    cell: entity.cell,
                }));
            }

            let expected: HashSet<Handle> = self
                .grid
                .handles_in(self.view_rect(entity.cell))
                .filter(|other| *other != handle)
                .filter(|other| {
                    self.registry
                        .get(*other)
                        .is_some_and(|o| self.view.watches(o.mask, o.cell, entity.cell))
                })
                .collect();
            let actual: HashSet<Handle> = entity.interest_me.iter().copied().collect();
            if actual.len() != entity.interest_me.len() || actual != expected {
                return Err(inconsistent(Anomaly::WatchList {
                    id: entity.id,
                    expected: expected.len(),
                    actual: entity.interest_me.len(),
                }));
            }
        }

        if stored != self.registry.len() {
            return Err(inconsistent(Anomaly::StaleHandle {
                id: -1,
                count: stored.abs_diff(self.registry.len()),
            }));
        }
        Ok(())
    }

    /// View half-extents in cells for a pixel range. A half-extent past the
    /// grid size sees nothing more, so it is capped there.
    fn derive_view(&self, width: i32, height: i32) -> ViewRange {
        ViewRange::new(
            ceil_div(width, self.cell_size).min(self.grid.width()),
            ceil_div(height, self.cell_size).min(self.grid.height()),
        )
    }

    fn decompose(
        &mut self,
        old_rect: &Rect,
        new_rect: &Rect,
        overlap: &Rect,
    ) -> Result<(Strips, Strips), InvertedStrip> {
        #[cfg(test)]
        if std::mem::take(&mut self.invert_next_delta) {
            return Err(InvertedStrip {
                column: overlap.x,
                top: overlap.dy + 1,
                bottom: overlap.dy,
            });
        }
        delta_strips(old_rect, new_rect, overlap)
    }

    fn to_cell(&self, x: i32, y: i32) -> Cell {
        Cell::new(x.div_euclid(self.cell_size), y.div_euclid(self.cell_size))
    }

    /// Converts a pixel position to an in-bounds cell.
    fn cell_at(&self, x: i32, y: i32) -> Result<Cell, AoiError> {
        if self.cell_size <= 0 {
            return Err(ConfigError::NotConfigured.into());
        }
        let cell = self.to_cell(x, y);
        if !self.grid.in_bounds(cell) {
            return Err(AoiError::InvalidPosition { x, y });
        }
        Ok(cell)
    }

    fn pixel_rect(&self, x: i32, y: i32, dx: i32, dy: i32) -> Result<Rect, AoiError> {
        if self.cell_size <= 0 {
            return Err(ConfigError::NotConfigured.into());
        }
        if x > dx || y > dy {
            return Err(AoiError::InvalidRect { x, y, dx, dy });
        }
        let top_left = self.cell_at(x, y)?;
        let bottom_right = self.cell_at(dx, dy)?;
        Ok(Rect::new(top_left.x, top_left.y, bottom_right.x, bottom_right.y))
    }

    fn view_rect(&self, cell: Cell) -> Rect {
        Rect::around(
            cell,
            self.view.half_width,
            self.view.half_height,
            self.grid.width(),
            self.grid.height(),
        )
    }

    fn watcher_ids(&self, handle: Handle, out: &mut Vec<EntityId>) {
        if let Some(entity) = self.registry.get(handle) {
            out.extend(
                entity
                    .interest_me
                    .iter()
                    .filter_map(|h| self.registry.get(*h).map(|e| e.id)),
            );
        }
    }

    fn note_stale(&mut self, id: EntityId, count: usize) {
        if count > 0 {
            self.record(Anomaly::StaleHandle { id, count });
        }
    }

    fn record(&mut self, anomaly: Anomaly) {
        error!("AOI anomaly: {}", anomaly);
        self.counters.anomalies += 1;
        if self.max_anomalies == 0 {
            return;
        }
        if self.anomalies.len() >= self.max_anomalies {
            self.anomalies.pop_front();
        }
        self.anomalies.push_back(anomaly);
    }

    fn release_all(&mut self) {
        self.grid.clear(&mut self.lists);
        for entity in self.registry.drain() {
            self.lists.release(entity.interest_me);
        }
    }
}

/// Strips to exit and strips to enter for a move whose view rectangles
/// overlap in `overlap`. Both are computed before any watch list changes.
fn delta_strips(
    old_rect: &Rect,
    new_rect: &Rect,
    overlap: &Rect,
) -> Result<(Strips, Strips), InvertedStrip> {
    let left = old_rect.subtract_columns(overlap)?;
    let entered = new_rect.subtract_columns(overlap)?;
    Ok((left, entered))
}

fn inconsistent(anomaly: Anomaly) -> AoiError {
    AoiError::InternalInconsistency(anomaly)
}

/// Enter/exit bookkeeping for one entity against the entities in a region.
struct Scan<'a> {
    grid: &'a SpatialGrid,
    registry: &'a mut EntityRegistry,
    me: Handle,
    interested: bool,
    stale: usize,
}

impl<'a> Scan<'a> {
    fn new(
        grid: &'a SpatialGrid,
        registry: &'a mut EntityRegistry,
        me: Handle,
        mask: Mask,
    ) -> Self {
        Self {
            grid,
            registry,
            me,
            interested: mask.has_interest(),
            stale: 0,
        }
    }

    /// Empties the scanning entity's own watch list, so exit scans skip the
    /// linear search on its side.
    fn clear_own(&mut self) {
        if let Some(entity) = self.registry.get_mut(self.me) {
            entity.interest_me.clear();
        }
    }

    fn enter(&mut self, rect: Rect, mut out: Option<&mut Vec<EntityId>>) {
        let grid = self.grid;
        for other in grid.handles_in(rect) {
            let Some(entity) = self.registry.get_mut(other) else {
                self.stale += 1;
                continue;
            };
            if self.interested {
                entity.interest_me.push(self.me);
            }
            let other_id = entity.id;
            if entity.mask.has_interest() {
                if let Some(me) = self.registry.get_mut(self.me) {
                    me.interest_me.push(other);
                }
            }
            if let Some(out) = out.as_deref_mut() {
                out.push(other_id);
            }
        }
    }

    fn exit(&mut self, rect: Rect, mut out: Option<&mut Vec<EntityId>>) {
        let grid = self.grid;
        for other in grid.handles_in(rect) {
            let Some(entity) = self.registry.get_mut(other) else {
                self.stale += 1;
                continue;
            };
            if self.interested {
                swap_remove_item(&mut entity.interest_me, self.me);
            }
            let other_id = entity.id;
            if entity.mask.has_interest() {
                if let Some(me) = self.registry.get_mut(self.me) {
                    swap_remove_item(&mut me.interest_me, other);
                }
            }
            if let Some(out) = out.as_deref_mut() {
                out.push(other_id);
            }
        }
    }
}

/// Lazy, non-restartable iterator over the entity ids in a cell rectangle.
pub struct RectEntities<'a> {
    grid: &'a SpatialGrid,
    registry: &'a EntityRegistry,
    rect: Rect,
    next_cell: Option<Cell>,
    current: std::slice::Iter<'a, Handle>,
}

impl<'a> RectEntities<'a> {
    fn new(grid: &'a SpatialGrid, registry: &'a EntityRegistry, rect: Rect) -> Self {
        Self {
            grid,
            registry,
            rect,
            next_cell: (!rect.is_empty()).then_some(Cell::new(rect.x, rect.y)),
            current: [].iter(),
        }
    }

    fn next_entity(&mut self) -> Option<&'a Entity> {
        loop {
            if let Some(handle) = self.current.next() {
                match self.registry.get(*handle) {
                    Some(entity) => return Some(entity),
                    None => continue,
                }
            }
            let cell = self.next_cell?;
            self.current = self.grid.get(cell).iter();
            self.next_cell = if cell.x < self.rect.dx {
                Some(Cell::new(cell.x + 1, cell.y))
            } else if cell.y < self.rect.dy {
                Some(Cell::new(self.rect.x, cell.y + 1))
            } else {
                None
            };
        }
    }
}

impl Iterator for RectEntities<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        self.next_entity().map(|e| e.id)
    }
}

/// Occupancy printout returned by [`GridAoi::dump_grid`].
pub struct GridDump<'a> {
    grid: &'a SpatialGrid,
}

impl fmt::Display for GridDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.grid.width().max(1) as usize;
        for row in self.grid.occupancy().chunks(width) {
            let line: Vec<String> = row.iter().map(usize::to_string).collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CELL: i32 = 100;

    fn map(cells_w: i32, cells_h: i32, range: i32) -> GridAoi {
        let mut aoi = GridAoi::new();
        aoi.configure(cells_w * CELL, cells_h * CELL, CELL).unwrap();
        aoi.set_visual_range(range * CELL, range * CELL).unwrap();
        aoi
    }

    /// Pixel centre of a cell.
    fn px(cell: i32) -> i32 {
        cell * CELL + CELL / 2
    }

    fn sorted(mut ids: Vec<EntityId>) -> Vec<EntityId> {
        ids.sort_unstable();
        ids
    }

    fn watchers(aoi: &GridAoi, id: EntityId) -> Vec<EntityId> {
        sorted(aoi.interest_me(id).unwrap().collect())
    }

    #[test]
    fn test_configure_rounds_up() {
        let mut aoi = GridAoi::new();
        aoi.configure(1001, 950, 100).unwrap();
        assert_eq!((aoi.width(), aoi.height()), (11, 10));
        aoi.set_visual_range(150, 0).unwrap();
        assert_eq!(aoi.visual_range(), ViewRange::new(2, 0));
    }

    #[test]
    fn test_configuration_order_enforced() {
        let mut aoi = GridAoi::new();
        assert_eq!(
            aoi.set_visual_range(100, 100),
            Err(AoiError::Configuration(ConfigError::VisualRangeBeforeSize))
        );
        assert_eq!(
            aoi.enter(1, 0, 0, Mask::interested(), None),
            Err(AoiError::Configuration(ConfigError::NotConfigured))
        );
        assert_eq!(
            aoi.configure(1000, 1000, 0),
            Err(AoiError::Configuration(ConfigError::InvalidCellSize))
        );
        assert_eq!(aoi.cell_size(), 0);
    }

    #[test]
    fn test_reconfigure_releases_entities_and_keeps_range() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, px(1), px(1), 1u8, None).unwrap();
        aoi.configure(2000, 2000, 200).unwrap();
        assert!(aoi.is_empty());
        assert_eq!(aoi.occupancy().iter().sum::<usize>(), 0);
        assert_eq!(aoi.visual_range(), ViewRange::new(1, 1));
    }

    #[test]
    fn test_enter_reports_candidates_and_links_watch_lists() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, px(4), px(4), Mask::interested(), None).unwrap();
        aoi.enter(2, px(5), px(5), Mask::new(0b100), None).unwrap();

        let mut candidates = Vec::new();
        aoi.enter(3, px(5), px(4), Mask::interested(), Some(&mut candidates))
            .unwrap();
        assert_eq!(sorted(candidates), vec![1, 2]);

        // 1 and 3 are interested; 2 is not.
        assert_eq!(watchers(&aoi, 1), vec![3]);
        assert_eq!(watchers(&aoi, 2), vec![1, 3]);
        assert_eq!(watchers(&aoi, 3), vec![1]);
        aoi.check_consistency().unwrap();
    }

    #[test]
    fn test_entity_never_watches_itself() {
        let mut aoi = map(4, 4, 2);
        aoi.enter(1, px(1), px(1), 1u8, None).unwrap();
        assert_eq!(aoi.get(1).unwrap().interest_count, 0);
        aoi.update(1, px(2), px(2), None, None).unwrap();
        assert_eq!(aoi.get(1).unwrap().interest_count, 0);
    }

    #[test]
    fn test_duplicate_enter_rejected_without_side_effects() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, px(2), px(2), 1u8, None).unwrap();
        aoi.enter(2, px(3), px(2), 1u8, None).unwrap();
        let before = (aoi.get(1), aoi.get(2), aoi.occupancy());

        let mut candidates = Vec::new();
        assert_eq!(
            aoi.enter(1, px(7), px(7), 1u8, Some(&mut candidates)),
            Err(AoiError::DuplicateId(1))
        );
        assert!(candidates.is_empty());
        assert_eq!((aoi.get(1), aoi.get(2), aoi.occupancy()), before);
        aoi.check_consistency().unwrap();
    }

    #[test]
    fn test_invalid_positions_rejected() {
        let mut aoi = map(10, 10, 1);
        assert_eq!(
            aoi.enter(1, 1000, 0, 1u8, None),
            Err(AoiError::InvalidPosition { x: 1000, y: 0 })
        );
        assert_eq!(
            aoi.enter(1, -1, 0, 1u8, None),
            Err(AoiError::InvalidPosition { x: -1, y: 0 })
        );
        aoi.enter(1, 999, 999, 1u8, None).unwrap();
        assert_eq!(
            aoi.update(1, 0, 1000, None, None),
            Err(AoiError::InvalidPosition { x: 0, y: 1000 })
        );
        assert_eq!(aoi.get(1).map(|e| (e.x, e.y)), Some((9, 9)));
    }

    #[test]
    fn test_exit_unknown_and_twice() {
        let mut aoi = map(10, 10, 1);
        assert_eq!(aoi.exit(999, None), Err(AoiError::NotFound(999)));
        aoi.enter(1, px(0), px(0), 1u8, None).unwrap();
        aoi.exit(1, None).unwrap();
        assert_eq!(aoi.exit(1, None), Err(AoiError::NotFound(1)));
        assert_eq!(
            aoi.update(1, px(1), px(1), None, None),
            Err(AoiError::NotFound(1))
        );
    }

    #[test]
    fn test_exit_reports_watchers_and_unlinks() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, px(5), px(5), 1u8, None).unwrap();
        aoi.enter(2, px(4), px(5), 1u8, None).unwrap();
        aoi.enter(3, px(6), px(6), 0u8, None).unwrap();

        let mut out = Vec::new();
        aoi.exit(1, Some(&mut out)).unwrap();
        assert_eq!(sorted(out), vec![2]);
        assert!(watchers(&aoi, 2).is_empty());
        assert!(watchers(&aoi, 3).is_empty());
        assert_eq!(aoi.get(1), None);
        aoi.check_consistency().unwrap();
    }

    #[test]
    fn test_same_cell_move_is_noop() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, 510, 510, 1u8, None).unwrap();
        aoi.enter(2, 610, 510, 1u8, None).unwrap();
        let mut entered = Vec::new();
        let mut left = Vec::new();
        aoi.update(1, 590, 501, Some(&mut entered), Some(&mut left))
            .unwrap();
        assert!(entered.is_empty() && left.is_empty());
        assert_eq!(aoi.stats().same_cell_moves, 1);
        assert!(aoi.same_cell(510, 510, 590, 501));
        assert!(!aoi.same_cell(510, 510, 610, 510));
    }

    #[test]
    fn test_visual_range_larger_than_map_is_capped() {
        let mut aoi = GridAoi::new();
        aoi.configure(1000, 1000, 1).unwrap();
        aoi.set_visual_range(i32::MAX, i32::MAX).unwrap();
        assert_eq!(aoi.visual_range(), ViewRange::new(1000, 1000));

        let mut candidates = Vec::new();
        aoi.enter(1, 5, 5, Mask::interested(), None).unwrap();
        aoi.enter(2, 900, 900, Mask::interested(), Some(&mut candidates))
            .unwrap();
        assert_eq!(candidates, vec![1]);
        assert_eq!(watchers(&aoi, 1), vec![2]);
        assert_eq!(watchers(&aoi, 2), vec![1]);

        let mut entered = Vec::new();
        let mut left = Vec::new();
        aoi.update(2, 999, 0, Some(&mut entered), Some(&mut left))
            .unwrap();
        assert!(entered.is_empty() && left.is_empty());
        aoi.check_consistency().unwrap();

        aoi.configure(1000, 1000, 10).unwrap();
        assert_eq!(aoi.visual_range(), ViewRange::new(100, 100));
    }

    #[test]
    fn test_inverted_strip_falls_back_to_full_rescan() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, px(3), px(5), 1u8, None).unwrap();
        aoi.enter(2, px(2), px(5), 1u8, None).unwrap();
        aoi.enter(3, px(4), px(5), 1u8, None).unwrap();
        aoi.enter(4, px(5), px(5), 1u8, None).unwrap();

        aoi.invert_next_delta = true;
        let mut entered = Vec::new();
        let mut left = Vec::new();
        aoi.update(1, px(4), px(5), Some(&mut entered), Some(&mut left))
            .unwrap();

        // The whole old view is exited and the whole new view entered.
        assert_eq!(sorted(left), vec![2, 3]);
        assert_eq!(sorted(entered), vec![3, 4]);
        assert_eq!(watchers(&aoi, 1), vec![3, 4]);
        assert!(watchers(&aoi, 2).is_empty());

        let stats = aoi.stats();
        assert_eq!(stats.full_rescans, 1);
        assert_eq!(stats.strips_scanned, 0);
        assert_eq!(stats.anomalies, 1);
        let anomalies = aoi.take_anomalies();
        assert!(matches!(
            anomalies.as_slice(),
            [Anomaly::InvertedStrip { id: 1, .. }]
        ));
        aoi.check_consistency().unwrap();

        aoi.update(1, px(5), px(5), None, None).unwrap();
        assert_eq!(aoi.stats().full_rescans, 1);
        assert!(aoi.take_anomalies().is_empty());
    }

    #[test]
    fn test_far_move_takes_full_rescan() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, px(1), px(1), 1u8, None).unwrap();
        aoi.enter(2, px(0), px(0), 1u8, None).unwrap();
        aoi.enter(3, px(8), px(8), 1u8, None).unwrap();

        let mut entered = Vec::new();
        let mut left = Vec::new();
        aoi.update(1, px(8), px(7), Some(&mut entered), Some(&mut left))
            .unwrap();
        assert_eq!(entered, vec![3]);
        assert_eq!(left, vec![2]);
        assert_eq!(watchers(&aoi, 1), vec![3]);
        assert!(watchers(&aoi, 2).is_empty());
        assert_eq!(aoi.stats().full_rescans, 1);
        aoi.check_consistency().unwrap();
    }

    #[test]
    fn test_uninterested_mover_still_reports_delta() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, px(2), px(2), 0b1000_0000u8, None).unwrap();
        aoi.enter(2, px(1), px(2), 1u8, None).unwrap();
        aoi.enter(3, px(4), px(2), 0u8, None).unwrap();

        let mut entered = Vec::new();
        let mut left = Vec::new();
        aoi.update(1, px(3), px(2), Some(&mut entered), Some(&mut left))
            .unwrap();
        assert_eq!(entered, vec![3]);
        assert_eq!(left, vec![2]);
        assert!(watchers(&aoi, 3).is_empty());
        assert_eq!(aoi.get(1).unwrap().mask.bits(), 0b1000_0000);
        aoi.check_consistency().unwrap();
    }

    #[test]
    fn test_each_in_rect() {
        let mut aoi = map(10, 10, 1);
        aoi.enter(1, px(1), px(1), 1u8, None).unwrap();
        aoi.enter(2, px(2), px(1), 0b10u8, None).unwrap();
        aoi.enter(3, px(1), px(2), 1u8, None).unwrap();
        aoi.enter(4, px(5), px(5), 1u8, None).unwrap();

        let ids: Vec<_> = aoi.each_in_rect(100, 100, 299, 299).unwrap().collect();
        // Row-major: (1,1), (2,1), then (1,2).
        assert_eq!(ids, vec![1, 2, 3]);

        let mut tagged = Vec::new();
        aoi.each_in_rect_with(0, 0, 999, 999, |view| {
            if view.mask.app_bits() & 0b10 != 0 {
                tagged.push(view.id);
            }
        })
        .unwrap();
        assert_eq!(tagged, vec![2]);

        assert!(matches!(
            aoi.each_in_rect(300, 0, 200, 100),
            Err(AoiError::InvalidRect { .. })
        ));
        assert!(matches!(
            aoi.each_in_rect(0, 0, 1000, 100),
            Err(AoiError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn test_dump_grid() {
        let mut aoi = map(3, 2, 1);
        aoi.enter(1, px(0), px(0), 1u8, None).unwrap();
        aoi.enter(2, px(0), px(0), 1u8, None).unwrap();
        aoi.enter(3, px(2), px(1), 1u8, None).unwrap();
        assert_eq!(aoi.dump_grid().to_string(), "2 0 0\n0 0 1\n");
    }

    #[test]
    fn test_check_consistency_detects_tampering() {
        let mut aoi = map(5, 5, 1);
        aoi.enter(1, px(1), px(1), 1u8, None).unwrap();
        aoi.enter(2, px(2), px(1), 1u8, None).unwrap();
        aoi.check_consistency().unwrap();

        let h1 = aoi.registry.handle_of(1).unwrap();
        aoi.registry.get_mut(h1).unwrap().interest_me.clear();
        assert!(matches!(
            aoi.check_consistency(),
            Err(AoiError::InternalInconsistency(Anomaly::WatchList { id: 1, .. }))
        ));
    }

    #[test]
    fn test_missing_from_cell_is_recorded_not_fatal() {
        let mut aoi = map(5, 5, 1);
        aoi.enter(1, px(1), px(1), 1u8, None).unwrap();
        aoi.enter(2, px(3), px(3), 1u8, None).unwrap();
        let h1 = aoi.registry.handle_of(1).unwrap();
        aoi.grid.remove(Cell::new(1, 1), h1, &mut aoi.lists);

        assert_eq!(aoi.exit(1, None), Ok(()));
        assert_eq!(
            aoi.take_anomalies(),
            vec![Anomaly::MissingFromCell {
                id: 1,
                cell: Cell::new(1, 1)
            }]
        );
        assert_eq!(aoi.stats().anomalies, 1);
        assert!(aoi.take_anomalies().is_empty());
        // Unrelated entities keep working.
        aoi.update(2, px(4), px(4), None, None).unwrap();
        aoi.check_consistency().unwrap();
    }

    #[test]
    fn test_containers_recycled_through_pool() {
        let mut aoi = map(10, 10, 1);
        for id in 0..4 {
            aoi.enter(id, px(id), px(0), 1u8, None).unwrap();
        }
        for id in 0..4 {
            aoi.exit(id, None).unwrap();
        }
        let stats = aoi.stats();
        assert_eq!(stats.occupied_cells, 0);
        assert_eq!(stats.pooled_lists, 8, "4 cell lists and 4 watch lists");
    }
}
