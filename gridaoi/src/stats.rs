//! Operation counters for a single map.

/// Snapshot of engine activity since the map was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AoiStats {
    pub entities: usize,
    pub occupied_cells: usize,
    pub enters: u64,
    pub exits: u64,
    pub updates: u64,
    /// Updates that stayed within the current cell and did no work.
    pub same_cell_moves: u64,
    /// Column strips scanned by intersecting moves.
    pub strips_scanned: u64,
    /// Moves handled by a full old-exit/new-enter rescan.
    pub full_rescans: u64,
    pub anomalies: u64,
    pub pooled_lists: usize,
}

impl AoiStats {
    /// Fraction of updates that crossed a cell boundary.
    pub fn cell_change_ratio(&self) -> f64 {
        if self.updates == 0 {
            return 0.0;
        }
        (self.updates - self.same_cell_moves) as f64 / self.updates as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_change_ratio() {
        let stats = AoiStats::default();
        assert_eq!(stats.cell_change_ratio(), 0.0);

        let stats = AoiStats {
            updates: 4,
            same_cell_moves: 1,
            ..Default::default()
        };
        assert!((stats.cell_change_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
