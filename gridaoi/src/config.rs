//! Map configuration constants and structures.
//!
//! [`AoiConfig`] bundles the map size, cell size, and visual range that a
//! [`GridAoi`](crate::GridAoi) needs before it can accept entities, plus the
//! pooling limits used for its internal containers.

pub const DEFAULT_MAP_WIDTH: i32 = 1024;
pub const DEFAULT_MAP_HEIGHT: i32 = 1024;
pub const DEFAULT_CELL_SIZE: i32 = 32;
pub const DEFAULT_VISUAL_WIDTH: i32 = 320;
pub const DEFAULT_VISUAL_HEIGHT: i32 = 256;
pub const DEFAULT_POOL_MAX_CACHED: usize = 4096;
pub const DEFAULT_MAX_ANOMALIES: usize = 64;

/// Containers whose capacity grew past this are dropped rather than cached.
pub const DEFAULT_MAX_POOLED_CAPACITY: usize = 128;

/// Inline strip capacity for a move's delta region. A visual range of up to
/// 7 cells each side fits without spilling to the heap.
pub const STRIPS_INLINE: usize = 16;

/// Configuration validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    InvalidCellSize,
    InvalidMapSize,
    InvalidVisualRange,
    VisualRangeBeforeSize,
    NotConfigured,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidCellSize => write!(f, "cell_size must be > 0"),
            ConfigError::InvalidMapSize => {
                write!(f, "map_width and map_height must be > 0")
            }
            ConfigError::InvalidVisualRange => {
                write!(f, "visual_width and visual_height must be >= 0")
            }
            ConfigError::VisualRangeBeforeSize => {
                write!(f, "visual range set before map size was configured")
            }
            ConfigError::NotConfigured => write!(f, "map size has not been configured"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Full map configuration. All lengths are in pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AoiConfig {
    pub map_width: i32,
    pub map_height: i32,
    pub cell_size: i32,

    pub visual_width: i32,
    pub visual_height: i32,

    pub pool_max_cached: usize,
    pub max_pooled_capacity: usize,
    pub max_anomalies: usize,
}

impl AoiConfig {
    /// Validates the configuration, returning an error if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_size <= 0 {
            return Err(ConfigError::InvalidCellSize);
        }
        if self.map_width <= 0 || self.map_height <= 0 {
            return Err(ConfigError::InvalidMapSize);
        }
        if self.visual_width < 0 || self.visual_height < 0 {
            return Err(ConfigError::InvalidVisualRange);
        }
        Ok(())
    }
}

impl AoiConfig {
    pub fn with_map_size(mut self, width: i32, height: i32) -> Self {
        self.map_width = width;
        self.map_height = height;
        self
    }
    pub fn with_cell_size(mut self, cell_size: i32) -> Self {
        self.cell_size = cell_size;
        self
    }
    pub fn with_visual_range(mut self, width: i32, height: i32) -> Self {
        self.visual_width = width;
        self.visual_height = height;
        self
    }
    pub fn with_pool_max_cached(mut self, max: usize) -> Self {
        self.pool_max_cached = max;
        self
    }
    pub fn with_max_pooled_capacity(mut self, max: usize) -> Self {
        self.max_pooled_capacity = max;
        self
    }
    pub fn with_max_anomalies(mut self, max: usize) -> Self {
        self.max_anomalies = max;
        self
    }
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            map_width: DEFAULT_MAP_WIDTH,
            map_height: DEFAULT_MAP_HEIGHT,
            cell_size: DEFAULT_CELL_SIZE,

            visual_width: DEFAULT_VISUAL_WIDTH,
            visual_height: DEFAULT_VISUAL_HEIGHT,

            pool_max_cached: DEFAULT_POOL_MAX_CACHED,
            max_pooled_capacity: DEFAULT_MAX_POOLED_CAPACITY,
            max_anomalies: DEFAULT_MAX_ANOMALIES,
        }
    }
}

/// Ceiling division for non-negative pixel lengths.
pub(crate) fn ceil_div(value: i32, divisor: i32) -> i32 {
    ((value as i64 + divisor as i64 - 1) / divisor as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AoiConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_cell_size() {
        let config = AoiConfig::default().with_cell_size(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidCellSize));
        let config = AoiConfig::default().with_cell_size(-4);
        assert_eq!(config.validate(), Err(ConfigError::InvalidCellSize));
    }

    #[test]
    fn test_rejects_bad_map_and_range() {
        let config = AoiConfig::default().with_map_size(0, 100);
        assert_eq!(config.validate(), Err(ConfigError::InvalidMapSize));
        let config = AoiConfig::default().with_visual_range(-1, 0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidVisualRange));
        // Zero range only sees the entity's own cell, which is allowed.
        let config = AoiConfig::default().with_visual_range(0, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(1000, 100), 10);
        assert_eq!(ceil_div(1001, 100), 11);
        assert_eq!(ceil_div(1, 100), 1);
        assert_eq!(ceil_div(0, 100), 0);
    }
}
