//! # gridaoi
//!
//! Grid-based area-of-interest (AOI) management for authoritative multiplayer
//! simulations.
//!
//! Entities live on a bounded 2D map split into fixed-size cells. Each entity
//! sees a fixed rectangle of cells around its own, and keeps an `interest_me`
//! watch list of the entities that must hear about its movement, combat, and
//! state changes. Enter, move, and exit update those lists incrementally and
//! report which entities came into or dropped out of view, so a server never
//! rescans the whole population per tick.
//!
//! The engine is synchronous and single-threaded: run one [`GridAoi`] per map
//! on that map's logic thread.
//!
//! ## Quick Start
//!
//! ```
//! use gridaoi::prelude::*;
//!
//! let config = AoiConfig::default()
//!     .with_map_size(1000, 1000)
//!     .with_cell_size(100)
//!     .with_visual_range(100, 100);
//! let mut aoi = GridAoi::from_config(&config).unwrap();
//!
//! aoi.enter(1, 150, 150, Mask::interested(), None).unwrap();
//! aoi.enter(2, 250, 150, Mask::interested(), None).unwrap();
//!
//! let mut entered = Vec::new();
//! let mut left = Vec::new();
//! aoi.update(2, 450, 150, Some(&mut entered), Some(&mut left)).unwrap();
//! assert_eq!(left, vec![1]);
//! assert!(entered.is_empty());
//! ```

pub mod aoi;
pub mod config;
pub mod entity;
pub mod geometry;
pub mod grid;
pub mod interest;
pub mod pool;
pub mod stats;


pub use aoi::{Anomaly, GridAoi, GridDump, RectEntities};
pub use config::{AoiConfig, ConfigError};
pub use entity::{EntityId, EntityView, Handle};
pub use geometry::{Cell, Rect};
pub use interest::{Mask, ViewRange};
pub use pool::{Pool, Recycle};
pub use stats::AoiStats;

/// Unified error type for every map operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoiError {
    /// Bad configuration values or calls made out of order.
    Configuration(ConfigError),
    /// A pixel position maps outside the grid.
    InvalidPosition { x: i32, y: i32 },
    /// Range query corners are not top-left and bottom-right.
    InvalidRect { x: i32, y: i32, dx: i32, dy: i32 },
    /// Enter with an id that is already on the map.
    DuplicateId(EntityId),
    /// Operation on an id that is not on the map.
    NotFound(EntityId),
    /// Reported by [`GridAoi::check_consistency`].
    InternalInconsistency(Anomaly),
}

impl std::fmt::Display for AoiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AoiError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AoiError::InvalidPosition { x, y } => {
                write!(f, "Position ({}, {}) is outside the map", x, y)
            }
            AoiError::InvalidRect { x, y, dx, dy } => {
                write!(f, "Malformed rectangle ({}, {}) ({}, {})", x, y, dx, dy)
            }
            AoiError::DuplicateId(id) => write!(f, "Entity {} is already on the map", id),
            AoiError::NotFound(id) => write!(f, "Entity {} is not on the map", id),
            AoiError::InternalInconsistency(a) => write!(f, "Internal inconsistency: {}", a),
        }
    }
}

impl std::error::Error for AoiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AoiError::Configuration(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for AoiError {
    fn from(err: ConfigError) -> Self {
        AoiError::Configuration(err)
    }
}

/// Prelude: import everything commonly needed.
pub mod prelude {
    pub use crate::{AoiConfig, AoiError, EntityId, EntityView, GridAoi, Mask};
}
