//! Ink Raster - Growable Raster Surfaces
//!
//! Pixel storage for painting on an unbounded canvas:
//! - `PixelBuffer`: premultiplied RGBA storage positioned on the logical plane
//! - `RasterSurface`: a lock-guarded, self-growing buffer with a populated area
//! - Scoped access handles for painting and raw row access
//! - `RasterDiff` and `DiffHistory` for XOR-based undo/redo

mod buffer;
mod config;
mod diff;
mod handle;
mod history;
mod surface;

pub use buffer::{BYTES_PER_PIXEL, PixelBuffer};
pub use config::RasterConfig;
pub use diff::RasterDiff;
pub use handle::{BitReader, BitWriter, PaintHandle};
pub use history::DiffHistory;
pub use surface::{ObserverId, RasterSurface, SurfaceFlags};

pub use ink_render;

/// Raster error
#[derive(Debug, Clone, thiserror::Error)]
pub enum RasterError {
    #[error("Surface is not initialized")]
    NotInitialized,

    #[error("Surface is already initialized")]
    AlreadyInitialized,

    #[error("Failed to allocate a {width}x{height} pixel buffer")]
    AllocationFailed { width: i32, height: i32 },

    #[error("Invalid raster configuration: {0}")]
    InvalidConfig(String),
}
