pub mod bbox;
pub mod extent;
pub mod options;
pub mod tbox;

pub use bbox::Bbox;
pub use extent::{Extent, ExtractionMethod, ExtractionStats, Followed, SpatialExtent};
pub use options::{ExtractOptions, WalkOptions};
pub use tbox::Tbox;

/// EPSG code of the target coordinate reference system for all outputs.
pub const WGS84_EPSG: u32 = 4326;
