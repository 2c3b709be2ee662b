pub mod csv;
pub mod patterns;
pub mod raster;
pub mod vector;

use geoextent_core::error::Result;
use geoextent_core::model::{ExtractOptions, SpatialExtent, Tbox};
use std::path::Path;

/// capability set shared by the three format handlers. handlers report raw
/// extents in their source CRS; transformation to WGS84, range validation
/// and the flip heuristic happen in `ops::extract`.
pub trait FormatHandler: Sync {
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// probes whether this handler can read the file. probing must be cheap
    /// and must never error; unreadable files are simply not supported.
    fn supports(&self, path: &Path) -> bool;

    fn bounding_box(&self, path: &Path, opts: &ExtractOptions) -> Result<Option<SpatialExtent>>;

    fn temporal_extent(&self, path: &Path, opts: &ExtractOptions) -> Result<Option<Tbox>>;

    /// convex hull of all geometries. the default delegates to the bounding
    /// box (with the hull flag unset), which callers report as a fallback.
    fn convex_hull(&self, path: &Path, opts: &ExtractOptions) -> Result<Option<SpatialExtent>> {
        self.bounding_box(path, opts)
    }

    /// typical file extensions, for the `--formats` listing only; detection
    /// is always content-based.
    fn extensions(&self) -> &'static [&'static str];
}

/// detection order is part of the contract: CSV first (it is the most
/// restrictive probe), then vector, then raster. first match wins.
pub fn registry() -> [&'static dyn FormatHandler; 3] {
    [
        &csv::CsvHandler,
        &vector::VectorHandler,
        &raster::RasterHandler,
    ]
}

/// finds the first handler whose probe accepts the file.
pub fn handler_for(path: &Path) -> Option<&'static dyn FormatHandler> {
    registry().into_iter().find(|h| h.supports(path))
}
