pub mod file_descriptor;
pub mod options;

pub use file_descriptor::FileDescriptor;
pub use options::{DownloadOptions, SelectionMethod};

/// extensions treated as likely geospatial content when prioritizing
/// downloads. mergeable with caller-provided extensions.
pub const GEO_EXTENSIONS: [&str; 25] = [
    ".geojson", ".csv", ".shp", ".shx", ".dbf", ".prj", ".tif", ".tiff", ".geotiff", ".gpkg",
    ".gpx", ".gml", ".kml", ".kmz", ".fgb", ".json", ".nc", ".netcdf", ".asc", ".zip", ".tar",
    ".gz", ".rar", ".sqlite", ".db",
];
