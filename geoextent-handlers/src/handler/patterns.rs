use regex::RegexSet;
use std::sync::OnceLock;

/// column-name patterns for coordinate, geometry, CRS and time detection.
/// all matching is case-insensitive against raw header names.
pub struct ColumnPatterns {
    pub longitude: RegexSet,
    pub latitude: RegexSet,
    pub geometry: RegexSet,
    pub time: RegexSet,
    pub crs: RegexSet,
}

pub const LONGITUDE_PATTERNS: [&str; 7] =
    ["longitude", "long", "^lon", "lon$", "lng", "^x", "x$"];
pub const LATITUDE_PATTERNS: [&str; 5] = ["latitude", "^lat", "lat$", "^y", "y$"];
pub const GEOMETRY_PATTERNS: [&str; 6] = ["geometry", "geom", "wkt", "wkb", "coordinates", "coords"];
pub const TIME_PATTERNS: [&str; 6] = ["timestamp", "datetime", "time", "date$", "^date", "^begin"];
pub const CRS_PATTERNS: [&str; 3] = ["^crs$", "^srsid$", "^epsg$"];

pub fn columns() -> &'static ColumnPatterns {
    static PATTERNS: OnceLock<ColumnPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ColumnPatterns {
        longitude: case_insensitive_set(&LONGITUDE_PATTERNS),
        latitude: case_insensitive_set(&LATITUDE_PATTERNS),
        geometry: case_insensitive_set(&GEOMETRY_PATTERNS),
        time: case_insensitive_set(&TIME_PATTERNS),
        crs: case_insensitive_set(&CRS_PATTERNS),
    })
}

fn case_insensitive_set(patterns: &[&str]) -> RegexSet {
    let prefixed: Vec<String> = patterns.iter().map(|p| format!("(?i){}", p)).collect();
    RegexSet::new(prefixed).expect("column patterns are static and valid")
}

impl ColumnPatterns {
    /// index of the first header matching the set, or None.
    pub fn find<'a, I>(set: &RegexSet, headers: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        headers
            .into_iter()
            .position(|h| set.is_match(h.trim()))
    }
}
