use super::patterns::{self, ColumnPatterns};
use super::FormatHandler;
use geo::BoundingRect;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::extent::Crs;
use geoextent_core::model::{Bbox, ExtractOptions, SpatialExtent, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use itertools::Itertools;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use wkt::TryFromWkt;

/// rows per processing chunk; bounds memory on wide files. the final bbox
/// is the union of per-chunk boxes.
const CHUNK_SIZE: usize = 50_000;

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

const WKT_KEYWORDS: [&str; 7] = [
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
];

pub struct CsvHandler;

impl FormatHandler for CsvHandler {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn display_name(&self) -> &'static str {
        "Tabular data"
    }

    /// requires the geo probe to report the CSV driver and the file to parse
    /// as delimited text with a detectable delimiter.
    fn supports(&self, path: &Path) -> bool {
        let is_csv_driver = match gdal::Dataset::open(path) {
            Ok(dataset) => dataset.driver().short_name() == "CSV",
            Err(_) => false,
        };
        if !is_csv_driver {
            log::debug!("{}: not supported by the CSV handler", path.display());
            return false;
        }
        match detect_delimiter(path) {
            Some(delimiter) => {
                let mut reader = match build_reader(path, delimiter) {
                    Ok(r) => r,
                    Err(_) => return false,
                };
                reader.headers().is_ok()
            }
            None => {
                log::debug!("{}: no detectable delimiter", path.display());
                false
            }
        }
    }

    fn bounding_box(&self, path: &Path, _opts: &ExtractOptions) -> Result<Option<SpatialExtent>> {
        let delimiter = match detect_delimiter(path) {
            Some(d) => d,
            None => return Ok(None),
        };

        // strategy one: a geometry column with WKT or WKB values
        if let Some(extent) = bbox_from_geometry_column(path, delimiter)? {
            return Ok(Some(extent));
        }

        // strategy two: separate coordinate columns
        bbox_from_coordinate_columns(path, delimiter)
    }

    fn temporal_extent(&self, path: &Path, opts: &ExtractOptions) -> Result<Option<Tbox>> {
        let delimiter = match detect_delimiter(path) {
            Some(d) => d,
            None => return Ok(None),
        };
        let mut reader = build_reader(path, delimiter)?;
        let headers = reader
            .headers()
            .map_err(|e| ExtentError::extraction(path.display(), e))?
            .clone();

        let time_idx = match ColumnPatterns::find(&patterns::columns().time, headers.iter()) {
            Some(idx) => idx,
            None => {
                log::debug!("{}: no time column detected", path.display());
                return Ok(None);
            }
        };

        let mut values = vec![];
        for record in reader.records() {
            let record = record.map_err(|e| ExtentError::extraction(path.display(), e))?;
            if let Some(cell) = record.get(time_idx) {
                if !cell.trim().is_empty() {
                    values.push(String::from(cell));
                }
            }
        }

        let parsed = match dates::parse_dates(&values, opts.num_sample, dates::DEFAULT_SAMPLE_SEED)
        {
            Some(parsed) => parsed,
            None => {
                log::debug!("{}: time column has no recognizable dates", path.display());
                return Ok(None);
            }
        };
        let start = *parsed.iter().min().expect("non-empty by construction");
        let end = *parsed.iter().max().expect("non-empty by construction");
        Ok(Some(Tbox::new(start, end)))
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".csv"]
    }
}

/// sniffs the delimiter from the header line by candidate frequency.
fn detect_delimiter(path: &Path) -> Option<u8> {
    let file = File::open(path).ok()?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).ok()?;
    DELIMITER_CANDIDATES
        .iter()
        .map(|d| (*d, first_line.matches(*d as char).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(delimiter, _)| delimiter)
}

fn build_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<File>> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ExtentError::extraction(path.display(), e))?;
    Ok(reader)
}

fn bbox_from_geometry_column(path: &Path, delimiter: u8) -> Result<Option<SpatialExtent>> {
    let mut reader = build_reader(path, delimiter)?;
    let headers = reader
        .headers()
        .map_err(|e| ExtentError::extraction(path.display(), e))?
        .clone();

    let geometry_idx = match ColumnPatterns::find(&patterns::columns().geometry, headers.iter()) {
        Some(idx) => idx,
        None => return Ok(None),
    };

    let mut merged: Option<Bbox> = None;
    let mut chunk: Option<Bbox> = None;
    let mut rows_in_chunk = 0;

    for record in reader.records() {
        let record = record.map_err(|e| ExtentError::extraction(path.display(), e))?;
        let cell = match record.get(geometry_idx) {
            Some(cell) if !cell.trim().is_empty() => cell.trim(),
            _ => continue,
        };
        match parse_geometry_cell(cell) {
            Some(rect) => {
                chunk = Some(match chunk {
                    None => rect,
                    Some(prev) => prev.union(&rect),
                });
            }
            None => {
                log::debug!("{}: skipping unparseable geometry cell", path.display());
            }
        }
        rows_in_chunk += 1;
        if rows_in_chunk >= CHUNK_SIZE {
            merged = merge_chunk(merged, chunk.take());
            rows_in_chunk = 0;
        }
    }
    merged = merge_chunk(merged, chunk);

    match merged {
        Some(bbox) => {
            log::debug!("{}: bbox from geometry column: {}", path.display(), bbox);
            // WKT/WKB cells without a CRS column are geographic by convention
            Ok(Some(SpatialExtent::new(bbox, Crs::Epsg(WGS84_EPSG))))
        }
        None => Ok(None),
    }
}

/// WKT if the cell starts with a geometry keyword, then hex-decoded WKB,
/// then raw-bytes WKB. returns the geometry envelope as a bbox whose `lat`
/// fields hold y and `lon` fields hold x.
fn parse_geometry_cell(cell: &str) -> Option<Bbox> {
    let upper = cell.to_uppercase();
    let geometry: Option<geo_types::Geometry<f64>> =
        if WKT_KEYWORDS.iter().any(|k| upper.starts_with(k)) {
            geo_types::Geometry::try_from_wkt_str(cell).ok()
        } else if let Some(bytes) = decode_hex(cell) {
            wkb::wkb_to_geom(&mut &bytes[..]).ok()
        } else {
            wkb::wkb_to_geom(&mut cell.as_bytes()).ok()
        };

    let rect = geometry?.bounding_rect()?;
    Some(Bbox::from_corners(
        (rect.min().x, rect.min().y),
        (rect.max().x, rect.max().y),
    ))
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16).ok())
        .collect()
}

fn bbox_from_coordinate_columns(path: &Path, delimiter: u8) -> Result<Option<SpatialExtent>> {
    let mut reader = build_reader(path, delimiter)?;
    let headers = reader
        .headers()
        .map_err(|e| ExtentError::extraction(path.display(), e))?
        .clone();

    let columns = patterns::columns();
    let lon_idx = ColumnPatterns::find(&columns.longitude, headers.iter());
    let lat_idx = ColumnPatterns::find(&columns.latitude, headers.iter());
    let (lon_idx, lat_idx) = match (lon_idx, lat_idx) {
        (Some(lon), Some(lat)) if lon != lat => (lon, lat),
        _ => {
            log::debug!("{}: no coordinate columns detected", path.display());
            return Ok(None);
        }
    };

    let mut merged: Option<Bbox> = None;
    let mut chunk: Option<Bbox> = None;
    let mut rows_in_chunk = 0;

    for record in reader.records() {
        let record = record.map_err(|e| ExtentError::extraction(path.display(), e))?;
        let lon: Option<f64> = record.get(lon_idx).and_then(|v| v.trim().parse().ok());
        let lat: Option<f64> = record.get(lat_idx).and_then(|v| v.trim().parse().ok());
        if let (Some(lon), Some(lat)) = (lon, lat) {
            let point = Bbox::point(lat, lon);
            chunk = Some(match chunk {
                None => point,
                Some(prev) => prev.union(&point),
            });
        }
        rows_in_chunk += 1;
        if rows_in_chunk >= CHUNK_SIZE {
            merged = merge_chunk(merged, chunk.take());
            rows_in_chunk = 0;
        }
    }
    merged = merge_chunk(merged, chunk);

    let bbox = match merged {
        Some(bbox) => bbox,
        None => return Ok(None),
    };
    let crs = detect_crs(path, delimiter)?;
    log::debug!(
        "{}: bbox from coordinate columns {} (crs {})",
        path.display(),
        bbox,
        crs
    );
    Ok(Some(SpatialExtent::new(bbox, crs)))
}

fn merge_chunk(merged: Option<Bbox>, chunk: Option<Bbox>) -> Option<Bbox> {
    match (merged, chunk) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, b) => a.or(b),
    }
}

/// scans for a CRS column (crs / srsID / EPSG). a single unique value is
/// used; none defaults to EPSG:4326; several distinct values make the file
/// ambiguous and fail extraction.
fn detect_crs(path: &Path, delimiter: u8) -> Result<Crs> {
    let mut reader = build_reader(path, delimiter)?;
    let headers = reader
        .headers()
        .map_err(|e| ExtentError::extraction(path.display(), e))?
        .clone();

    let crs_idx = match ColumnPatterns::find(&patterns::columns().crs, headers.iter()) {
        Some(idx) => idx,
        None => {
            log::debug!(
                "{}: no identifiable coordinate reference system, trying EPSG:{}",
                path.display(),
                WGS84_EPSG
            );
            return Ok(Crs::Epsg(WGS84_EPSG));
        }
    };

    let mut values = vec![];
    for record in reader.records() {
        let record = record.map_err(|e| ExtentError::extraction(path.display(), e))?;
        if let Some(cell) = record.get(crs_idx) {
            let cell = cell.trim();
            if !cell.is_empty() {
                values.push(String::from(cell));
            }
        }
    }

    let unique: Vec<&String> = values.iter().unique().collect_vec();
    match unique.len() {
        0 => Ok(Crs::Epsg(WGS84_EPSG)),
        1 => {
            let raw = unique[0].trim_start_matches("EPSG:").trim_start_matches("epsg:");
            let code: u32 = raw.parse().map_err(|_| {
                ExtentError::CrsTransform(format!(
                    "{}: CRS column value '{}' is not an EPSG code",
                    path.display(),
                    unique[0]
                ))
            })?;
            Ok(Crs::Epsg(code))
        }
        _ => Err(ExtentError::CrsTransform(format!(
            "{}: coordinate reference system of the file is ambiguous ({} distinct values)",
            path.display(),
            unique.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_detection_prefers_most_frequent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("semi.csv");
        std::fs::write(&path, "a;b;c\n1;2;3\n").unwrap();
        assert_eq!(detect_delimiter(&path), Some(b';'));

        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "no delimiters here\n").unwrap();
        assert_eq!(detect_delimiter(&path), None);
    }

    #[test]
    fn geometry_cell_parses_wkt_and_hex_wkb() {
        let bbox = parse_geometry_cell("POINT (7.6 51.9)").unwrap();
        assert_eq!(bbox, Bbox::point(51.9, 7.6));

        let bbox = parse_geometry_cell("LINESTRING (0 0, 2 3)").unwrap();
        assert_eq!(bbox, Bbox::new(0.0, 0.0, 3.0, 2.0));

        // little-endian WKB point (1.0, 2.0)
        let hex = "0101000000000000000000F03F0000000000000040";
        let bbox = parse_geometry_cell(hex).unwrap();
        assert_eq!(bbox, Bbox::point(2.0, 1.0));

        assert!(parse_geometry_cell("not a geometry").is_none());
    }

    #[test]
    fn coordinate_columns_yield_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.csv");
        std::fs::write(
            &path,
            "place,Longitude,Latitude,TIME_DATE\n\
             roosendaal,4.46,51.53,2017-08-01\n\
             groningen,6.57,53.22,2018-05-10\n\
             breda,4.78,51.59,2019-09-30\n",
        )
        .unwrap();
        let extent = bbox_from_coordinate_columns(&path, b',').unwrap().unwrap();
        assert_eq!(extent.bbox, Bbox::new(51.53, 4.46, 53.22, 6.57));
        assert_eq!(extent.crs, Crs::Epsg(4326));
    }

    #[test]
    fn crs_column_rules() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("single.csv");
        std::fs::write(&path, "x,y,crs\n1,2,3857\n3,4,3857\n").unwrap();
        assert_eq!(detect_crs(&path, b',').unwrap(), Crs::Epsg(3857));

        let path = dir.path().join("ambiguous.csv");
        std::fs::write(&path, "x,y,crs\n1,2,3857\n3,4,4326\n").unwrap();
        assert!(matches!(
            detect_crs(&path, b','),
            Err(ExtentError::CrsTransform(_))
        ));

        let path = dir.path().join("none.csv");
        std::fs::write(&path, "x,y\n1,2\n").unwrap();
        assert_eq!(detect_crs(&path, b',').unwrap(), Crs::Epsg(4326));
    }

    #[test]
    fn temporal_extent_min_max() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.csv");
        std::fs::write(
            &path,
            "place,Longitude,Latitude,TIME_DATE\n\
             a,4.46,51.53,2017-08-01\n\
             b,6.57,53.22,2018-05-10\n\
             c,4.78,51.59,2019-09-30\n",
        )
        .unwrap();
        let tbox = CsvHandler
            .temporal_extent(&path, &ExtractOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(tbox.to_pair(), ["2017-08-01", "2019-09-30"]);
    }
}
