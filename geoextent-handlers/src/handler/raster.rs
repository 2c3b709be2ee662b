use super::FormatHandler;
use gdal::{Dataset, Metadata};
use geoextent_core::error::Result;
use geoextent_core::model::extent::Crs;
use geoextent_core::model::{Bbox, ExtractOptions, SpatialExtent, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub struct RasterHandler;

impl FormatHandler for RasterHandler {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn display_name(&self) -> &'static str {
        "Raster data"
    }

    fn supports(&self, path: &Path) -> bool {
        match Dataset::open(path) {
            Ok(dataset) => dataset.raster_count() > 0,
            Err(_) => {
                log::debug!("{}: not supported by the raster handler", path.display());
                false
            }
        }
    }

    /// corner coordinates from the geotransform; the CRS comes from the
    /// dataset projection. ungeoreferenced rasters are accepted as WGS84
    /// only when their raw coordinates already lie in range (a world file
    /// without a .prj) or when `assume_wgs84` forces the interpretation.
    fn bounding_box(&self, path: &Path, opts: &ExtractOptions) -> Result<Option<SpatialExtent>> {
        let dataset = open_raster(path)?;
        let gt = dataset
            .geo_transform()
            .map_err(|e| geoextent_core::error::ExtentError::extraction(path.display(), e))?;
        let (width, height) = dataset.raster_size();
        let bbox = corner_envelope(&gt, width as f64, height as f64);

        let crs = dataset
            .spatial_ref()
            .ok()
            .filter(|_| !dataset.projection().trim().is_empty())
            .map(|mut sr| {
                if sr.auto_identify_epsg().is_ok() {
                    if let Ok(code) = sr.auth_code() {
                        return Crs::Epsg(code as u32);
                    }
                }
                Crs::Wkt(dataset.projection())
            });

        match crs {
            Some(crs) => Ok(Some(SpatialExtent::new(bbox, crs))),
            None => {
                if opts.assume_wgs84 {
                    log::debug!(
                        "{}: no projection reference, assume_wgs84 set, treating coordinates as WGS84",
                        path.display()
                    );
                    Ok(Some(SpatialExtent::new(bbox, Crs::Epsg(WGS84_EPSG))))
                } else if bbox.is_valid_wgs84() {
                    log::debug!(
                        "{}: no projection reference but coordinates {} are within WGS84 bounds, assuming WGS84",
                        path.display(),
                        bbox
                    );
                    Ok(Some(SpatialExtent::new(bbox, Crs::Epsg(WGS84_EPSG))))
                } else {
                    log::warn!(
                        "{}: no projection reference and coordinates {} are outside WGS84 bounds, \
                         likely pixel coordinates; skipping (use assume_wgs84 to force)",
                        path.display(),
                        bbox
                    );
                    Ok(None)
                }
            }
        }
    }

    /// priority chain, stopping at the first hit: GeoTIFF capture tag,
    /// band-level acquisition time, NetCDF CF time axis, ACDD coverage
    /// attributes.
    fn temporal_extent(&self, path: &Path, _opts: &ExtractOptions) -> Result<Option<Tbox>> {
        let dataset = open_raster(path)?;

        if let Some(raw) = dataset.metadata_item("TIFFTAG_DATETIME", "") {
            if let Some(date) = dates::parse_date(&normalize_tiff_datetime(&raw)) {
                return Ok(Some(Tbox::instant(date)));
            }
        }

        if let Ok(band) = dataset.rasterband(1) {
            if let Some(raw) = band.metadata_item("ACQUISITIONDATETIME", "IMAGERY") {
                if let Some(date) = dates::parse_date(&normalize_tiff_datetime(&raw)) {
                    return Ok(Some(Tbox::instant(date)));
                }
            }
        }

        if let Some(tbox) = netcdf_cf_time_axis(&dataset, path) {
            return Ok(Some(tbox));
        }

        let acdd_start = dataset
            .metadata_item("NC_GLOBAL#time_coverage_start", "")
            .and_then(|v| dates::parse_date(&v));
        let acdd_end = dataset
            .metadata_item("NC_GLOBAL#time_coverage_end", "")
            .and_then(|v| dates::parse_date(&v));
        match (acdd_start, acdd_end) {
            (Some(start), Some(end)) => return Ok(Some(Tbox::new(start, end))),
            (Some(single), None) | (None, Some(single)) => {
                return Ok(Some(Tbox::instant(single)))
            }
            (None, None) => {}
        }

        log::debug!("{}: no time value found in raster metadata", path.display());
        Ok(None)
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[
            ".tif", ".tiff", ".geotiff", ".nc", ".netcdf", ".asc", ".wld", ".jgw", ".pgw",
            ".pngw", ".tfw", ".tifw", ".bpw", ".gfw",
        ]
    }
}

fn open_raster(path: &Path) -> Result<Dataset> {
    Dataset::open(path)
        .map_err(|e| geoextent_core::error::ExtentError::extraction(path.display(), e))
}

/// envelope of the four raster corners under the full affine geotransform,
/// so rotated rasters are covered too.
fn corner_envelope(gt: &[f64; 6], width: f64, height: f64) -> Bbox {
    let corner = |px: f64, py: f64| {
        (
            gt[0] + px * gt[1] + py * gt[2],
            gt[3] + px * gt[4] + py * gt[5],
        )
    };
    let corners = [
        corner(0.0, 0.0),
        corner(width, 0.0),
        corner(0.0, height),
        corner(width, height),
    ];
    Bbox::from_points(corners).expect("four corners are never empty")
}

/// TIFF stores capture time as "YYYY:MM:DD HH:MM:SS"; rewrite the date part
/// so the shared parser can handle it.
fn normalize_tiff_datetime(raw: &str) -> String {
    static TIFF_DATE: OnceLock<Regex> = OnceLock::new();
    let re = TIFF_DATE.get_or_init(|| {
        Regex::new(r"^(\d{4}):(\d{2}):(\d{2})(.*)$").expect("static pattern")
    });
    match re.captures(raw.trim()) {
        Some(caps) => format!("{}-{}-{}{}", &caps[1], &caps[2], &caps[3], &caps[4]),
        None => String::from(raw.trim()),
    }
}

/// CF conventions: a time variable advertises `units = "<unit> since
/// <epoch>"`; GDAL surfaces the variable's values in a
/// `NETCDF_DIM_<name>_VALUES` metadata item.
fn netcdf_cf_time_axis(dataset: &Dataset, path: &Path) -> Option<Tbox> {
    static CF_UNITS: OnceLock<Regex> = OnceLock::new();
    let units_re = CF_UNITS.get_or_init(|| {
        Regex::new(r"^(days|hours|minutes|seconds)\s+since\s+(.+)$").expect("static pattern")
    });

    for entry in dataset.metadata() {
        if !entry.domain.is_empty() || !entry.key.ends_with("#units") {
            continue;
        }
        let caps = match units_re.captures(entry.value.trim()) {
            Some(caps) => caps,
            None => continue,
        };
        let unit_seconds: f64 = match &caps[1] {
            "days" => 86_400.0,
            "hours" => 3_600.0,
            "minutes" => 60.0,
            _ => 1.0,
        };
        let epoch = dates::parse_date(&caps[2])?;

        let variable = entry.key.trim_end_matches("#units");
        let values_key = format!("NETCDF_DIM_{}_VALUES", variable);
        let raw_values = dataset.metadata_item(&values_key, "")?;
        let values: Vec<f64> = raw_values
            .trim_matches(|c| c == '{' || c == '}')
            .split(',')
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            log::debug!("{}: CF time axis {} has no finite values", path.display(), variable);
            return None;
        }

        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let base = epoch.and_hms_opt(0, 0, 0)?;
        let start = base + chrono::Duration::seconds((min * unit_seconds) as i64);
        let end = base + chrono::Duration::seconds((max * unit_seconds) as i64);
        return Some(Tbox::new(start.date(), end.date()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_envelope_handles_north_up_rasters() {
        // 0.1-degree pixels anchored at (96.211, 25.633), 1440x750
        let gt = [96.211, 0.0001, 0.0, 25.633, 0.0, -0.0001];
        let bbox = corner_envelope(&gt, 1440.0, 750.0);
        assert!((bbox.min_lon - 96.211).abs() < 1e-9);
        assert!((bbox.max_lat - 25.633).abs() < 1e-9);
        assert!(bbox.max_lon > bbox.min_lon);
        assert!(bbox.min_lat < bbox.max_lat);
    }

    #[test]
    fn tiff_datetime_normalization() {
        assert_eq!(
            normalize_tiff_datetime("2020:06:01 12:00:00"),
            "2020-06-01 12:00:00"
        );
        assert_eq!(
            dates::parse_date(&normalize_tiff_datetime("2020:06:01 12:00:00")),
            chrono::NaiveDate::from_ymd_opt(2020, 6, 1)
        );
        assert_eq!(normalize_tiff_datetime("2020-06-01"), "2020-06-01");
    }
}
