use super::patterns;
use super::FormatHandler;
use crate::ops::transform;
use gdal::vector::{Geometry, LayerAccess};
use gdal::Dataset;
use geoextent_core::error::Result;
use geoextent_core::model::extent::Crs;
use geoextent_core::model::{Bbox, ExtractOptions, SpatialExtent, Tbox, WGS84_EPSG};
use geoextent_core::ops::{dates, merge};
use std::path::Path;

pub struct VectorHandler;

impl FormatHandler for VectorHandler {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn display_name(&self) -> &'static str {
        "Vector data"
    }

    fn supports(&self, path: &Path) -> bool {
        match Dataset::open(path) {
            Ok(dataset) => {
                dataset.layer_count() > 0 && dataset.driver().short_name() != "CSV"
            }
            Err(_) => {
                log::debug!("{}: not supported by the vector handler", path.display());
                false
            }
        }
    }

    /// per-layer envelopes, each transformed to WGS84, merged by bbox union.
    /// layers without an identifiable CRS contribute nothing.
    fn bounding_box(&self, path: &Path, _opts: &ExtractOptions) -> Result<Option<SpatialExtent>> {
        let dataset = open_vector(path)?;
        let gml = is_gml_with_swapped_envelope(&dataset);
        let mut layer_boxes = vec![];

        for mut layer in dataset.layers() {
            let layer_name = layer.name();
            let envelope = match layer.get_extent() {
                Ok(envelope) => envelope,
                Err(e) => {
                    log::debug!("{}/{}: no extent: {}", path.display(), layer_name, e);
                    continue;
                }
            };
            let bbox = envelope_to_bbox(&envelope, gml);

            let crs = match layer_crs(&layer, &layer_name) {
                Some(crs) => crs,
                None => {
                    log::debug!(
                        "{}/{}: no identifiable geographic extent, CRS may be missing",
                        path.display(),
                        layer_name
                    );
                    continue;
                }
            };
            if is_null_island(&bbox) {
                log::debug!("{}/{}: extent is a null island, skipping", path.display(), layer_name);
                continue;
            }

            let raw = SpatialExtent::new(bbox, crs);
            match transform::to_wgs84(&raw, &format!("{}/{}", path.display(), layer_name)) {
                Ok(Some(transformed)) => layer_boxes.push(transformed.bbox),
                Ok(None) => {}
                Err(e) => {
                    log::debug!("{}/{}: {}", path.display(), layer_name, e);
                }
            }
        }

        Ok(merge::bbox_union(layer_boxes.iter())
            .map(|bbox| SpatialExtent::new(bbox, Crs::Epsg(WGS84_EPSG))))
    }

    /// scans layer field definitions for time-like names, parses every value
    /// of each matching field, and takes the overall min/max.
    fn temporal_extent(&self, path: &Path, _opts: &ExtractOptions) -> Result<Option<Tbox>> {
        let dataset = open_vector(path)?;
        let time_set = &patterns::columns().time;
        let mut all_dates = vec![];

        for mut layer in dataset.layers() {
            let field_names: Vec<String> =
                layer.defn().fields().map(|f| f.name()).collect();
            let matches: Vec<&String> = field_names
                .iter()
                .filter(|name| time_set.is_match(name))
                .collect();
            if matches.is_empty() {
                log::debug!(
                    "{}/{}: no matched fields for temporal extent",
                    path.display(),
                    layer.name()
                );
                continue;
            }

            for field in matches {
                let mut values = vec![];
                for feature in layer.features() {
                    if let Ok(Some(value)) = feature.field_as_string_by_name(field) {
                        if !value.trim().is_empty() {
                            values.push(value);
                        }
                    }
                }
                if let Some(parsed) = dates::parse_dates(&values, None, dates::DEFAULT_SAMPLE_SEED)
                {
                    all_dates.extend(parsed);
                } else {
                    log::debug!(
                        "{}: field {} has no recognizable time format",
                        path.display(),
                        field
                    );
                }
            }
        }

        match (all_dates.iter().min(), all_dates.iter().max()) {
            (Some(start), Some(end)) => Ok(Some(Tbox::new(*start, *end))),
            _ => Ok(None),
        }
    }

    /// collects every feature geometry into one collection per layer and
    /// takes its hull. degenerate layers (single point, collinear points)
    /// fall back to envelope corners while keeping the hull flag set.
    fn convex_hull(&self, path: &Path, _opts: &ExtractOptions) -> Result<Option<SpatialExtent>> {
        let dataset = open_vector(path)?;
        let mut hull_points: Vec<(f64, f64)> = vec![];

        for mut layer in dataset.layers() {
            let layer_name = layer.name();
            let crs = match layer_crs(&layer, &layer_name) {
                Some(crs) => crs,
                None => {
                    log::debug!(
                        "{}/{}: no CRS, cannot compute convex hull",
                        path.display(),
                        layer_name
                    );
                    continue;
                }
            };

            let mut collection = match Geometry::empty(gdal_sys::OGRwkbGeometryType::wkbGeometryCollection) {
                Ok(collection) => collection,
                Err(e) => {
                    log::debug!("{}/{}: {}", path.display(), layer_name, e);
                    continue;
                }
            };
            let mut geometry_count = 0;
            for feature in layer.features() {
                if let Some(geometry) = feature.geometry() {
                    if collection.add_geometry(geometry.clone()).is_ok() {
                        geometry_count += 1;
                    }
                }
            }
            if geometry_count == 0 {
                log::debug!(
                    "{}/{}: no geometries for convex hull calculation",
                    path.display(),
                    layer_name
                );
                continue;
            }

            let layer_points = match layer_hull_points(&collection) {
                Some(points) => points,
                None => continue,
            };
            match transform::points_to_wgs84(&crs, &layer_points) {
                Ok(transformed) => hull_points.extend(transformed),
                Err(e) => log::debug!("{}/{}: {}", path.display(), layer_name, e),
            }
        }

        let bbox = match Bbox::from_points(hull_points.iter().copied()) {
            Some(bbox) if bbox.is_valid_wgs84() => bbox,
            _ => return Ok(None),
        };
        // collinear inputs leave no ring to report; keep the flag and use
        // the envelope corners instead
        let ring = merge::hull_of_points(&hull_points).unwrap_or_else(|| bbox.ring());

        Ok(Some(SpatialExtent {
            bbox,
            crs: Crs::Epsg(WGS84_EPSG),
            hull_coords: Some(ring),
            convex_hull: true,
        }))
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[
            ".shp", ".shx", ".dbf", ".prj", ".geojson", ".json", ".gpkg", ".gdb", ".gpx",
            ".kml", ".kmz", ".gml", ".fgb",
        ]
    }
}

fn open_vector(path: &Path) -> Result<Dataset> {
    Dataset::open(path)
        .map_err(|e| geoextent_core::error::ExtentError::extraction(path.display(), e))
}

/// hull (or degenerate fallback) of one layer's geometry collection, as
/// source-CRS (x, y) pairs.
fn layer_hull_points(collection: &Geometry) -> Option<Vec<(f64, f64)>> {
    let envelope = collection.envelope();
    let degenerate_point = envelope.MinX == envelope.MaxX && envelope.MinY == envelope.MaxY;
    if degenerate_point {
        return Some(vec![(envelope.MinX, envelope.MinY)]);
    }

    let hull = match collection.convex_hull() {
        Ok(hull) => hull,
        Err(_) => {
            // envelope corners stand in when the hull cannot be computed
            return Some(vec![
                (envelope.MinX, envelope.MinY),
                (envelope.MaxX, envelope.MinY),
                (envelope.MaxX, envelope.MaxY),
                (envelope.MinX, envelope.MaxY),
            ]);
        }
    };

    match hull.to_geo() {
        Ok(geo_types::Geometry::Polygon(polygon)) => Some(
            polygon
                .exterior()
                .coords()
                .map(|c| (c.x, c.y))
                .collect(),
        ),
        Ok(geo_types::Geometry::LineString(line)) => {
            Some(line.coords().map(|c| (c.x, c.y)).collect())
        }
        Ok(geo_types::Geometry::Point(point)) => Some(vec![(point.x(), point.y())]),
        _ => Some(vec![
            (envelope.MinX, envelope.MinY),
            (envelope.MaxX, envelope.MinY),
            (envelope.MaxX, envelope.MaxY),
            (envelope.MinX, envelope.MaxY),
        ]),
    }
}

fn layer_crs<L: LayerAccess>(layer: &L, layer_name: &str) -> Option<Crs> {
    let mut spatial_ref = layer.spatial_ref()?;
    if spatial_ref.auto_identify_epsg().is_ok() {
        if let Ok(code) = spatial_ref.auth_code() {
            return Some(Crs::Epsg(code as u32));
        }
    }
    match spatial_ref.to_wkt() {
        Ok(wkt) if !wkt.is_empty() => {
            log::debug!("layer {} has no EPSG code, using WKT definition", layer_name);
            Some(Crs::Wkt(wkt))
        }
        _ => None,
    }
}

fn envelope_to_bbox(envelope: &gdal_sys::OGREnvelope, gml_swapped: bool) -> Bbox {
    if gml_swapped {
        // GML on GDAL >= 3.2 reports (minLat, maxLat, minLon, maxLon)
        Bbox::new(envelope.MinX, envelope.MinY, envelope.MaxX, envelope.MaxY)
    } else {
        Bbox::new(envelope.MinY, envelope.MinX, envelope.MaxY, envelope.MaxX)
    }
}

fn is_null_island(bbox: &Bbox) -> bool {
    bbox.min_lat == 0.0 && bbox.min_lon == 0.0 && bbox.max_lat == 0.0 && bbox.max_lon == 0.0
}

fn is_gml_with_swapped_envelope(dataset: &Dataset) -> bool {
    if dataset.driver().short_name() != "GML" {
        return false;
    }
    let version: i64 = gdal::version::version_info("VERSION_NUM")
        .parse()
        .unwrap_or(0);
    version >= 3020000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_order_with_and_without_gml_swap() {
        let envelope = gdal_sys::OGREnvelope {
            MinX: 7.602,
            MaxX: 7.647,
            MinY: 51.949,
            MaxY: 51.975,
        };
        assert_eq!(
            envelope_to_bbox(&envelope, false),
            Bbox::new(51.949, 7.602, 51.975, 7.647)
        );
        // a GML envelope carries latitudes in the X slots
        let swapped = gdal_sys::OGREnvelope {
            MinX: 51.949,
            MaxX: 51.975,
            MinY: 7.602,
            MaxY: 7.647,
        };
        assert_eq!(
            envelope_to_bbox(&swapped, true),
            Bbox::new(51.949, 7.602, 51.975, 7.647)
        );
    }

    #[test]
    fn null_island_guard() {
        assert!(is_null_island(&Bbox::new(0.0, 0.0, 0.0, 0.0)));
        assert!(!is_null_island(&Bbox::new(0.0, 0.0, 0.1, 0.1)));
    }
}
