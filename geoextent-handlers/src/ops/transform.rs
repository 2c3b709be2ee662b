use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::extent::Crs;
use geoextent_core::model::{Bbox, SpatialExtent, WGS84_EPSG};

/// builds a spatial reference with x/y (lon/lat) axis order regardless of
/// the authority's declared axis convention.
pub fn spatial_ref_for(crs: &Crs) -> Result<SpatialRef> {
    let sr = match crs {
        Crs::Epsg(code) => SpatialRef::from_epsg(*code),
        Crs::Wkt(wkt) => SpatialRef::from_wkt(wkt),
    }
    .map_err(|e| ExtentError::CrsTransform(format!("unusable source CRS {}: {}", crs, e)))?;
    sr.set_axis_mapping_strategy(OAMS_TRADITIONAL_GIS_ORDER);
    Ok(sr)
}

fn wgs84_spatial_ref() -> Result<SpatialRef> {
    let sr = SpatialRef::from_epsg(WGS84_EPSG)
        .map_err(|e| ExtentError::CrsTransform(format!("EPSG:4326 unavailable: {}", e)))?;
    sr.set_axis_mapping_strategy(OAMS_TRADITIONAL_GIS_ORDER);
    Ok(sr)
}

/// transforms (x, y) points from the given CRS into WGS84 lon/lat pairs.
pub fn points_to_wgs84(crs: &Crs, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>> {
    if matches!(crs, Crs::Epsg(code) if *code == WGS84_EPSG) {
        return Ok(points.to_vec());
    }
    let source = spatial_ref_for(crs)?;
    let target = wgs84_spatial_ref()?;
    let transform = CoordTransform::new(&source, &target)
        .map_err(|e| ExtentError::CrsTransform(format!("transform from {}: {}", crs, e)))?;

    let mut xs: Vec<f64> = points.iter().map(|(x, _)| *x).collect();
    let mut ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
    let mut zs: Vec<f64> = vec![0.0; points.len()];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|e| ExtentError::CrsTransform(format!("transform from {}: {}", crs, e)))?;

    Ok(xs.into_iter().zip(ys).collect())
}

/// transforms a raw handler extent into WGS84, applying the flip heuristic
/// once when the transformed box fails the range check. None when the box
/// is unusable even after flipping.
pub fn to_wgs84(extent: &SpatialExtent, context: &str) -> Result<Option<SpatialExtent>> {
    let corners = [
        (extent.bbox.min_lon, extent.bbox.min_lat),
        (extent.bbox.max_lon, extent.bbox.max_lat),
    ];
    let transformed = points_to_wgs84(&extent.crs, &corners)?;
    let mut bbox = Bbox::from_corners(transformed[0], transformed[1]);

    let hull_coords = match &extent.hull_coords {
        Some(coords) => Some(points_to_wgs84(&extent.crs, coords)?),
        None => None,
    };

    if !bbox.is_valid_wgs84() {
        let flipped = bbox.flipped();
        if flipped.is_valid_wgs84() {
            log::debug!(
                "{}: bbox {} out of WGS84 range, accepted after axis flip",
                context,
                bbox
            );
            bbox = flipped;
        } else {
            log::warn!(
                "{}: bbox {} outside valid WGS84 ranges after transformation, dropping",
                context,
                bbox
            );
            return Ok(None);
        }
    }

    Ok(Some(SpatialExtent {
        bbox,
        crs: Crs::Epsg(WGS84_EPSG),
        hull_coords,
        convex_hull: extent.convex_hull,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgs84_input_is_passthrough() {
        let raw = SpatialExtent::new(Bbox::new(51.9, 7.6, 52.0, 7.7), Crs::Epsg(4326));
        let out = to_wgs84(&raw, "test").unwrap().unwrap();
        assert_eq!(out.bbox, raw.bbox);
    }

    #[test]
    fn flip_recovers_swapped_axes() {
        // lat/lon stored swapped: latitude slot holds 7.6 (fine) but the
        // longitude slot holds 251, invalid either way, dropped
        let raw = SpatialExtent::new(Bbox::new(7.6, 251.0, 7.7, 252.0), Crs::Epsg(4326));
        assert!(to_wgs84(&raw, "test").unwrap().is_none());

        // impossible latitude 95 but plausible after swapping the axes
        let raw = SpatialExtent::new(Bbox::new(95.0, 51.9, 97.0, 52.0), Crs::Epsg(4326));
        let out = to_wgs84(&raw, "test").unwrap().unwrap();
        assert_eq!(out.bbox, Bbox::new(51.9, 95.0, 52.0, 97.0));
    }
}
