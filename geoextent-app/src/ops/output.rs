use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent};
use geo_types::{Geometry, LineString, Point, Polygon};
use serde_json::{json, Value};
use std::path::Path;
use wkt::ToWkt;

/// output encodings for the extracted extent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Geojson,
    Wkt,
    Wkb,
    Geopackage,
}

/// geometry for the spatial result: the convex hull ring when present,
/// else the bbox polygon, degenerating to a point for zero-extent boxes.
pub fn extent_geometry(extent: &Extent) -> Option<Geometry<f64>> {
    if let Some(ring) = &extent.hull_coords {
        if ring.len() >= 4 {
            let line: LineString<f64> = ring.iter().map(|(x, y)| (*x, *y)).collect();
            return Some(Geometry::Polygon(Polygon::new(line, vec![])));
        }
    }
    let bbox = extent.bbox?;
    if bbox.min_lat == bbox.max_lat && bbox.min_lon == bbox.max_lon {
        return Some(Geometry::Point(Point::new(bbox.min_lon, bbox.min_lat)));
    }
    Some(Geometry::Polygon(bbox_polygon(&bbox)))
}

fn bbox_polygon(bbox: &Bbox) -> Polygon<f64> {
    let ring: LineString<f64> = bbox.ring().into_iter().collect();
    Polygon::new(ring, vec![])
}

/// GeoJSON FeatureCollection with one feature per extracted geometry; the
/// complete machine-readable result rides along in a dedicated top-level
/// key so consumers do not have to re-derive it from the geometry.
pub fn to_geojson(extent: &Extent, legacy: bool, metadata: Option<&Value>) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(String::from("format"), json!(extent.format));
    if let Some(crs) = &extent.crs {
        properties.insert(String::from("crs"), json!(crs));
    }
    if let Some(tbox) = &extent.tbox {
        properties.insert(String::from("tbox"), json!(tbox.to_pair()));
    }

    let features: Vec<Value> = match extent_geometry(extent) {
        Some(geometry) => {
            let converted = geojson::Geometry::new(geojson::Value::from(&geometry));
            vec![json!({
                "type": "Feature",
                "geometry": converted,
                "properties": Value::Object(properties),
            })]
        }
        None => vec![],
    };

    let mut collection = serde_json::Map::new();
    collection.insert(String::from("type"), json!("FeatureCollection"));
    collection.insert(String::from("features"), Value::Array(features));
    collection.insert(String::from("geoextent"), extent.to_json(legacy));
    if let Some(metadata) = metadata {
        collection.insert(String::from("metadata"), metadata.clone());
    }
    Value::Object(collection)
}

/// raw WKT polygon (or point) of the spatial result.
pub fn to_wkt(extent: &Extent) -> Result<String> {
    let geometry = extent_geometry(extent).ok_or_else(|| {
        ExtentError::Extraction {
            path: String::from("<result>"),
            message: String::from("no spatial extent to format"),
        }
    })?;
    Ok(geometry.wkt_string())
}

/// hex-encoded WKB of the spatial result.
pub fn to_wkb_hex(extent: &Extent) -> Result<String> {
    let geometry = extent_geometry(extent).ok_or_else(|| {
        ExtentError::Extraction {
            path: String::from("<result>"),
            message: String::from("no spatial extent to format"),
        }
    })?;
    let bytes = wkb::geom_to_wkb(&geometry).map_err(|e| ExtentError::Extraction {
        path: String::from("<result>"),
        message: format!("WKB encoding failed: {:?}", e),
    })?;
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

/// writes the spatial result into a GeoPackage with a single `extent`
/// layer.
pub fn to_geopackage(extent: &Extent, path: &Path) -> Result<()> {
    use gdal::spatial_ref::SpatialRef;
    use gdal::vector::LayerOptions;

    let geometry = extent_geometry(extent).ok_or_else(|| ExtentError::Extraction {
        path: path.display().to_string(),
        message: String::from("no spatial extent to write"),
    })?;
    let wkt_geometry = geometry.wkt_string();

    let driver = gdal::DriverManager::get_driver_by_name("GPKG").map_err(|e| {
        ExtentError::Extraction {
            path: path.display().to_string(),
            message: format!("GeoPackage driver unavailable: {}", e),
        }
    })?;
    let mut dataset = driver
        .create_vector_only(path)
        .map_err(|e| ExtentError::Extraction {
            path: path.display().to_string(),
            message: format!("could not create GeoPackage: {}", e),
        })?;
    let srs = SpatialRef::from_epsg(geoextent_core::model::WGS84_EPSG).map_err(|e| {
        ExtentError::CrsTransform(format!("EPSG:4326 unavailable: {}", e))
    })?;
    let mut layer = dataset
        .create_layer(LayerOptions {
            name: "extent",
            srs: Some(&srs),
            ..Default::default()
        })
        .map_err(|e| ExtentError::Extraction {
            path: path.display().to_string(),
            message: format!("could not create layer: {}", e),
        })?;
    let gdal_geometry =
        gdal::vector::Geometry::from_wkt(&wkt_geometry).map_err(|e| ExtentError::Extraction {
            path: path.display().to_string(),
            message: format!("geometry conversion failed: {}", e),
        })?;
    layer
        .create_feature(gdal_geometry)
        .map_err(|e| ExtentError::Extraction {
            path: path.display().to_string(),
            message: format!("could not write feature: {}", e),
        })?;
    Ok(())
}

/// preview link rendering the extent on geojson.io.
pub fn geojsonio_url(extent: &Extent, legacy: bool) -> Option<String> {
    extent.bbox?;
    let collection = to_geojson(extent, legacy, None);
    // strip the non-standard members for the preview payload
    let mut preview = collection.clone();
    if let Some(object) = preview.as_object_mut() {
        object.remove("geoextent");
        object.remove("metadata");
    }
    let encoded = urlencode(&preview.to_string());
    Some(format!(
        "https://geojson.io/#data=data:application/json,{}",
        encoded
    ))
}

fn urlencode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// opens the geojson.io preview in the default browser.
pub fn browse(url: &str) -> Result<()> {
    let command = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    std::process::Command::new(command)
        .arg(url)
        .spawn()
        .map_err(|e| ExtentError::Config(format!("could not open browser: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent_with_bbox() -> Extent {
        let mut extent = Extent::new("geojson");
        extent.bbox = Some(Bbox::new(51.949, 7.602, 51.975, 7.647));
        extent.crs = Some(String::from("4326"));
        extent
    }

    #[test]
    fn geojson_collection_shape() {
        let value = to_geojson(&extent_with_bbox(), false, None);
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["geometry"]["type"], "Polygon");
        assert_eq!(value["geoextent"]["format"], "geojson");
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn wkt_is_a_polygon_ring() {
        let wkt = to_wkt(&extent_with_bbox()).unwrap();
        assert!(wkt.starts_with("POLYGON"));
        assert!(wkt.contains("7.602"));
    }

    #[test]
    fn wkb_round_trips() {
        let hex = to_wkb_hex(&extent_with_bbox()).unwrap();
        let bytes: Vec<u8> = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect();
        let geometry = wkb::wkb_to_geom(&mut &bytes[..]).unwrap();
        match geometry {
            Geometry::Polygon(polygon) => {
                assert_eq!(polygon.exterior().coords().count(), 5);
            }
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn point_extents_become_points() {
        let mut extent = Extent::new("remote");
        extent.bbox = Some(Bbox::point(52.5, 13.4));
        let wkt = to_wkt(&extent).unwrap();
        assert!(wkt.starts_with("POINT"));
    }

    #[test]
    fn no_bbox_means_no_preview_url() {
        let extent = Extent::new("csv");
        assert!(geojsonio_url(&extent, false).is_none());
        assert!(geojsonio_url(&extent_with_bbox(), false)
            .unwrap()
            .starts_with("https://geojson.io/#data="));
    }
}
