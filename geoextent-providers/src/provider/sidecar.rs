use super::sanitize_id;
use geoextent_core::error::Result;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// metadata-derived extent to be handed to the directory aggregator as a
/// single GeoJSON sidecar file.
#[derive(Clone, Debug, Default)]
pub struct SidecarContent {
    /// provider display name, recorded in the feature properties
    pub source: String,
    pub record_id: String,
    pub title: Option<String>,
    /// GeoJSON geometry objects, coordinates in [lon, lat]
    pub geometries: Vec<Value>,
    /// ISO start/end strings
    pub temporal: Option<(String, String)>,
}

impl SidecarContent {
    pub fn new(source: impl Into<String>, record_id: impl Into<String>) -> SidecarContent {
        SidecarContent {
            source: source.into(),
            record_id: record_id.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty() && self.temporal.is_none()
    }

    /// a polygon (or degenerate point) geometry for a lat/lon bounding box.
    pub fn bbox_geometry(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Value {
        if min_lat == max_lat && min_lon == max_lon {
            json!({ "type": "Point", "coordinates": [min_lon, min_lat] })
        } else {
            json!({
                "type": "Polygon",
                "coordinates": [[
                    [min_lon, min_lat],
                    [max_lon, min_lat],
                    [max_lon, max_lat],
                    [min_lon, max_lat],
                    [min_lon, min_lat],
                ]],
            })
        }
    }
}

/// writes a FeatureCollection sidecar named `{prefix}_{record_id}.geojson`
/// into `folder`. returns None (with a debug log) when the metadata holds
/// neither geometry nor temporal coverage; absence is a signal, not an
/// error.
pub fn write_sidecar(folder: &Path, prefix: &str, content: &SidecarContent) -> Result<Option<PathBuf>> {
    if content.is_empty() {
        log::debug!(
            "{} record {}: no geolocation or temporal metadata",
            content.source,
            content.record_id
        );
        return Ok(None);
    }

    let mut properties = Map::new();
    properties.insert(
        String::from("source"),
        json!(format!("{} metadata", content.source)),
    );
    properties.insert(String::from("dataset_id"), json!(content.record_id));
    if let Some(title) = &content.title {
        properties.insert(String::from("title"), json!(title));
    }
    if let Some((start, end)) = &content.temporal {
        properties.insert(String::from("start_time"), json!(start));
        properties.insert(String::from("end_time"), json!(end));
    }

    let features: Vec<Value> = if content.geometries.is_empty() {
        vec![json!({
            "type": "Feature",
            "geometry": Value::Null,
            "properties": properties,
        })]
    } else {
        content
            .geometries
            .iter()
            .map(|geometry| {
                json!({
                    "type": "Feature",
                    "geometry": geometry,
                    "properties": properties.clone(),
                })
            })
            .collect()
    };

    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });

    let filename = format!("{}_{}.geojson", prefix, sanitize_id(&content.record_id));
    let filepath = folder.join(filename);
    std::fs::write(&filepath, serde_json::to_string_pretty(&collection)?)?;
    log::info!(
        "created GeoJSON metadata file for {} record {}",
        content.source,
        content.record_id
    );
    Ok(Some(filepath))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metadata_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let content = SidecarContent::new("Test", "id1");
        assert!(write_sidecar(dir.path(), "test", &content)
            .unwrap()
            .is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn temporal_only_sidecar_has_null_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = SidecarContent::new("Test", "id1");
        content.temporal = Some((String::from("2014-08-21"), String::from("2020-09-30")));
        let path = write_sidecar(dir.path(), "test", &content).unwrap().unwrap();
        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(value["features"][0]["geometry"].is_null());
        assert_eq!(value["features"][0]["properties"]["start_time"], "2014-08-21");
    }

    #[test]
    fn bbox_geometry_degenerates_to_point() {
        let point = SidecarContent::bbox_geometry(52.5, 13.4, 52.5, 13.4);
        assert_eq!(point["type"], "Point");
        let polygon = SidecarContent::bbox_geometry(41.3, 2.0, 41.5, 2.2);
        assert_eq!(polygon["type"], "Polygon");
        assert_eq!(polygon["coordinates"][0][0], json!([2.0, 41.3]));
    }

    #[test]
    fn sidecar_filename_sanitizes_record_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = SidecarContent::new("Test", "10.5281/zenodo.1");
        content.geometries = vec![SidecarContent::bbox_geometry(1.0, 2.0, 3.0, 4.0)];
        let path = write_sidecar(dir.path(), "test", &content).unwrap().unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "test_10.5281_zenodo.1.geojson"
        );
    }
}
