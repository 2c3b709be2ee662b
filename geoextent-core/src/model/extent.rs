use super::{Bbox, Tbox};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt::Display;

/// source coordinate reference system of a freshly extracted bounding box,
/// before transformation to WGS84.
#[derive(Clone, Debug, PartialEq)]
pub enum Crs {
    Epsg(u32),
    Wkt(String),
}

impl Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Wkt(_) => write!(f, "<wkt definition>"),
        }
    }
}

/// raw spatial extent as produced by a format handler. until transformed,
/// the `bbox` fields carry source-CRS coordinates (y in the `lat` fields,
/// x in the `lon` fields).
#[derive(Clone, Debug)]
pub struct SpatialExtent {
    pub bbox: Bbox,
    pub crs: Crs,
    /// exterior ring of the convex hull as (x, y) pairs, when requested
    /// and computable. set alongside `convex_hull`.
    pub hull_coords: Option<Vec<(f64, f64)>>,
    pub convex_hull: bool,
}

impl SpatialExtent {
    pub fn new(bbox: Bbox, crs: Crs) -> SpatialExtent {
        SpatialExtent {
            bbox,
            crs,
            hull_coords: None,
            convex_hull: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    Metadata,
    Download,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Metadata => "metadata",
            ExtractionMethod::Download => "download",
        }
    }
}

/// record of a cross-provider follow: a registry entry at `from` referenced
/// `via`, which dispatched to provider `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Followed {
    pub from: String,
    pub to: String,
    pub via: String,
}

/// per-identifier counters for bulk remote extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_resources: usize,
    pub successful: usize,
    pub failed: usize,
}

/// the aggregate extraction result. fields are None when their inputs did
/// not yield a value; serialization omits absent keys entirely rather than
/// emitting nulls or empty arrays.
#[derive(Clone, Debug, Default)]
pub struct Extent {
    /// "folder", "archive", "remote", "multiple_files", or a file extension
    pub format: String,
    pub bbox: Option<Bbox>,
    pub crs: Option<String>,
    pub tbox: Option<Tbox>,
    pub convex_hull: bool,
    /// hull exterior ring as (lon, lat) pairs in WGS84
    pub hull_coords: Option<Vec<(f64, f64)>>,
    /// per-entry results keyed by filename (directories) or identifier
    /// (bulk remote mode). None marks an unsupported or failed entry.
    pub details: Option<BTreeMap<String, Option<Extent>>>,
    pub extraction_method: Option<ExtractionMethod>,
    /// wall-clock limit in seconds, present when the walk was cut short
    pub timeout: Option<u64>,
    pub followed: Option<Followed>,
    pub extraction_metadata: Option<ExtractionStats>,
    /// bulk mode only: the failure message for this identifier
    pub error: Option<String>,
}

impl Extent {
    pub fn new(format: impl Into<String>) -> Extent {
        Extent {
            format: format.into(),
            ..Default::default()
        }
    }

    pub fn has_extent(&self) -> bool {
        self.bbox.is_some() || self.tbox.is_some()
    }

    /// JSON representation with absent keys omitted. `legacy` selects the
    /// lon-first bbox array order at this boundary only.
    pub fn to_json(&self, legacy: bool) -> Value {
        let mut map = Map::new();
        map.insert(String::from("format"), json!(self.format));
        if let Some(error) = &self.error {
            map.insert(String::from("error"), json!(error));
        }
        if let Some(bbox) = &self.bbox {
            if self.convex_hull {
                if let Some(coords) = &self.hull_coords {
                    let ring: Vec<Value> = coords.iter().map(|(x, y)| json!([x, y])).collect();
                    map.insert(String::from("bbox"), Value::Array(ring));
                } else {
                    map.insert(String::from("bbox"), json!(bbox.to_array(legacy)));
                }
                map.insert(String::from("convex_hull"), json!(true));
            } else {
                map.insert(String::from("bbox"), json!(bbox.to_array(legacy)));
            }
        }
        if let Some(crs) = &self.crs {
            map.insert(String::from("crs"), json!(crs));
        }
        if let Some(tbox) = &self.tbox {
            map.insert(String::from("tbox"), json!(tbox.to_pair()));
        }
        if let Some(method) = &self.extraction_method {
            map.insert(String::from("extraction_method"), json!(method.as_str()));
        }
        if let Some(timeout) = self.timeout {
            map.insert(String::from("timeout"), json!(timeout));
        }
        if let Some(followed) = &self.followed {
            map.insert(
                String::from("followed"),
                json!({
                    "from": followed.from,
                    "to": followed.to,
                    "via": followed.via,
                }),
            );
        }
        if let Some(stats) = &self.extraction_metadata {
            map.insert(
                String::from("extraction_metadata"),
                json!({
                    "total_resources": stats.total_resources,
                    "successful": stats.successful,
                    "failed": stats.failed,
                }),
            );
        }
        if let Some(details) = &self.details {
            let mut detail_map = Map::new();
            for (name, entry) in details {
                let value = match entry {
                    Some(extent) => extent.to_json(legacy),
                    None => Value::Null,
                };
                detail_map.insert(name.clone(), value);
            }
            map.insert(String::from("details"), Value::Object(detail_map));
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_omits_absent_keys() {
        let extent = Extent::new("csv");
        let value = extent.to_json(false);
        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("format").unwrap(), "csv");
        assert!(!obj.contains_key("bbox"));
        assert!(!obj.contains_key("tbox"));
        assert!(!obj.contains_key("timeout"));
    }

    #[test]
    fn json_bbox_order_follows_legacy_flag() {
        let mut extent = Extent::new("geojson");
        extent.bbox = Some(Bbox::new(51.0, 7.0, 52.0, 8.0));
        extent.crs = Some(String::from("4326"));
        let native = extent.to_json(false);
        assert_eq!(native["bbox"], json!([51.0, 7.0, 52.0, 8.0]));
        let legacy = extent.to_json(true);
        assert_eq!(legacy["bbox"], json!([7.0, 51.0, 8.0, 52.0]));
    }

    #[test]
    fn json_details_keeps_null_entries() {
        let mut extent = Extent::new("folder");
        let mut details = BTreeMap::new();
        details.insert(String::from("notes.txt"), None);
        details.insert(String::from("cities.csv"), Some(Extent::new("csv")));
        extent.details = Some(details);
        let value = extent.to_json(false);
        assert!(value["details"]["notes.txt"].is_null());
        assert_eq!(value["details"]["cities.csv"]["format"], "csv");
    }
}
