use super::client::{urlencode, ProviderClient};
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, WGS84_EPSG};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

const SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";

/// extreme-coordinate properties (P1332-P1335) and the coordinate location
/// (P625) of one item.
const SPARQL_QUERY: &str = "\
SELECT ?itemLabel ?northLat ?southLat ?eastLon ?westLon ?coord WHERE {
  OPTIONAL { wd:QID wdt:P1332 ?north . BIND(geof:latitude(?north) AS ?northLat) }
  OPTIONAL { wd:QID wdt:P1333 ?south . BIND(geof:latitude(?south) AS ?southLat) }
  OPTIONAL { wd:QID wdt:P1334 ?east . BIND(geof:longitude(?east) AS ?eastLon) }
  OPTIONAL { wd:QID wdt:P1335 ?west . BIND(geof:longitude(?west) AS ?westLon) }
  OPTIONAL { wd:QID wdt:P625 ?coord }
  SERVICE wikibase:label { bd:serviceParam wikibase:language \"en\" }
}";

pub struct Wikidata {
    client: ProviderClient,
    qid: Option<String>,
}

fn q_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?i)Q(\d+)$").expect("static pattern"))
}

fn wikidata_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i)https?://(?:www\.)?wikidata\.org/(?:wiki|entity)/Q(\d+)$")
            .expect("static pattern")
    })
}

fn wkt_point_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)Point\(([+-]?[\d.]+)\s+([+-]?[\d.]+)\)").expect("static pattern")
    })
}

/// the four-tier coordinate priority: all extremes, partial extremes plus
/// points, points only, single point.
fn bbox_from_bindings(bindings: &[Value]) -> Option<(Bbox, Option<String>)> {
    let mut label = None;
    let mut north = None;
    let mut south = None;
    let mut east = None;
    let mut west = None;
    let mut points: Vec<(f64, f64)> = vec![];

    for binding in bindings {
        if label.is_none() {
            label = binding["itemLabel"]["value"].as_str().map(String::from);
        }
        let coordinate = |key: &str| binding[key]["value"].as_str()?.parse::<f64>().ok();
        north = north.or_else(|| coordinate("northLat"));
        south = south.or_else(|| coordinate("southLat"));
        east = east.or_else(|| coordinate("eastLon"));
        west = west.or_else(|| coordinate("westLon"));
        if let Some(wkt) = binding["coord"]["value"].as_str() {
            if let Some(captures) = wkt_point_pattern().captures(wkt) {
                if let (Ok(lon), Ok(lat)) =
                    (captures[1].parse::<f64>(), captures[2].parse::<f64>())
                {
                    if !points.contains(&(lon, lat)) {
                        points.push((lon, lat));
                    }
                }
            }
        }
    }

    // all four extremes present
    if let (Some(north), Some(south), Some(east), Some(west)) = (north, south, east, west) {
        return Some((Bbox::new(south, west, north, east), label));
    }

    // partial extremes are combined with the point locations
    let has_partial = north.is_some() || south.is_some() || east.is_some() || west.is_some();
    if has_partial && !points.is_empty() {
        let mut lats: Vec<f64> = points.iter().map(|(_, lat)| *lat).collect();
        let mut lons: Vec<f64> = points.iter().map(|(lon, _)| *lon).collect();
        lats.extend(north);
        lats.extend(south);
        lons.extend(east);
        lons.extend(west);
        let bbox = Bbox::new(
            lats.iter().cloned().fold(f64::INFINITY, f64::min),
            lons.iter().cloned().fold(f64::INFINITY, f64::min),
            lats.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            lons.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        );
        return Some((bbox, label));
    }

    // point locations only; a single point degenerates to a zero-extent box
    if !points.is_empty() {
        return Some((Bbox::from_points(points.iter().copied())?, label));
    }

    None
}

impl Wikidata {
    pub fn new() -> Result<Wikidata> {
        Ok(Wikidata {
            client: ProviderClient::new()?,
            qid: None,
        })
    }

    fn qid(&self) -> Result<&str> {
        self.qid
            .as_deref()
            .ok_or_else(|| ExtentError::provider("Wikidata", "provider not validated"))
    }

    async fn query(&self) -> Result<Vec<Value>> {
        let query = SPARQL_QUERY.replace("QID", self.qid()?);
        let url = format!(
            "{}?query={}&format=json",
            SPARQL_ENDPOINT,
            urlencode(&query)
        );
        let response = self.client.get_json(&url, "Wikidata").await?;
        Ok(response["results"]["bindings"]
            .as_array()
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl Provider for Wikidata {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Wikidata",
            description: "Wikidata is the free knowledge base feeding Wikipedia; \
                          geographic extents come from its SPARQL endpoint.",
            website: "https://www.wikidata.org/",
            supported_identifiers: vec!["https://www.wikidata.org/wiki/{qid}", "{qid}"],
            doi_prefixes: vec![],
            examples: vec!["Q64", "Q1731", "https://www.wikidata.org/wiki/Q64"],
            notes: Some(
                "Uses extreme-coordinate properties (P1332-P1335) with coordinate \
                 location (P625) as fallback.",
            ),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let reference = reference.trim();
        if let Some(captures) = q_number_pattern()
            .captures(reference)
            .or_else(|| wikidata_url_pattern().captures(reference))
        {
            self.qid = Some(format!("Q{}", &captures[1]));
            return Ok(true);
        }
        Ok(false)
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        let bindings = self.query().await?;
        Ok(bbox_from_bindings(&bindings).map(|(bbox, _)| {
            let mut extent = Extent::new("remote");
            extent.bbox = Some(bbox);
            extent.crs = Some(WGS84_EPSG.to_string());
            extent
        }))
    }

    async fn download(&mut self, target: &Path, _opts: &RemoteOptions) -> Result<()> {
        let bindings = self.query().await?;
        let qid = self.qid()?.to_string();
        match bbox_from_bindings(&bindings) {
            Some((bbox, label)) => {
                let mut content = SidecarContent::new("Wikidata", qid);
                content.title = label;
                content.geometries = vec![SidecarContent::bbox_geometry(
                    bbox.min_lat,
                    bbox.min_lon,
                    bbox.max_lat,
                    bbox.max_lon,
                )];
                sidecar::write_sidecar(target, "wikidata", &content)?;
            }
            None => {
                log::warn!("no geographic coordinates found for Wikidata item {}", qid);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn q_numbers_and_urls_validate() {
        let mut wikidata = Wikidata::new().unwrap();
        assert!(tokio_test::block_on(wikidata.validate("Q64")).unwrap());
        assert_eq!(wikidata.qid.as_deref(), Some("Q64"));

        let mut wikidata = Wikidata::new().unwrap();
        assert!(tokio_test::block_on(
            wikidata.validate("https://www.wikidata.org/wiki/Q64")
        )
        .unwrap());

        let mut wikidata = Wikidata::new().unwrap();
        assert!(!tokio_test::block_on(wikidata.validate("q-not-a-number")).unwrap());
    }

    fn binding(key: &str, value: &str) -> Value {
        json!({key: {"value": value}})
    }

    #[test]
    fn all_extremes_win() {
        let bindings = vec![
            binding("northLat", "52.7"),
            binding("southLat", "52.3"),
            binding("eastLon", "13.8"),
            binding("westLon", "13.0"),
            binding("coord", "Point(13.4 52.5)"),
        ];
        let (bbox, _) = bbox_from_bindings(&bindings).unwrap();
        assert_eq!(bbox, Bbox::new(52.3, 13.0, 52.7, 13.8));
    }

    #[test]
    fn partial_extremes_union_with_points() {
        let bindings = vec![
            binding("northLat", "53.0"),
            binding("coord", "Point(13.4 52.5)"),
        ];
        let (bbox, _) = bbox_from_bindings(&bindings).unwrap();
        assert_eq!(bbox, Bbox::new(52.5, 13.4, 53.0, 13.4));
    }

    #[test]
    fn single_point_degenerates_to_zero_extent() {
        let bindings = vec![binding("coord", "Point(13.383333 52.516667)")];
        let (bbox, _) = bbox_from_bindings(&bindings).unwrap();
        assert_eq!(bbox.min_lat, bbox.max_lat);
        assert_eq!(bbox.min_lon, bbox.max_lon);
    }

    #[test]
    fn multiple_points_form_an_envelope() {
        let bindings = vec![
            binding("coord", "Point(13.0 52.0)"),
            binding("coord", "Point(14.0 53.0)"),
        ];
        let (bbox, _) = bbox_from_bindings(&bindings).unwrap();
        assert_eq!(bbox, Bbox::new(52.0, 13.0, 53.0, 14.0));
    }

    #[test]
    fn no_coordinates_is_none() {
        let bindings = vec![binding("itemLabel", "Somewhere")];
        assert!(bbox_from_bindings(&bindings).is_none());
    }
}
