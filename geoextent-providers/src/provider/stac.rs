use super::client::ProviderClient;
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use url::Url;

/// known STAC API hostnames for offline URL matching.
const KNOWN_STAC_HOSTS: [&str; 8] = [
    "earth-search.aws.element84.com",
    "planetarycomputer.microsoft.com",
    "geoservice.dlr.de",
    "cmr.earthdata.nasa.gov",
    "stac.dataspace.copernicus.eu",
    "api.stac.worldpop.org",
    "gep-supersites-stac.terradue.com",
    "api.lantmateriet.se",
];

/// STAC collections carry pre-computed aggregate extents; items carry a
/// bbox and datetime. either way no data download is needed.
pub struct Stac {
    client: ProviderClient,
    url: Option<String>,
}

fn stac_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)/stac(?:/|$)|/collections/[^/]+$|/collections/[^/]+/items")
            .expect("static pattern")
    })
}

impl Stac {
    pub fn new() -> Result<Stac> {
        Ok(Stac {
            client: ProviderClient::new()?,
            url: None,
        })
    }

    fn url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .ok_or_else(|| ExtentError::provider("STAC", "provider not validated"))
    }

    async fn fetch(&self) -> Result<Value> {
        self.client.get_json(self.url()?, "STAC").await
    }

    /// collection extent.spatial.bbox (first entry is the overall box) or
    /// item-level bbox, both [west, south, east, north].
    fn parse_spatial(data: &Value) -> Option<Bbox> {
        let bbox = data["extent"]["spatial"]["bbox"][0]
            .as_array()
            .or_else(|| data["bbox"].as_array())?;
        let values: Vec<f64> = bbox.iter().filter_map(|v| v.as_f64()).collect();
        if values.len() < 4 {
            return None;
        }
        Some(Bbox::new(values[1], values[0], values[3], values[2]))
    }

    /// collection extent.temporal.interval or item datetime properties.
    fn parse_temporal(data: &Value) -> Option<(String, String)> {
        if let Some(interval) = data["extent"]["temporal"]["interval"][0].as_array() {
            let start = interval.first().and_then(|v| v.as_str());
            let end = interval.get(1).and_then(|v| v.as_str());
            return match (start, end) {
                (Some(start), Some(end)) => Some((String::from(start), String::from(end))),
                (Some(single), None) | (None, Some(single)) => {
                    Some((String::from(single), String::from(single)))
                }
                (None, None) => None,
            };
        }
        let properties = &data["properties"];
        if let Some(datetime) = properties["datetime"].as_str() {
            return Some((String::from(datetime), String::from(datetime)));
        }
        match (
            properties["start_datetime"].as_str(),
            properties["end_datetime"].as_str(),
        ) {
            (Some(start), Some(end)) => Some((String::from(start), String::from(end))),
            _ => None,
        }
    }

    fn tbox_of(temporal: &Option<(String, String)>) -> Option<Tbox> {
        let (start, end) = temporal.as_ref()?;
        Some(Tbox::new(
            dates::parse_date(start)?,
            dates::parse_date(end)?,
        ))
    }
}

#[async_trait]
impl Provider for Stac {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "STAC",
            description: "SpatioTemporal Asset Catalogs expose pre-computed spatial and \
                          temporal extents per collection and item; this adapter reads \
                          them straight from the catalog API.",
            website: "https://stacspec.org/",
            supported_identifiers: vec![
                "https://{host}/stac/v1/collections/{id}",
                "https://{host}/collections/{id}",
                "https://{host}/collections/{id}/items/{item}",
            ],
            doi_prefixes: vec![],
            examples: vec![
                "https://earth-search.aws.element84.com/v1/collections/naip",
                "https://api.stac.worldpop.org/collections/CHE",
            ],
            notes: Some("Metadata-only; recognizes the registered STAC API hosts."),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let reference = reference.trim();
        let parsed = match Url::parse(reference) {
            Ok(parsed) => parsed,
            Err(_) => return Ok(false),
        };
        let host = match parsed.host_str() {
            Some(host) => host,
            None => return Ok(false),
        };
        let known_host = KNOWN_STAC_HOSTS.iter().any(|h| h.eq_ignore_ascii_case(host));
        if known_host || stac_path_pattern().is_match(parsed.path()) {
            self.url = Some(String::from(reference));
            return Ok(true);
        }
        Ok(false)
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        let data = self.fetch().await?;
        let mut extent = Extent::new("remote");
        if let Some(bbox) = Self::parse_spatial(&data).filter(|b| b.is_valid_wgs84()) {
            extent.bbox = Some(bbox);
            extent.crs = Some(WGS84_EPSG.to_string());
        }
        extent.tbox = Self::tbox_of(&Self::parse_temporal(&data));
        Ok(if extent.has_extent() { Some(extent) } else { None })
    }

    async fn download(&mut self, target: &Path, _opts: &RemoteOptions) -> Result<()> {
        let data = self.fetch().await?;
        let id = data["id"].as_str().unwrap_or("catalog").to_string();

        let mut content = SidecarContent::new("STAC", id);
        content.title = data["title"]
            .as_str()
            .or_else(|| data["description"].as_str())
            .map(String::from);
        if let Some(bbox) = Self::parse_spatial(&data) {
            content.geometries = vec![SidecarContent::bbox_geometry(
                bbox.min_lat,
                bbox.min_lon,
                bbox.max_lat,
                bbox.max_lon,
            )];
        }
        content.temporal = Self::parse_temporal(&data).and_then(|(start, end)| {
            // intervals may be open-ended (null start or end in JSON)
            let start_date = dates::parse_date(&start)?;
            let end_date = dates::parse_date(&end).unwrap_or(start_date);
            Some((
                start_date.format("%Y-%m-%d").to_string(),
                end_date.format("%Y-%m-%d").to_string(),
            ))
        });
        if sidecar::write_sidecar(target, "stac", &content)?.is_none() {
            log::warn!("STAC resource {} has no extent metadata", self.url()?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_hosts_and_stac_paths_validate() {
        let mut stac = Stac::new().unwrap();
        assert!(tokio_test::block_on(
            stac.validate("https://api.stac.worldpop.org/collections/CHE")
        )
        .unwrap());

        let mut stac = Stac::new().unwrap();
        assert!(tokio_test::block_on(
            stac.validate("https://example.org/geo/collections/sentinel-2")
        )
        .unwrap());

        let mut stac = Stac::new().unwrap();
        assert!(!tokio_test::block_on(stac.validate("https://example.org/about")).unwrap());
        assert!(!tokio_test::block_on(stac.validate("10.5281/zenodo.1")).unwrap());
    }

    #[test]
    fn collection_extent_parsing() {
        let collection = json!({
            "id": "CHE",
            "extent": {
                "spatial": {"bbox": [[5.96, 45.82, 10.49, 47.81]]},
                "temporal": {"interval": [["2020-01-01T00:00:00Z", "2020-12-31T00:00:00Z"]]},
            },
        });
        let bbox = Stac::parse_spatial(&collection).unwrap();
        assert_eq!(bbox, Bbox::new(45.82, 5.96, 47.81, 10.49));
        let temporal = Stac::parse_temporal(&collection).unwrap();
        assert!(temporal.0.starts_with("2020-01-01"));
    }

    #[test]
    fn item_extent_parsing() {
        let item = json!({
            "id": "item-1",
            "bbox": [7.6, 51.9, 7.65, 51.98],
            "properties": {"datetime": "2018-11-14T10:00:00Z"},
        });
        let bbox = Stac::parse_spatial(&item).unwrap();
        assert_eq!(bbox, Bbox::new(51.9, 7.6, 51.98, 7.65));
        assert_eq!(
            Stac::parse_temporal(&item).unwrap().0,
            "2018-11-14T10:00:00Z"
        );
    }
}
