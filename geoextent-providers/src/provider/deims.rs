use super::client::{doi_pattern, ProviderClient};
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::follow;
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geo::BoundingRect;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, Followed, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use wkt::TryFromWkt;

const API_BASE: &str = "https://deims.org/api";

/// DEIMS-SDR is a metadata registry for long-term ecological research
/// sites and datasets. it hosts no data itself: datasets reference
/// external repositories, which this adapter follows when allowed.
pub struct DeimsSdr {
    client: ProviderClient,
    resource_type: ResourceType,
    resource_uuid: Option<String>,
    followed: Option<Followed>,
    metadata_tbox: Option<Tbox>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResourceType {
    Dataset,
    Site,
}

const UUID: &str = "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}";

fn dataset_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"(?i)https?://deims\.org/(?:api/)?datasets?/({})", UUID))
            .expect("static pattern")
    })
}

fn site_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)https?://deims\.org/(?:(?:api/)?sites?/)?({})$",
            UUID
        ))
        .expect("static pattern")
    })
}

impl DeimsSdr {
    pub fn new() -> Result<DeimsSdr> {
        Ok(DeimsSdr {
            client: ProviderClient::new()?,
            resource_type: ResourceType::Site,
            resource_uuid: None,
            followed: None,
            metadata_tbox: None,
        })
    }

    fn resource_uuid(&self) -> Result<&str> {
        self.resource_uuid
            .as_deref()
            .ok_or_else(|| ExtentError::provider("DEIMS-SDR", "provider not validated"))
    }

    async fn fetch_metadata(&self) -> Result<Value> {
        let endpoint = match self.resource_type {
            ResourceType::Dataset => "datasets",
            ResourceType::Site => "sites",
        };
        let url = format!("{}/{}/{}", API_BASE, endpoint, self.resource_uuid()?);
        self.client.get_json(&url, "DEIMS-SDR").await
    }

    /// WKT boundaries (datasets carry a list, sites a flat object; sites
    /// may only have a centroid in `coordinates`).
    fn parse_geometries(data: &Value) -> Vec<Value> {
        let geographic = &data["attributes"]["geographic"];
        let entries: Vec<&Value> = match geographic {
            Value::Array(list) => list.iter().collect(),
            Value::Object(_) => vec![geographic],
            _ => return vec![],
        };

        let mut geometries = vec![];
        for entry in entries {
            let wkt = entry["boundaries"]
                .as_str()
                .or_else(|| entry["coordinates"].as_str());
            let wkt = match wkt {
                Some(wkt) if !wkt.trim().is_empty() => wkt,
                _ => continue,
            };
            match geo_types::Geometry::<f64>::try_from_wkt_str(wkt) {
                Ok(geometry) => {
                    let converted = geojson::Geometry::new(geojson::Value::from(&geometry));
                    if let Ok(value) = serde_json::to_value(converted) {
                        geometries.push(value);
                    }
                }
                Err(_) => log::warn!("failed to parse WKT boundary: {:.100}", wkt),
            }
        }
        geometries
    }

    fn parse_temporal(data: &Value) -> Option<(String, String)> {
        let range = &data["attributes"]["general"]["dateRange"];
        let start = range["from"].as_str()?;
        // an open range (ongoing collection) collapses to the start date
        let end = range["to"].as_str().unwrap_or(start);
        Some((String::from(start), String::from(end)))
    }

    /// followable references from onlineDistribution: the doi field plus
    /// any onlineLocation URLs, deduplicated in order.
    fn external_references(data: &Value) -> Vec<String> {
        let mut references = vec![];
        let distribution = &data["attributes"]["onlineDistribution"];

        if let Some(doi) = distribution["doi"].as_str() {
            let doi = doi.trim();
            if doi_pattern().is_match(doi) || doi.starts_with("https://") {
                references.push(String::from(doi));
            }
        }
        if let Some(locations) = distribution["onlineLocation"].as_array() {
            for location in locations {
                let url = location["url"]["value"]
                    .as_str()
                    .or_else(|| location["url"].as_str());
                if let Some(url) = url {
                    let url = url.trim();
                    if (doi_pattern().is_match(url) || url.starts_with("https://"))
                        && !references.iter().any(|r| r == url)
                    {
                        references.push(String::from(url));
                    }
                }
            }
        }
        references
    }

    fn write_own_sidecar(&self, data: &Value, target: &Path) -> Result<()> {
        let mut content = SidecarContent::new("DEIMS-SDR", self.resource_uuid()?.to_string());
        content.title = data["title"].as_str().map(String::from);
        content.geometries = Self::parse_geometries(data);
        content.temporal = Self::parse_temporal(data);
        if sidecar::write_sidecar(target, "deims", &content)?.is_none() {
            log::warn!(
                "no geographic data found for DEIMS-SDR resource {}",
                self.resource_uuid()?
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for DeimsSdr {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "DEIMS-SDR",
            description: "DEIMS-SDR is the site and dataset registry for long-term \
                          ecological research, powered by eLTER, with WKT boundaries \
                          and temporal ranges in its REST API.",
            website: "https://deims.org/",
            supported_identifiers: vec![
                "https://deims.org/dataset/{uuid}",
                "https://deims.org/{uuid}",
                "https://deims.org/api/datasets/{uuid}",
                "https://deims.org/api/sites/{uuid}",
            ],
            doi_prefixes: vec![],
            examples: vec![
                "https://deims.org/dataset/3d87da8b-2b07-41c7-bf05-417832de4fa2",
                "https://deims.org/8eda49e9-1f4e-4f3e-b58e-e0bb25dc32a6",
            ],
            notes: Some(
                "Metadata-only registry; dataset records may reference external \
                 repositories, which are followed when enabled.",
            ),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let reference = reference.trim();
        if let Some(captures) = dataset_url_pattern().captures(reference) {
            self.resource_type = ResourceType::Dataset;
            self.resource_uuid = Some(captures[1].to_lowercase());
            return Ok(true);
        }
        if let Some(captures) = site_url_pattern().captures(reference) {
            self.resource_type = ResourceType::Site;
            self.resource_uuid = Some(captures[1].to_lowercase());
            return Ok(true);
        }
        Ok(false)
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        let data = self.fetch_metadata().await?;
        let geometries = Self::parse_geometries(&data);

        let mut extent = Extent::new("remote");
        let mut points: Vec<(f64, f64)> = vec![];
        for geometry in &geometries {
            if let Ok(parsed) = serde_json::from_value::<geojson::Geometry>(geometry.clone()) {
                if let Ok(geom) = geo_types::Geometry::<f64>::try_from(parsed) {
                    if let Some(rect) = geom.bounding_rect() {
                        points.push((rect.min().x, rect.min().y));
                        points.push((rect.max().x, rect.max().y));
                    }
                }
            }
        }
        if let Some(bbox) = Bbox::from_points(points) {
            if bbox.is_valid_wgs84() {
                extent.bbox = Some(bbox);
                extent.crs = Some(WGS84_EPSG.to_string());
            }
        }
        extent.tbox = Self::parse_temporal(&data)
            .and_then(|(s, e)| Some(Tbox::new(dates::parse_date(&s)?, dates::parse_date(&e)?)));
        self.metadata_tbox = extent.tbox;
        Ok(if extent.has_extent() { Some(extent) } else { None })
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        let data = self.fetch_metadata().await?;
        self.metadata_tbox = Self::parse_temporal(&data)
            .and_then(|(s, e)| Some(Tbox::new(dates::parse_date(&s)?, dates::parse_date(&e)?)));

        if opts.follow && opts.download_data && self.resource_type == ResourceType::Dataset {
            let references = Self::external_references(&data);
            if references.is_empty() {
                log::debug!("DEIMS-SDR: no external references found in metadata");
            } else if let Some(followed) =
                follow::try_follow(&references, "DEIMS-SDR", target, opts).await
            {
                self.followed = Some(followed);
                return Ok(());
            } else {
                log::info!(
                    "DEIMS-SDR: no external references could be followed, using own metadata"
                );
            }
        } else if !opts.follow {
            log::info!("DEIMS-SDR: follow disabled, using own metadata");
        }

        self.write_own_sidecar(&data, target)
    }

    fn followed(&self) -> Option<Followed> {
        self.followed.clone()
    }

    fn metadata_tbox(&self) -> Option<Tbox> {
        self.metadata_tbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_forms_set_resource_type() {
        let mut deims = DeimsSdr::new().unwrap();
        assert!(tokio_test::block_on(deims.validate(
            "https://deims.org/dataset/3d87da8b-2b07-41c7-bf05-417832de4fa2"
        ))
        .unwrap());
        assert_eq!(deims.resource_type, ResourceType::Dataset);

        let mut deims = DeimsSdr::new().unwrap();
        assert!(tokio_test::block_on(
            deims.validate("https://deims.org/8eda49e9-1f4e-4f3e-b58e-e0bb25dc32a6")
        )
        .unwrap());
        assert_eq!(deims.resource_type, ResourceType::Site);

        let mut deims = DeimsSdr::new().unwrap();
        assert!(!tokio_test::block_on(deims.validate("https://deims.org/about")).unwrap());
    }

    #[test]
    fn geometries_from_dataset_and_site_shapes() {
        let dataset = json!({
            "attributes": {"geographic": [
                {"boundaries": "POLYGON((7.6 51.9, 7.65 51.9, 7.65 51.98, 7.6 51.9))"},
            ]},
        });
        assert_eq!(DeimsSdr::parse_geometries(&dataset).len(), 1);

        let site = json!({
            "attributes": {"geographic": {"coordinates": "POINT(14.1 47.8)"}},
        });
        let geometries = DeimsSdr::parse_geometries(&site);
        assert_eq!(geometries.len(), 1);
        assert_eq!(geometries[0]["type"], "Point");
    }

    #[test]
    fn temporal_open_range_collapses() {
        let data = json!({
            "attributes": {"general": {"dateRange": {"from": "2014-08-21", "to": null}}},
        });
        assert_eq!(
            DeimsSdr::parse_temporal(&data),
            Some((String::from("2014-08-21"), String::from("2014-08-21")))
        );
    }

    #[test]
    fn external_references_are_filtered_and_deduplicated() {
        let data = json!({
            "attributes": {"onlineDistribution": {
                "doi": "https://doi.org/10.5281/zenodo.820562",
                "onlineLocation": [
                    {"url": {"value": "https://doi.org/10.5281/zenodo.820562"}},
                    {"url": {"value": "https://example.org/data.zip"}},
                    {"url": {"value": "not a url"}},
                ],
            }},
        });
        let references = DeimsSdr::external_references(&data);
        assert_eq!(
            references,
            vec![
                String::from("https://doi.org/10.5281/zenodo.820562"),
                String::from("https://example.org/data.zip"),
            ]
        );
    }
}
