use super::client::{extract_doi, ProviderClient};
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use geoextent_download::ops::engine;
use geoextent_download::FileDescriptor;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

const DOI_PREFIX: &str = "10.1594/pangaea";

/// PANGAEA publishes rich JSON-LD per dataset, with a spatial coverage box
/// and temporal coverage, so extents are available without touching the
/// data; the data itself is one tab-delimited text file per dataset.
pub struct Pangaea {
    client: ProviderClient,
    dataset_id: Option<String>,
}

fn dataset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)10\.1594/PANGAEA\.(\d+)").expect("static pattern")
    })
}

impl Pangaea {
    pub fn new() -> Result<Pangaea> {
        Ok(Pangaea {
            client: ProviderClient::new()?,
            dataset_id: None,
        })
    }

    fn dataset_id(&self) -> Result<&str> {
        self.dataset_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("PANGAEA", "provider not validated"))
    }

    fn landing_url(&self) -> Result<String> {
        Ok(format!(
            "https://doi.pangaea.de/10.1594/PANGAEA.{}",
            self.dataset_id()?
        ))
    }

    async fn jsonld(&self) -> Result<Value> {
        let url = format!("{}?format=metadata_jsonld", self.landing_url()?);
        self.client.get_json(&url, "PANGAEA").await
    }

    /// schema.org spatialCoverage geo shape: a GeoShape box "minLat minLon
    /// maxLat maxLon", or a GeoCoordinates point.
    fn parse_spatial(jsonld: &Value) -> Option<Bbox> {
        let geo = &jsonld["spatialCoverage"]["geo"];
        if let Some(box_str) = geo["box"].as_str() {
            let values: Vec<f64> = box_str
                .split_whitespace()
                .filter_map(|v| v.parse().ok())
                .collect();
            if values.len() == 4 {
                return Some(Bbox::new(values[0], values[1], values[2], values[3]));
            }
        }
        let lat = geo["latitude"].as_f64()?;
        let lon = geo["longitude"].as_f64()?;
        Some(Bbox::point(lat, lon))
    }

    /// temporalCoverage "start/end" or a single date.
    fn parse_temporal(jsonld: &Value) -> Option<Tbox> {
        let coverage = jsonld["temporalCoverage"].as_str()?;
        let (start, end) = match coverage.split_once('/') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (coverage.trim(), coverage.trim()),
        };
        Some(Tbox::new(
            dates::parse_date(start)?,
            dates::parse_date(end)?,
        ))
    }
}

#[async_trait]
impl Provider for Pangaea {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "PANGAEA",
            description: "PANGAEA is the digital data library for earth system science \
                          hosted by AWI and MARUM, publishing georeferenced datasets \
                          under DOIs.",
            website: "https://www.pangaea.de/",
            supported_identifiers: vec![
                "https://doi.pangaea.de/10.1594/PANGAEA.{dataset_id}",
                "https://doi.org/10.1594/PANGAEA.{dataset_id}",
                "10.1594/PANGAEA.{dataset_id}",
            ],
            doi_prefixes: vec!["10.1594/PANGAEA"],
            examples: vec![
                "https://doi.org/10.1594/PANGAEA.734969",
                "https://doi.pangaea.de/10.1594/PANGAEA.858767",
            ],
            notes: Some("Extents come from the dataset's JSON-LD metadata."),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        if let Some(captures) = dataset_pattern().captures(reference) {
            self.dataset_id = Some(String::from(&captures[1]));
            return Ok(true);
        }
        if extract_doi(reference)
            .map(|doi| doi.to_lowercase().starts_with(DOI_PREFIX))
            .unwrap_or(false)
        {
            // a pangaea DOI in an unexpected shape; resolve and re-check
            let url = self.client.resolve_url(reference).await;
            if let Some(captures) = dataset_pattern().captures(&url) {
                self.dataset_id = Some(String::from(&captures[1]));
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        let jsonld = self.jsonld().await?;
        let mut extent = Extent::new("remote");
        if let Some(bbox) = Self::parse_spatial(&jsonld) {
            if bbox.is_valid_wgs84() {
                extent.bbox = Some(bbox);
                extent.crs = Some(WGS84_EPSG.to_string());
            }
        }
        extent.tbox = Self::parse_temporal(&jsonld);
        Ok(if extent.has_extent() { Some(extent) } else { None })
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if opts.download_data {
            // one tab-delimited data file per dataset
            let file = FileDescriptor::new(
                format!("pangaea_{}.txt", self.dataset_id()?),
                format!("{}?format=textfile", self.landing_url()?),
                0,
            );
            let results =
                engine::download_batch(&self.client.http, &[file], target, &opts.download).await?;
            if results.iter().any(|r| r.success()) {
                return Ok(());
            }
            log::warn!("PANGAEA data download failed, falling back to metadata sidecar");
        }

        let jsonld = self.jsonld().await?;
        let mut content = SidecarContent::new("PANGAEA", self.dataset_id()?.to_string());
        content.title = jsonld["name"].as_str().map(String::from);
        if let Some(bbox) = Self::parse_spatial(&jsonld) {
            content.geometries = vec![SidecarContent::bbox_geometry(
                bbox.min_lat,
                bbox.min_lon,
                bbox.max_lat,
                bbox.max_lon,
            )];
        }
        content.temporal = Self::parse_temporal(&jsonld).map(|t| {
            let [start, end] = t.to_pair();
            (start, end)
        });
        sidecar::write_sidecar(target, "pangaea", &content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dataset_ids_from_all_doi_forms() {
        for reference in [
            "10.1594/PANGAEA.734969",
            "https://doi.org/10.1594/PANGAEA.734969",
            "https://doi.pangaea.de/10.1594/PANGAEA.734969",
        ] {
            let captures = dataset_pattern().captures(reference).unwrap();
            assert_eq!(&captures[1], "734969");
        }
    }

    #[test]
    fn spatial_box_parsing() {
        let jsonld = json!({
            "spatialCoverage": {"geo": {"box": "-65.5 -68.0 -64.9 -67.1"}},
        });
        let bbox = Pangaea::parse_spatial(&jsonld).unwrap();
        assert_eq!(bbox, Bbox::new(-65.5, -68.0, -64.9, -67.1));

        let point = json!({
            "spatialCoverage": {"geo": {"latitude": 54.2, "longitude": 7.9}},
        });
        assert_eq!(Pangaea::parse_spatial(&point).unwrap(), Bbox::point(54.2, 7.9));
    }

    #[test]
    fn temporal_coverage_ranges() {
        let jsonld = json!({"temporalCoverage": "2014-08-21/2020-09-30"});
        let tbox = Pangaea::parse_temporal(&jsonld).unwrap();
        assert_eq!(tbox.to_pair(), ["2014-08-21", "2020-09-30"]);

        let single = json!({"temporalCoverage": "2014-08-21"});
        assert_eq!(
            Pangaea::parse_temporal(&single).unwrap().to_pair(),
            ["2014-08-21", "2014-08-21"]
        );
    }
}
