use super::client::{extract_doi, ProviderClient};
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_download::ops::{engine, select};
use geoextent_download::FileDescriptor;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

const API_BASE: &str = "https://dataportal.senckenberg.de/api/3/action";
const DOI_PREFIX: &str = "10.12761";

/// the Senckenberg data portal is a CKAN installation. the `spatial` extra
/// holds a GeoJSON geometry; temporal coverage sits in its own extras.
/// many datasets are metadata-only, so the sidecar path is the default
/// even when resources exist.
pub struct Senckenberg {
    client: ProviderClient,
    dataset_id: Option<String>,
}

fn dataset_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)dataportal\.senckenberg\.de/dataset/([a-z0-9_-]+?)(?:\.jsonld)?/?$")
            .expect("static pattern")
    })
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?i)[a-z0-9][a-z0-9_-]{2,}$").expect("static pattern"))
}

impl Senckenberg {
    pub fn new() -> Result<Senckenberg> {
        Ok(Senckenberg {
            client: ProviderClient::new()?,
            dataset_id: None,
        })
    }

    fn dataset_id(&self) -> Result<&str> {
        self.dataset_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("Senckenberg", "provider not validated"))
    }

    async fn package(&self) -> Result<Value> {
        let url = format!("{}/package_show?id={}", API_BASE, self.dataset_id()?);
        let response = self.client.get_json(&url, "Senckenberg").await?;
        if response["success"].as_bool() != Some(true) {
            return Err(ExtentError::provider(
                "Senckenberg",
                format!("package_show failed for {}", self.dataset_id()?),
            ));
        }
        Ok(response["result"].clone())
    }

    fn extra<'a>(package: &'a Value, key: &str) -> Option<&'a str> {
        package["extras"].as_array()?.iter().find_map(|extra| {
            if extra["key"].as_str() == Some(key) {
                extra["value"].as_str()
            } else {
                None
            }
        })
    }

    fn parse_spatial(package: &Value) -> Option<Value> {
        let spatial = Self::extra(package, "spatial")?;
        serde_json::from_str::<Value>(spatial).ok()
    }

    fn parse_temporal(package: &Value) -> Option<(String, String)> {
        let start = Self::extra(package, "temporal_extent_begin")
            .or_else(|| Self::extra(package, "temporal_start"))?;
        let end = Self::extra(package, "temporal_extent_end")
            .or_else(|| Self::extra(package, "temporal_end"))
            .unwrap_or(start);
        Some((String::from(start), String::from(end)))
    }

    fn resources_of(package: &Value) -> Vec<FileDescriptor> {
        package["resources"]
            .as_array()
            .map(|resources| {
                resources
                    .iter()
                    .filter_map(|resource| {
                        let url = resource["url"].as_str()?;
                        let name = resource["name"]
                            .as_str()
                            .or_else(|| url.rsplit('/').next())?;
                        let size = resource["size"].as_u64().unwrap_or(0);
                        Some(FileDescriptor::new(name, url, size))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for Senckenberg {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Senckenberg",
            description: "The Senckenberg data portal is a CKAN catalog of biodiversity, \
                          climate and geoscience datasets, many of them metadata-only.",
            website: "https://dataportal.senckenberg.de/",
            supported_identifiers: vec![
                "https://dataportal.senckenberg.de/dataset/{dataset_id}",
                "https://doi.org/10.12761/sgn.{year}.{id}",
                "10.12761/sgn.{year}.{id}",
                "{dataset_id}",
            ],
            doi_prefixes: vec!["10.12761"],
            examples: vec![
                "https://doi.org/10.12761/sgn.2018.10268",
                "https://dataportal.senckenberg.de/dataset/as-sahabi-1",
            ],
            notes: Some("CKAN API; extents from the spatial extra."),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let reference = reference.trim();
        if let Some(captures) = dataset_url_pattern().captures(reference) {
            self.dataset_id = Some(captures[1].to_lowercase());
            return Ok(true);
        }
        if extract_doi(reference)
            .map(|doi| doi.starts_with(DOI_PREFIX))
            .unwrap_or(false)
        {
            let url = self.client.resolve_url(reference).await;
            if let Some(captures) = dataset_url_pattern().captures(&url) {
                self.dataset_id = Some(captures[1].to_lowercase());
                return Ok(true);
            }
            return Ok(false);
        }
        // bare dataset slugs are accepted last. portal slugs always carry a
        // separator, which keeps plain tokens (Wikidata Q-numbers, record
        // numbers) out of this adapter
        if slug_pattern().is_match(reference)
            && !reference.contains('/')
            && (reference.contains('-') || reference.contains('_'))
        {
            self.dataset_id = Some(reference.to_lowercase());
            return Ok(true);
        }
        Ok(false)
    }

    async fn metadata_extent(
        &mut self,
        _opts: &RemoteOptions,
    ) -> Result<Option<geoextent_core::model::Extent>> {
        use geoextent_core::model::{Bbox, Extent, Tbox, WGS84_EPSG};
        use geoextent_core::ops::dates;

        let package = self.package().await?;
        let mut extent = Extent::new("remote");
        if let Some(geometry) = Self::parse_spatial(&package) {
            let mut points = vec![];
            collect_coordinates(&geometry["coordinates"], &mut points);
            if let Some(bbox) = Bbox::from_points(points).filter(|b| b.is_valid_wgs84()) {
                extent.bbox = Some(bbox);
                extent.crs = Some(WGS84_EPSG.to_string());
            }
        }
        extent.tbox = Self::parse_temporal(&package)
            .and_then(|(s, e)| Some(Tbox::new(dates::parse_date(&s)?, dates::parse_date(&e)?)));
        Ok(if extent.has_extent() { Some(extent) } else { None })
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        let package = self.package().await?;

        if opts.download_data {
            let files = Self::resources_of(&package);
            if !files.is_empty() {
                let selection = select::select_files(&files, &opts.download);
                let results = engine::download_batch(
                    &self.client.http,
                    &selection.selected,
                    target,
                    &opts.download,
                )
                .await?;
                if results.iter().any(|r| r.success()) {
                    return Ok(());
                }
                log::warn!(
                    "Senckenberg resource downloads failed, falling back to metadata sidecar"
                );
            }
        }

        let mut content = SidecarContent::new("Senckenberg", self.dataset_id()?.to_string());
        content.title = package["title"].as_str().map(String::from);
        if let Some(geometry) = Self::parse_spatial(&package) {
            content.geometries = vec![geometry];
        }
        content.temporal = Self::parse_temporal(&package);
        if sidecar::write_sidecar(target, "senckenberg", &content)?.is_none() {
            log::warn!(
                "Senckenberg dataset {} has no spatial or temporal metadata",
                self.dataset_id()?
            );
        }
        Ok(())
    }
}

fn collect_coordinates(value: &Value, points: &mut Vec<(f64, f64)>) {
    if let Some(items) = value.as_array() {
        if items.len() >= 2 && items[0].is_number() && items[1].is_number() {
            if let (Some(lon), Some(lat)) = (items[0].as_f64(), items[1].as_f64()) {
                points.push((lon, lat));
            }
        } else {
            for item in items {
                collect_coordinates(item, points);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dataset_urls_and_slugs_validate() {
        let mut senckenberg = Senckenberg::new().unwrap();
        assert!(tokio_test::block_on(
            senckenberg.validate("https://dataportal.senckenberg.de/dataset/as-sahabi-1")
        )
        .unwrap());
        assert_eq!(senckenberg.dataset_id.as_deref(), Some("as-sahabi-1"));

        let mut senckenberg = Senckenberg::new().unwrap();
        assert!(tokio_test::block_on(senckenberg.validate("as-sahabi-1")).unwrap());

        let mut senckenberg = Senckenberg::new().unwrap();
        assert!(!tokio_test::block_on(senckenberg.validate("10.5281/zenodo.1")).unwrap());
    }

    #[test]
    fn extras_carry_spatial_and_temporal() {
        let package = json!({
            "title": "fossil site",
            "extras": [
                {"key": "spatial", "value": "{\"type\": \"Point\", \"coordinates\": [20.5, 30.1]}"},
                {"key": "temporal_extent_begin", "value": "1970-01-01"},
                {"key": "temporal_extent_end", "value": "1980-12-31"},
            ],
        });
        let geometry = Senckenberg::parse_spatial(&package).unwrap();
        assert_eq!(geometry["type"], "Point");
        assert_eq!(
            Senckenberg::parse_temporal(&package),
            Some((String::from("1970-01-01"), String::from("1980-12-31")))
        );
    }
}
