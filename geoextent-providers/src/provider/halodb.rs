use super::client::ProviderClient;
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::ops::dates;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

const BASE_URL: &str = "https://halo-db.pa.op.dlr.de";

/// HALO-DB archives observation data of DLR's HALO research aircraft.
/// datasets carry no DOIs; the GeoJSON search endpoint returns flight
/// track geometry, and the dataset HTML page is scraped as a last resort
/// for mission dates.
pub struct HaloDb {
    client: ProviderClient,
    dataset_id: Option<String>,
}

fn dataset_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)https?://halo-db\.pa\.op\.dlr\.de/dataset/(\d+)").expect("static pattern")
    })
}

/// mission date spans in the dataset page, e.g. "2014-08-21 - 2014-09-30"
fn html_date_span_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{4}-\d{2}-\d{2})\s*(?:-|to|until|&ndash;)\s*(\d{4}-\d{2}-\d{2})")
            .expect("static pattern")
    })
}

fn single_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("static pattern"))
}

impl HaloDb {
    pub fn new() -> Result<HaloDb> {
        Ok(HaloDb {
            client: ProviderClient::new()?,
            dataset_id: None,
        })
    }

    fn dataset_id(&self) -> Result<&str> {
        self.dataset_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("HALO-DB", "provider not validated"))
    }

    /// the search endpoint returns a FeatureCollection; the matching
    /// feature is the one whose link property points at this dataset.
    async fn search_feature(&self) -> Result<Option<Value>> {
        let id = self.dataset_id()?;
        let url = format!("{}/search?texts={}&format=geojson", BASE_URL, id);
        let collection = self.client.get_json(&url, "HALO-DB").await?;
        let dataset_url = format!("{}/dataset/{}", BASE_URL, id);

        if let Some(features) = collection["features"].as_array() {
            for feature in features {
                if feature["properties"]["link"].as_str() == Some(dataset_url.as_str()) {
                    return Ok(Some(feature.clone()));
                }
            }
        }
        Ok(None)
    }

    fn temporal_from_feature(feature: &Value) -> Option<(String, String)> {
        let properties = &feature["properties"];
        let start = properties["start"]
            .as_str()
            .or_else(|| properties["date_start"].as_str())?;
        let end = properties["end"]
            .as_str()
            .or_else(|| properties["date_end"].as_str())
            .unwrap_or(start);
        Some((String::from(start), String::from(end)))
    }

    /// last-resort fallback: scan the dataset page markup for a date span.
    async fn temporal_from_html(&self) -> Result<Option<(String, String)>> {
        let url = format!("{}/dataset/{}", BASE_URL, self.dataset_id()?);
        let html = self.client.get_text(&url, "HALO-DB").await?;

        if let Some(captures) = html_date_span_pattern().captures(&html) {
            return Ok(Some((String::from(&captures[1]), String::from(&captures[2]))));
        }
        let found: Vec<&str> = single_date_pattern()
            .find_iter(&html)
            .map(|m| m.as_str())
            .collect();
        let parsed: Vec<_> = found.iter().filter_map(|d| dates::parse_date(d)).collect();
        match (parsed.iter().min(), parsed.iter().max()) {
            (Some(min), Some(max)) => Ok(Some((
                min.format("%Y-%m-%d").to_string(),
                max.format("%Y-%m-%d").to_string(),
            ))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Provider for HaloDb {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "HALO-DB",
            description: "HALO-DB is DLR's archive for observation data of the HALO \
                          research aircraft, spanning more than a hundred missions.",
            website: "https://halo-db.pa.op.dlr.de/",
            supported_identifiers: vec!["https://halo-db.pa.op.dlr.de/dataset/{id}"],
            doi_prefixes: vec![],
            examples: vec!["https://halo-db.pa.op.dlr.de/dataset/6339"],
            notes: Some(
                "No DOIs; flight track geometry from the GeoJSON search endpoint, \
                 mission dates scraped from the dataset page as fallback.",
            ),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        if let Some(captures) = dataset_url_pattern().captures(reference.trim()) {
            self.dataset_id = Some(String::from(&captures[1]));
            return Ok(true);
        }
        Ok(false)
    }

    async fn download(&mut self, target: &Path, _opts: &RemoteOptions) -> Result<()> {
        let feature = self.search_feature().await?;

        let mut content = SidecarContent::new("HALO-DB", self.dataset_id()?.to_string());
        if let Some(feature) = &feature {
            content.title = feature["properties"]["title"].as_str().map(String::from);
            if !feature["geometry"].is_null() {
                content.geometries = vec![feature["geometry"].clone()];
            }
            content.temporal = Self::temporal_from_feature(feature);
        }
        if content.temporal.is_none() {
            content.temporal = self.temporal_from_html().await.unwrap_or_else(|e| {
                log::debug!("HALO-DB: HTML fallback failed: {}", e);
                None
            });
        }

        if sidecar::write_sidecar(target, "halodb", &content)?.is_none() {
            log::warn!(
                "HALO-DB dataset {} has no extractable extent metadata",
                self.dataset_id()?
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_dataset_urls_validate() {
        let mut halo = HaloDb::new().unwrap();
        assert!(tokio_test::block_on(
            halo.validate("https://halo-db.pa.op.dlr.de/dataset/6339")
        )
        .unwrap());
        assert_eq!(halo.dataset_id.as_deref(), Some("6339"));

        let mut halo = HaloDb::new().unwrap();
        assert!(!tokio_test::block_on(halo.validate("6339")).unwrap());
    }

    #[test]
    fn temporal_from_feature_properties() {
        let feature = json!({
            "properties": {"start": "2014-08-21", "end": "2014-09-30"},
        });
        assert_eq!(
            HaloDb::temporal_from_feature(&feature),
            Some((String::from("2014-08-21"), String::from("2014-09-30")))
        );
    }

    #[test]
    fn html_span_pattern_matches_common_markup() {
        let html = "<td>Mission period</td><td>2014-08-21 - 2014-09-30</td>";
        let captures = html_date_span_pattern().captures(html).unwrap();
        assert_eq!(&captures[1], "2014-08-21");
        assert_eq!(&captures[2], "2014-09-30");
    }
}
