use super::client::ProviderClient;
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use geoextent_download::ops::{engine, select};
use geoextent_download::FileDescriptor;
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::OnceLock;

const API_BASE: &str = "https://data.4tu.nl/v2/articles/";

/// 4TU.ResearchData runs on the Figshare platform but stores geolocation
/// and time coverage in custom_fields, which makes metadata extraction
/// possible.
pub struct FourTu {
    client: ProviderClient,
    record_id: Option<String>,
    record: Option<Value>,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // uuid datasets, numeric articles, or the DOI suffix
        Regex::new(
            r"(?i)(?:data\.4tu\.nl/(?:datasets|articles)/|10\.4121/)([0-9a-f-]{8,}[0-9a-f-]*|\d+)",
        )
        .expect("static pattern")
    })
}

impl FourTu {
    pub fn new() -> Result<FourTu> {
        Ok(FourTu {
            client: ProviderClient::new()?,
            record_id: None,
            record: None,
        })
    }

    async fn metadata(&mut self) -> Result<Value> {
        if let Some(record) = &self.record {
            return Ok(record.clone());
        }
        let id = self
            .record_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("4TU.ResearchData", "provider not validated"))?;
        let record = self
            .client
            .get_json(&format!("{}{}", API_BASE, id), "4TU.ResearchData")
            .await?;
        self.record = Some(record.clone());
        Ok(record)
    }

    /// "Geolocation Latitude"/"Geolocation Longitude" point plus a
    /// "Time coverage" field of the form "2025-05-21 to 2025-06-17".
    fn parse_custom_fields(record: &Value) -> (Option<(f64, f64)>, Option<(String, String)>) {
        let mut lat = None;
        let mut lon = None;
        let mut coverage = None;
        if let Some(fields) = record["custom_fields"].as_array() {
            for field in fields {
                let value = field["value"].as_str().unwrap_or("");
                match field["name"].as_str().unwrap_or("") {
                    "Geolocation Latitude" => lat = value.trim().parse::<f64>().ok(),
                    "Geolocation Longitude" => lon = value.trim().parse::<f64>().ok(),
                    "Time coverage" => coverage = Some(String::from(value)),
                    _ => {}
                }
            }
        }
        let point = match (lat, lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };
        let temporal = coverage.as_deref().and_then(parse_time_coverage);
        (point, temporal)
    }

    fn files_of(record: &Value) -> Vec<FileDescriptor> {
        record["files"]
            .as_array()
            .map(|files| {
                files
                    .iter()
                    .filter_map(|file| {
                        let url = file["download_url"].as_str()?;
                        let name = file["name"].as_str()?;
                        let size = file["size"].as_u64().unwrap_or(0);
                        Some(FileDescriptor::new(name, url, size))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn parse_time_coverage(coverage: &str) -> Option<(String, String)> {
    let coverage = coverage.trim();
    if coverage.is_empty() {
        return None;
    }
    match coverage.split_once(" to ") {
        Some((start, end)) => Some((String::from(start.trim()), String::from(end.trim()))),
        None => Some((String::from(coverage), String::from(coverage))),
    }
}

#[async_trait]
impl Provider for FourTu {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "4TU.ResearchData",
            description: "4TU.ResearchData is the Dutch national repository for science, \
                          engineering and design, hosted by the 4TU federation.",
            website: "https://data.4tu.nl/",
            supported_identifiers: vec![
                "https://data.4tu.nl/datasets/{uuid}/{version}",
                "https://data.4tu.nl/articles/{article_id}",
                "https://doi.org/10.4121/{dataset_id}",
                "10.4121/{dataset_id}",
            ],
            doi_prefixes: vec!["10.4121"],
            examples: vec![
                "https://data.4tu.nl/datasets/3035126d-ee51-4dbd-a187-5f6b0be85e9f/1",
                "10.4121/3035126d-ee51-4dbd-a187-5f6b0be85e9f",
            ],
            notes: Some(
                "Figshare-based platform; geolocation from custom_fields, temporal \
                 coverage from a 'Time coverage' field.",
            ),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        if let Some(captures) = identifier_pattern().captures(reference) {
            self.record_id = Some(String::from(&captures[1]));
            return Ok(true);
        }
        let url = self.client.resolve_url(reference).await;
        if let Some(captures) = identifier_pattern().captures(&url) {
            self.record_id = Some(String::from(&captures[1]));
            return Ok(true);
        }
        Ok(false)
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        let record = self.metadata().await?;
        let (point, temporal) = Self::parse_custom_fields(&record);

        let mut extent = Extent::new("remote");
        if let Some((lat, lon)) = point {
            let bbox = Bbox::point(lat, lon);
            if bbox.is_valid_wgs84() {
                extent.bbox = Some(bbox);
                extent.crs = Some(WGS84_EPSG.to_string());
            }
        }
        extent.tbox = temporal
            .as_ref()
            .and_then(|(s, e)| Some(Tbox::new(dates::parse_date(s)?, dates::parse_date(e)?)));
        if extent.tbox.is_none() {
            if let Some(published) = record["published_date"].as_str() {
                extent.tbox = dates::parse_date(published).map(Tbox::instant);
            }
        }

        Ok(if extent.has_extent() { Some(extent) } else { None })
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        let record = self.metadata().await?;
        if !opts.download_data {
            let (point, temporal) = Self::parse_custom_fields(&record);
            let mut content = SidecarContent::new(
                "4TU.ResearchData",
                self.record_id.clone().unwrap_or_default(),
            );
            content.title = record["title"].as_str().map(String::from);
            if let Some((lat, lon)) = point {
                content.geometries = vec![json!({
                    "type": "Point",
                    "coordinates": [lon, lat],
                })];
            }
            content.temporal = temporal;
            sidecar::write_sidecar(target, "fourtu", &content)?;
            return Ok(());
        }

        let files = Self::files_of(&record);
        if files.is_empty() {
            log::warn!(
                "no files found in 4TU.ResearchData item {}",
                self.record_id.as_deref().unwrap_or("?")
            );
            return Ok(());
        }
        let selection = select::select_files(&files, &opts.download);
        engine::download_batch(&self.client.http, &selection.selected, target, &opts.download)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_patterns_cover_uuid_and_doi() {
        let captures = identifier_pattern()
            .captures("10.4121/3035126d-ee51-4dbd-a187-5f6b0be85e9f")
            .unwrap();
        assert_eq!(&captures[1], "3035126d-ee51-4dbd-a187-5f6b0be85e9f");

        let captures = identifier_pattern()
            .captures("https://data.4tu.nl/datasets/3035126d-ee51-4dbd-a187-5f6b0be85e9f/1")
            .unwrap();
        assert_eq!(&captures[1], "3035126d-ee51-4dbd-a187-5f6b0be85e9f");
    }

    #[test]
    fn custom_fields_point_and_coverage() {
        let record = serde_json::json!({
            "custom_fields": [
                {"name": "Geolocation Latitude", "value": "51.050407"},
                {"name": "Geolocation Longitude", "value": "13.737262"},
                {"name": "Time coverage", "value": "2025-05-21 to 2025-06-17"},
            ],
        });
        let (point, temporal) = FourTu::parse_custom_fields(&record);
        assert_eq!(point, Some((51.050407, 13.737262)));
        assert_eq!(
            temporal,
            Some((String::from("2025-05-21"), String::from("2025-06-17")))
        );
    }

    #[test]
    fn time_coverage_single_value() {
        assert_eq!(
            parse_time_coverage("2020-01-01"),
            Some((String::from("2020-01-01"), String::from("2020-01-01")))
        );
        assert_eq!(parse_time_coverage("  "), None);
    }
}
