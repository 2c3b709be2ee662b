use super::client::ProviderClient;
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

const API_BASE: &str = "https://data.mendeley.com/public-api/datasets/";

/// the public Mendeley Data API ignores version pins for file listings and
/// always reports the latest published version.
pub struct MendeleyData {
    client: ProviderClient,
    record_id: Option<String>,
    version: Option<String>,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:data\.mendeley\.com/datasets/|10\.17632/)([a-z0-9]+)(?:[./](\d+))?")
            .expect("static pattern")
    })
}

impl MendeleyData {
    pub fn new() -> Result<MendeleyData> {
        Ok(MendeleyData {
            client: ProviderClient::new()?,
            record_id: None,
            version: None,
        })
    }

    async fn metadata(&self) -> Result<Value> {
        let id = self
            .record_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("Mendeley Data", "provider not validated"))?;
        self.client
            .get_json(&format!("{}{}", API_BASE, id), "Mendeley Data")
            .await
            .map_err(|e| match e {
                ExtentError::AccessDenied { .. } => e,
                other => ExtentError::provider(
                    "Mendeley Data",
                    format!("dataset {} does not exist or is not accessible: {}", id, other),
                ),
            })
    }

    fn files_of(record: &Value) -> Vec<FileDescriptor> {
        record["files"]
            .as_array()
            .map(|files| {
                files
                    .iter()
                    .filter_map(|file| {
                        let name = file["filename"].as_str().unwrap_or("unknown");
                        let content = &file["content_details"];
                        let url = content["download_url"].as_str()?;
                        let size = content["size"].as_u64().unwrap_or(0);
                        Some(FileDescriptor::new(name, url, size))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MendeleyData {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Mendeley Data",
            description: "Mendeley Data is Elsevier's cloud repository where researchers \
                          store, share and publish datasets with assigned DOIs.",
            website: "https://data.mendeley.com/",
            supported_identifiers: vec![
                "https://data.mendeley.com/datasets/{dataset_id}",
                "https://doi.org/10.17632/{dataset_id}",
                "10.17632/{dataset_id}",
            ],
            doi_prefixes: vec!["10.17632"],
            examples: vec![
                "https://data.mendeley.com/datasets/8h9295v4t3",
                "10.17632/8h9295v4t3.2",
            ],
            notes: Some("The public API always serves the latest dataset version."),
        }
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        if let Some(captures) = identifier_pattern().captures(reference) {
            self.record_id = Some(String::from(&captures[1]));
            self.version = captures.get(2).map(|v| String::from(v.as_str()));
            return Ok(true);
        }
        let url = self.client.resolve_url(reference).await;
        if let Some(captures) = identifier_pattern().captures(&url) {
            self.record_id = Some(String::from(&captures[1]));
            self.version = captures.get(2).map(|v| String::from(v.as_str()));
            return Ok(true);
        }
        Ok(false)
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if !opts.download_data {
            log::warn!(
                "Mendeley Data carries no geospatial metadata; without downloading \
                 data there is nothing to extract"
            );
            return Ok(());
        }
        let record = self.metadata().await?;
        let files = Self::files_of(&record);
        if files.is_empty() {
            log::warn!(
                "no files found in Mendeley Data dataset {}",
                self.record_id.as_deref().unwrap_or("?")
            );
            return Ok(());
        }
        let selection = select::select_files(&files, &opts.download);
        if selection.selected.is_empty() {
            log::warn!("no files can be downloaded within the size limit");
            return Ok(());
        }
        engine::download_batch(&self.client.http, &selection.selected, target, &opts.download)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_patterns_capture_id_and_version() {
        let captures = identifier_pattern().captures("10.17632/8h9295v4t3.2").unwrap();
        assert_eq!(&captures[1], "8h9295v4t3");
        assert_eq!(captures.get(2).unwrap().as_str(), "2");

        let captures = identifier_pattern()
            .captures("https://data.mendeley.com/datasets/8h9295v4t3/1")
            .unwrap();
        assert_eq!(&captures[1], "8h9295v4t3");

        assert!(identifier_pattern().captures("10.5281/zenodo.1").is_none());
    }

    #[test]
    fn file_listing_reads_content_details() {
        let record = serde_json::json!({
            "files": [
                {
                    "filename": "galicia.zip",
                    "content_details": {"download_url": "https://md.example/1", "size": 1887437},
                },
                {"filename": "no_content"},
            ],
        });
        let files = MendeleyData::files_of(&record);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 1887437);
    }
}
