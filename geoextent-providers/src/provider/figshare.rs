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

const API_BASE: &str = "https://api.figshare.com/v2/articles/";

pub struct Figshare {
    client: ProviderClient,
    article_id: Option<String>,
}

fn article_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // matches article URLs and the DOI suffix m9.figshare.<id>[.v<n>]
        Regex::new(r"(?i)(?:figshare\.com/articles/(?:[^/]+/)*|m9\.figshare\.)(\d+)")
            .expect("static pattern")
    })
}

impl Figshare {
    pub fn new() -> Result<Figshare> {
        Ok(Figshare {
            client: ProviderClient::new()?,
            article_id: None,
        })
    }

    async fn article(&self) -> Result<Value> {
        let id = self
            .article_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("Figshare", "provider not validated"))?;
        self.client
            .get_json(&format!("{}{}", API_BASE, id), "Figshare")
            .await
    }

    fn files_of(article: &Value) -> Vec<FileDescriptor> {
        article["files"]
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

#[async_trait]
impl Provider for Figshare {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Figshare",
            description: "Figshare is an online open access repository where researchers \
                          preserve and share figures, datasets, images, and videos under \
                          assigned DOIs.",
            website: "https://figshare.com/",
            supported_identifiers: vec![
                "https://figshare.com/articles/{article_id}",
                "https://doi.org/10.6084/m9.figshare.{article_id}",
                "10.6084/m9.figshare.{article_id}",
            ],
            doi_prefixes: vec!["10.6084/m9.figshare"],
            examples: vec!["https://doi.org/10.6084/m9.figshare.12345678"],
            notes: None,
        }
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        // the DOI form carries the article id, no resolution needed
        if let Some(captures) = article_pattern().captures(reference) {
            self.article_id = Some(String::from(&captures[1]));
            return Ok(true);
        }
        let url = self.client.resolve_url(reference).await;
        if let Some(captures) = article_pattern().captures(&url) {
            self.article_id = Some(String::from(&captures[1]));
            return Ok(true);
        }
        Ok(false)
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if !opts.download_data {
            log::warn!(
                "Figshare exposes no geospatial metadata; without downloading data \
                 there is nothing to extract"
            );
            return Ok(());
        }
        let article = self.article().await?;
        let files = Self::files_of(&article);
        if files.is_empty() {
            log::warn!(
                "no files found in Figshare article {}",
                self.article_id.as_deref().unwrap_or("?")
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
    use serde_json::json;

    #[test]
    fn identifier_patterns() {
        for (reference, expected) in [
            ("10.6084/m9.figshare.12345678", "12345678"),
            ("https://doi.org/10.6084/m9.figshare.12345678.v2", "12345678"),
            (
                "https://figshare.com/articles/dataset/some_title/9890294",
                "9890294",
            ),
        ] {
            let captures = article_pattern().captures(reference).unwrap();
            assert_eq!(&captures[1], expected, "for {}", reference);
        }
        assert!(article_pattern().captures("10.5281/zenodo.820562").is_none());
    }

    #[test]
    fn file_listing_shape() {
        let article = json!({
            "files": [
                {"name": "tracks.gpx", "size": 2048, "download_url": "https://ndownloader.figshare.com/files/1"},
                {"name": "broken"},
            ],
        });
        let files = Figshare::files_of(&article);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "tracks.gpx");
        assert_eq!(files[0].size, 2048);
    }
}
