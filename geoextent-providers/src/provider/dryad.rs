use super::client::{extract_doi, ProviderClient};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_download::ops::{engine, select};
use geoextent_download::FileDescriptor;
use serde_json::Value;
use std::path::Path;

const HOST: &str = "https://datadryad.org";
const API_BASE: &str = "https://datadryad.org/api/v2";
const DOI_PREFIX: &str = "10.5061/dryad";

/// Dryad's file listing is paginated; every page carries a `_links.next`
/// until the listing is exhausted.
pub struct Dryad {
    client: ProviderClient,
    doi: Option<String>,
}

impl Dryad {
    pub fn new() -> Result<Dryad> {
        Ok(Dryad {
            client: ProviderClient::new()?,
            doi: None,
        })
    }

    fn doi(&self) -> Result<&str> {
        self.doi
            .as_deref()
            .ok_or_else(|| ExtentError::provider("Dryad", "provider not validated"))
    }

    async fn dataset(&self) -> Result<Value> {
        let encoded = self.doi()?.replace('/', "%2F");
        self.client
            .get_json(&format!("{}/datasets/doi%3A{}", API_BASE, encoded), "Dryad")
            .await
    }

    async fn files(&self) -> Result<Vec<FileDescriptor>> {
        let dataset = self.dataset().await?;
        let mut page_url = dataset["_links"]["stash:version"]["href"]
            .as_str()
            .map(|href| format!("{}{}/files", HOST, href))
            .ok_or_else(|| {
                ExtentError::provider("Dryad", "dataset response carries no version link")
            })?;

        let mut files = vec![];
        loop {
            let page = self.client.get_json(&page_url, "Dryad").await?;
            if let Some(entries) = page["_embedded"]["stash:files"].as_array() {
                for entry in entries {
                    let name = entry["path"].as_str().unwrap_or("unknown");
                    let size = entry["size"].as_u64().unwrap_or(0);
                    let download = entry["_links"]["stash:download"]["href"].as_str();
                    if let Some(download) = download {
                        files.push(FileDescriptor::new(name, format!("{}{}", HOST, download), size));
                    }
                }
            }
            match page["_links"]["next"]["href"].as_str() {
                Some(next) => page_url = format!("{}{}", HOST, next),
                None => break,
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl Provider for Dryad {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Dryad",
            description: "Dryad is a nonprofit curated general-purpose repository for data \
                          underlying scientific publications, published under CC0.",
            website: "https://datadryad.org/",
            supported_identifiers: vec![
                "https://datadryad.org/stash/dataset/doi:{doi}",
                "https://doi.org/10.5061/dryad.{id}",
                "10.5061/dryad.{id}",
            ],
            doi_prefixes: vec!["10.5061/dryad"],
            examples: vec!["https://datadryad.org/stash/dataset/doi:10.5061/dryad.0k6djhb7x"],
            notes: Some("Sends Dryad-style ratelimit-remaining / ratelimit-reset headers."),
        }
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        // dataset page URLs embed the DOI after "doi:"
        let candidate = match reference.split_once("dataset/doi:") {
            Some((_, doi)) => String::from(doi),
            None => String::from(reference),
        };
        match extract_doi(&candidate) {
            Some(doi) if doi.to_lowercase().starts_with(DOI_PREFIX) => {
                self.doi = Some(doi);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if !opts.download_data {
            log::warn!(
                "Dryad exposes no geospatial metadata; without downloading data there \
                 is nothing to extract"
            );
            return Ok(());
        }
        let files = self.files().await?;
        if files.is_empty() {
            log::warn!("no files found in Dryad dataset {}", self.doi()?);
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
    fn validation_requires_the_dryad_prefix() {
        let mut dryad = Dryad::new().unwrap();
        assert!(tokio_test::block_on(
            dryad.validate("10.5061/dryad.0k6djhb7x")
        )
        .unwrap());
        assert_eq!(dryad.doi.as_deref(), Some("10.5061/dryad.0k6djhb7x"));

        let mut dryad = Dryad::new().unwrap();
        assert!(tokio_test::block_on(dryad.validate(
            "https://datadryad.org/stash/dataset/doi:10.5061/dryad.0k6djhb7x"
        ))
        .unwrap());

        let mut dryad = Dryad::new().unwrap();
        assert!(!tokio_test::block_on(dryad.validate("10.5281/zenodo.1")).unwrap());
    }
}
