use super::client::{extract_doi, ProviderClient};
use super::gfz::datacite_extent;
use super::sidecar::{self, SidecarContent};
use super::{datacite, Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::Extent;
use geoextent_download::ops::engine;
use geoextent_download::FileDescriptor;
use std::path::Path;

const DOI_PREFIX: &str = "10.35097";

/// RADAR offers no item-level file API; a dataset is fetched as one
/// archive. extents are otherwise available from the DOI's DataCite
/// registration.
pub struct Radar {
    client: ProviderClient,
    doi: Option<String>,
}

impl Radar {
    pub fn new() -> Result<Radar> {
        Ok(Radar {
            client: ProviderClient::new()?,
            doi: None,
        })
    }

    fn doi(&self) -> Result<&str> {
        self.doi
            .as_deref()
            .ok_or_else(|| ExtentError::provider("RADAR", "provider not validated"))
    }

    fn dataset_id(&self) -> Result<String> {
        // 10.35097/{id}, the suffix is the dataset id
        let doi = self.doi()?;
        Ok(doi.split('/').nth(1).unwrap_or(doi).to_string())
    }
}

#[async_trait]
impl Provider for Radar {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "RADAR",
            description: "RADAR is the cross-disciplinary research data repository \
                          operated by FIZ Karlsruhe for German research institutions.",
            website: "https://www.radar-service.eu/",
            supported_identifiers: vec![
                "https://www.radar-service.eu/radar/en/dataset/{id}",
                "https://doi.org/10.35097/{id}",
                "10.35097/{id}",
            ],
            doi_prefixes: vec!["10.35097"],
            examples: vec!["10.35097/1871"],
            notes: Some("Archive-only downloads; no item-level file listing."),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        // dataset page URLs embed the DOI after /dataset/
        let candidate = match reference.split_once("/dataset/") {
            Some((_, rest)) => String::from(rest.trim_end_matches('/')),
            None => String::from(reference),
        };
        match extract_doi(&candidate) {
            Some(doi) if doi.starts_with(DOI_PREFIX) => {
                self.doi = Some(doi);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        let record = datacite::fetch(&self.client, self.doi()?, "RADAR").await?;
        Ok(datacite_extent(&record))
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if opts.download_data {
            let id = self.dataset_id()?;
            let archive = FileDescriptor::new(
                format!("radar_{}.zip", id),
                format!("https://www.radar-service.eu/radar/api/datasets/{}/download", id),
                0,
            );
            let results =
                engine::download_batch(&self.client.http, &[archive], target, &opts.download)
                    .await?;
            if results.iter().any(|r| r.success()) {
                return Ok(());
            }
            log::warn!("RADAR archive download failed, falling back to metadata sidecar");
        }

        let record = datacite::fetch(&self.client, self.doi()?, "RADAR").await?;
        let mut content = SidecarContent::new("RADAR", self.doi()?.to_string());
        content.title = record.title.clone();
        content.geometries = record.geometries.clone();
        content.temporal = record.temporal.clone();
        sidecar::write_sidecar(target, "radar", &content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_and_dataset_page_validation() {
        let mut radar = Radar::new().unwrap();
        assert!(tokio_test::block_on(radar.validate("10.35097/1871")).unwrap());
        assert_eq!(radar.dataset_id().unwrap(), "1871");

        let mut radar = Radar::new().unwrap();
        assert!(tokio_test::block_on(
            radar.validate("https://www.radar-service.eu/radar/en/dataset/10.35097/1871")
        )
        .unwrap());

        let mut radar = Radar::new().unwrap();
        assert!(!tokio_test::block_on(radar.validate("10.5281/zenodo.1")).unwrap());
    }
}
