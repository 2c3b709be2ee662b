use super::client::{extract_doi, ProviderClient};
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

const SERVER_BASE: &str = "https://opara.zih.tu-dresden.de/server/api";
const DOI_PREFIX: &str = "10.25532/opara";

/// OPARA is a DSpace 7 installation: item → bundles → bitstreams, with
/// downloads served from the bitstream content endpoint. bare UUIDs are
/// accepted, which is why dispatch registers BGR ahead of this adapter.
pub struct Opara {
    client: ProviderClient,
    item_uuid: Option<String>,
}

pub fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .expect("static pattern")
    })
}

fn item_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)opara\.zih\.tu-dresden\.de/(?:items|entities/[^/]+)/([0-9a-f-]{36})",
        )
        .expect("static pattern")
    })
}

impl Opara {
    pub fn new() -> Result<Opara> {
        Ok(Opara {
            client: ProviderClient::new()?,
            item_uuid: None,
        })
    }

    fn item_uuid(&self) -> Result<&str> {
        self.item_uuid
            .as_deref()
            .ok_or_else(|| ExtentError::provider("Opara", "provider not validated"))
    }

    async fn files(&self) -> Result<Vec<FileDescriptor>> {
        let bundles_url = format!("{}/core/items/{}/bundles", SERVER_BASE, self.item_uuid()?);
        let bundles = self.client.get_json(&bundles_url, "Opara").await?;

        let mut files = vec![];
        if let Some(bundle_list) = bundles["_embedded"]["bundles"].as_array() {
            for bundle in bundle_list {
                // ORIGINAL holds the deposited data; other bundles carry
                // licenses and thumbnails
                if bundle["name"].as_str() != Some("ORIGINAL") {
                    continue;
                }
                let bitstreams_url = match bundle["_links"]["bitstreams"]["href"].as_str() {
                    Some(href) => String::from(href),
                    None => continue,
                };
                let bitstreams = self.client.get_json(&bitstreams_url, "Opara").await?;
                if let Some(entries) = bitstreams["_embedded"]["bitstreams"].as_array() {
                    for entry in entries {
                        let name = entry["name"].as_str().unwrap_or("unknown");
                        let size = entry["sizeBytes"].as_u64().unwrap_or(0);
                        if let Some(uuid) = entry["uuid"].as_str() {
                            files.push(FileDescriptor::new(
                                name,
                                format!("{}/core/bitstreams/{}/content", SERVER_BASE, uuid),
                                size,
                            ));
                        }
                    }
                }
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl Provider for Opara {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Opara",
            description: "OPARA is the open access repository and archive for research \
                          data of the Saxon universities, operated on DSpace 7 by TU \
                          Dresden and TU Bergakademie Freiberg.",
            website: "https://opara.zih.tu-dresden.de/",
            supported_identifiers: vec![
                "https://opara.zih.tu-dresden.de/items/{uuid}",
                "https://opara.zih.tu-dresden.de/handle/{handle}",
                "https://doi.org/10.25532/OPARA-{id}",
                "10.25532/OPARA-{id}",
                "{uuid}",
            ],
            doi_prefixes: vec!["10.25532/OPARA"],
            examples: vec![
                "https://opara.zih.tu-dresden.de/items/4cdf08d6-2738-4c9e-9d27-345a0647ff7c",
                "10.25532/OPARA-581",
            ],
            notes: Some("Accepts bare item UUIDs; registered after BGR, which also does."),
        }
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let reference = reference.trim();
        if let Some(captures) = item_url_pattern().captures(reference) {
            self.item_uuid = Some(captures[1].to_lowercase());
            return Ok(true);
        }
        if uuid_pattern().is_match(reference) {
            self.item_uuid = Some(reference.to_lowercase());
            return Ok(true);
        }
        // DOIs and handle URLs resolve to the item page
        let is_opara_doi = extract_doi(reference)
            .map(|doi| doi.to_lowercase().starts_with(DOI_PREFIX))
            .unwrap_or(false);
        if is_opara_doi || reference.contains("opara.zih.tu-dresden.de/handle/") {
            let url = self.client.resolve_url(reference).await;
            if let Some(captures) = item_url_pattern().captures(&url) {
                self.item_uuid = Some(captures[1].to_lowercase());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if !opts.download_data {
            log::warn!(
                "Opara exposes no geospatial metadata; without downloading data there \
                 is nothing to extract"
            );
            return Ok(());
        }
        let files = self.files().await?;
        if files.is_empty() {
            log::warn!("no files found in Opara item {}", self.item_uuid()?);
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
    fn item_urls_and_bare_uuids_validate_offline() {
        let mut opara = Opara::new().unwrap();
        assert!(tokio_test::block_on(opara.validate(
            "https://opara.zih.tu-dresden.de/items/4cdf08d6-2738-4c9e-9d27-345a0647ff7c"
        ))
        .unwrap());
        assert_eq!(
            opara.item_uuid.as_deref(),
            Some("4cdf08d6-2738-4c9e-9d27-345a0647ff7c")
        );

        let mut opara = Opara::new().unwrap();
        assert!(tokio_test::block_on(
            opara.validate("4cdf08d6-2738-4c9e-9d27-345a0647ff7c")
        )
        .unwrap());

        let mut opara = Opara::new().unwrap();
        assert!(!tokio_test::block_on(opara.validate("not-a-uuid")).unwrap());
    }
}
