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
use url::Url;

/// known Dataverse installations; the platform is self-hosted, so host
/// resolution is part of validation.
const KNOWN_HOSTS: [&str; 7] = [
    "dataverse.harvard.edu",
    "dataverse.nl",
    "demo.dataverse.nl",
    "dataverse.unc.edu",
    "data.library.virginia.edu",
    "dataverse.no",
    "recherche.data.gouv.fr",
];

const DEFAULT_HOST: &str = "dataverse.harvard.edu";

/// DOI prefixes used by the larger installations, for the offline
/// heuristic match.
const DOI_HINTS: [&str; 4] = ["10.7910/dvn/", "10.34894/", "10.18710/", "10.5064/"];

pub struct Dataverse {
    client: ProviderClient,
    host: Option<String>,
    persistent_id: Option<String>,
    dataset_id: Option<String>,
    metadata: Option<Value>,
}

fn dataset_page_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)https?://([^/]+)/dataset\.xhtml\?persistentId=(.+)")
            .expect("static pattern")
    })
}

fn api_persistent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)https?://([^/]+)/api/datasets/:persistentId\?persistentId=(.+)")
            .expect("static pattern")
    })
}

fn api_dataset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)https?://([^/]+)/api/datasets/(\d+)").expect("static pattern")
    })
}

fn is_known_host(host: &str) -> bool {
    KNOWN_HOSTS.iter().any(|h| h.eq_ignore_ascii_case(host))
}

fn looks_like_dataverse_doi(doi: &str) -> bool {
    let doi = doi.to_lowercase();
    DOI_HINTS.iter().any(|hint| doi.starts_with(hint))
}

/// persistent IDs always carry their scheme.
fn normalize_persistent_id(raw: &str) -> String {
    let decoded = raw.replace("%3A", ":").replace("%2F", "/");
    if decoded.starts_with("doi:") || decoded.starts_with("hdl:") || decoded.starts_with("urn:") {
        decoded
    } else if decoded.starts_with("10.") {
        format!("doi:{}", decoded)
    } else {
        decoded
    }
}

impl Dataverse {
    pub fn new() -> Result<Dataverse> {
        Ok(Dataverse {
            client: ProviderClient::new()?,
            host: None,
            persistent_id: None,
            dataset_id: None,
            metadata: None,
        })
    }

    /// resolves the installation host: from the matched URL if present,
    /// else by following the DOI, else the default with a warning.
    async fn api_base(&mut self) -> String {
        if self.host.is_none() {
            if let Some(pid) = self.persistent_id.clone() {
                if let Some(doi) = pid.strip_prefix("doi:") {
                    let resolved = self.client.resolve_url(doi).await;
                    if let Ok(parsed) = Url::parse(&resolved) {
                        if let Some(host) = parsed.host_str() {
                            if is_known_host(host) {
                                self.host = Some(String::from(host));
                            }
                        }
                    }
                }
            }
            if self.host.is_none() {
                log::warn!(
                    "could not determine the Dataverse host, defaulting to {}",
                    DEFAULT_HOST
                );
                self.host = Some(String::from(DEFAULT_HOST));
            }
        }
        format!("https://{}/api", self.host.as_deref().expect("set above"))
    }

    async fn dataset_metadata(&mut self) -> Result<Value> {
        if let Some(metadata) = &self.metadata {
            return Ok(metadata.clone());
        }
        let api_base = self.api_base().await;
        let url = if let Some(pid) = &self.persistent_id {
            format!("{}/datasets/:persistentId?persistentId={}", api_base, pid)
        } else if let Some(id) = &self.dataset_id {
            format!("{}/datasets/{}", api_base, id)
        } else {
            return Err(ExtentError::provider("Dataverse", "provider not validated"));
        };

        let response = self.client.get_json(&url, "Dataverse").await?;
        if response["status"].as_str() != Some("OK") {
            return Err(ExtentError::provider(
                "Dataverse",
                format!(
                    "API returned an error: {}",
                    response["message"].as_str().unwrap_or("unknown")
                ),
            ));
        }
        let data = response["data"].clone();
        self.metadata = Some(data.clone());
        Ok(data)
    }

    async fn files(&mut self) -> Result<Vec<FileDescriptor>> {
        let metadata = self.dataset_metadata().await?;
        let api_base = self.api_base().await;
        let mut files = vec![];
        if let Some(entries) = metadata["latestVersion"]["files"].as_array() {
            for entry in entries {
                let data_file = &entry["dataFile"];
                let name = data_file["filename"]
                    .as_str()
                    .or_else(|| entry["label"].as_str())
                    .unwrap_or("unknown");
                let size = data_file["filesize"].as_u64().unwrap_or(0);
                let url = match data_file["id"].as_u64() {
                    Some(id) => format!("{}/access/datafile/{}", api_base, id),
                    None => match data_file["persistentId"].as_str() {
                        Some(pid) => format!(
                            "{}/access/datafile/:persistentId?persistentId={}",
                            api_base, pid
                        ),
                        None => continue,
                    },
                };
                files.push(FileDescriptor::new(name, url, size));
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl Provider for Dataverse {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Dataverse",
            description: "Dataverse is an open-source research data platform; this adapter \
                          covers the registered installations and resolves the hosting \
                          instance from URLs or DOI redirects.",
            website: "https://dataverse.org/",
            supported_identifiers: vec![
                "https://{host}/dataset.xhtml?persistentId=doi:{doi}",
                "https://{host}/api/datasets/{id}",
                "doi:{doi}",
                "{doi}",
            ],
            doi_prefixes: vec!["10.7910/DVN"],
            examples: vec![
                "https://dataverse.harvard.edu/dataset.xhtml?persistentId=doi:10.7910/DVN/OMV93V",
            ],
            notes: Some("Supports multiple Dataverse installations."),
        }
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        // DOI forms first, to avoid resolving URLs that already name a host
        if let Some(doi) = extract_doi(reference) {
            if looks_like_dataverse_doi(&doi) {
                self.persistent_id = Some(normalize_persistent_id(&doi));
                return Ok(true);
            }
        }
        let url = self.client.resolve_url(reference).await;
        if let Some(captures) = dataset_page_pattern()
            .captures(&url)
            .or_else(|| api_persistent_pattern().captures(&url))
        {
            let (host, pid) = (String::from(&captures[1]), String::from(&captures[2]));
            if is_known_host(&host) {
                self.host = Some(host);
                self.persistent_id = Some(normalize_persistent_id(&pid));
                return Ok(true);
            }
        }
        if let Some(captures) = api_dataset_pattern().captures(&url) {
            let (host, id) = (String::from(&captures[1]), String::from(&captures[2]));
            if is_known_host(&host) {
                self.host = Some(host);
                self.dataset_id = Some(id);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if !opts.download_data {
            log::warn!(
                "Dataverse metadata rarely carries geospatial coverage; without \
                 downloading data there is nothing to extract"
            );
            return Ok(());
        }
        let files = self.files().await?;
        if files.is_empty() {
            log::warn!("no files found in Dataverse dataset");
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
    fn doi_heuristics_match_known_installations() {
        assert!(looks_like_dataverse_doi("10.7910/DVN/OMV93V"));
        assert!(looks_like_dataverse_doi("10.18710/ABCDEF"));
        assert!(!looks_like_dataverse_doi("10.5281/zenodo.1"));
    }

    #[test]
    fn persistent_id_normalization() {
        assert_eq!(normalize_persistent_id("10.7910/DVN/X"), "doi:10.7910/DVN/X");
        assert_eq!(normalize_persistent_id("doi:10.7910/DVN/X"), "doi:10.7910/DVN/X");
        assert_eq!(
            normalize_persistent_id("doi%3A10.7910%2FDVN%2FX"),
            "doi:10.7910/DVN/X"
        );
    }

    #[test]
    fn url_patterns_capture_host_and_id() {
        let captures = dataset_page_pattern()
            .captures("https://dataverse.harvard.edu/dataset.xhtml?persistentId=doi:10.7910/DVN/OMV93V")
            .unwrap();
        assert_eq!(&captures[1], "dataverse.harvard.edu");
        assert_eq!(&captures[2], "doi:10.7910/DVN/OMV93V");

        let captures = api_dataset_pattern()
            .captures("https://dataverse.no/api/datasets/12345")
            .unwrap();
        assert_eq!(&captures[1], "dataverse.no");
        assert_eq!(&captures[2], "12345");
    }

    #[test]
    fn offline_validation_for_doi_forms() {
        let mut dataverse = Dataverse::new().unwrap();
        assert!(tokio_test::block_on(dataverse.validate("doi:10.7910/DVN/OMV93V")).unwrap());
        assert_eq!(
            dataverse.persistent_id.as_deref(),
            Some("doi:10.7910/DVN/OMV93V")
        );
    }
}
