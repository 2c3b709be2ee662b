use super::client::ProviderClient;
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_download::ops::{engine, select};
use geoextent_download::FileDescriptor;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const API_BASE: &str = "https://api.osf.io/v2/nodes/";

/// OSF storage listings are paginated; `links.next` is followed until
/// exhausted. folders are skipped (only files carry a download link).
pub struct Osf {
    client: ProviderClient,
    project_id: Option<String>,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:osf\.io/|10\.17605/OSF\.IO/)([a-z0-9]{5})\b").expect("static pattern")
    })
}

impl Osf {
    pub fn new() -> Result<Osf> {
        Ok(Osf {
            client: ProviderClient::new()?,
            project_id: None,
        })
    }

    fn project_id(&self) -> Result<&str> {
        self.project_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("OSF", "provider not validated"))
    }

    async fn files(&self) -> Result<Vec<FileDescriptor>> {
        let mut page_url = format!("{}{}/files/osfstorage/", API_BASE, self.project_id()?);
        let mut files = vec![];
        loop {
            let page = self.client.get_json(&page_url, "OSF").await?;
            if let Some(entries) = page["data"].as_array() {
                for entry in entries {
                    if entry["attributes"]["kind"].as_str() != Some("file") {
                        continue;
                    }
                    let name = entry["attributes"]["name"].as_str().unwrap_or("unknown");
                    let size = entry["attributes"]["size"].as_u64().unwrap_or(0);
                    if let Some(url) = entry["links"]["download"].as_str() {
                        files.push(FileDescriptor::new(name, url, size));
                    }
                }
            }
            match page["links"]["next"].as_str() {
                Some(next) => page_url = String::from(next),
                None => break,
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl Provider for Osf {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "OSF",
            description: "The Open Science Framework is the Center for Open Science's \
                          project platform for managing and sharing research materials.",
            website: "https://osf.io/",
            supported_identifiers: vec![
                "https://osf.io/{project_id}/",
                "https://doi.org/10.17605/OSF.IO/{project_id}",
                "10.17605/OSF.IO/{project_id}",
                "OSF.IO/{project_id}",
            ],
            doi_prefixes: vec!["10.17605/OSF.IO"],
            examples: vec!["https://doi.org/10.17605/OSF.IO/4XE6Z", "https://osf.io/4xe6z/"],
            notes: None,
        }
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        if let Some(captures) = identifier_pattern().captures(reference) {
            self.project_id = Some(captures[1].to_lowercase());
            return Ok(true);
        }
        // bare "OSF.IO/xxxxx" without scheme
        if let Some(rest) = reference.trim().to_lowercase().strip_prefix("osf.io/") {
            let id = rest.trim_end_matches('/');
            if id.len() == 5 && id.chars().all(|c| c.is_ascii_alphanumeric()) {
                self.project_id = Some(String::from(id));
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if !opts.download_data {
            log::warn!(
                "OSF exposes no geospatial metadata; without downloading data there \
                 is nothing to extract"
            );
            return Ok(());
        }
        let files = self.files().await?;
        if files.is_empty() {
            log::warn!("no files found in OSF project {}", self.project_id()?);
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
    fn identifier_patterns() {
        for reference in [
            "https://osf.io/4xe6z/",
            "https://doi.org/10.17605/OSF.IO/4XE6Z",
            "10.17605/OSF.IO/4xe6z",
        ] {
            let captures = identifier_pattern().captures(reference).unwrap();
            assert_eq!(captures[1].to_lowercase(), "4xe6z", "for {}", reference);
        }
    }

    #[test]
    fn bare_osf_io_identifier() {
        let mut osf = Osf::new().unwrap();
        assert!(tokio_test::block_on(osf.validate("OSF.IO/4xe6z")).unwrap());
        assert_eq!(osf.project_id.as_deref(), Some("4xe6z"));
    }
}
