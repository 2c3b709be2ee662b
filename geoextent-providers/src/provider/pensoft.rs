use super::client::{extract_doi, ProviderClient};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_download::ops::engine;
use geoextent_download::FileDescriptor;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Pensoft journals publish occurrence data as a Darwin Core archive per
/// article; there is no item-level file API, so the archive is the unit of
/// download.
pub struct Pensoft {
    client: ProviderClient,
    journal: Option<String>,
    article_id: Option<String>,
}

fn doi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // 10.3897/{journal}.{volume}.e{article}
        Regex::new(r"(?i)10\.3897/([a-z]+)\.\d+\.e(\d+)").expect("static pattern")
    })
}

impl Pensoft {
    pub fn new() -> Result<Pensoft> {
        Ok(Pensoft {
            client: ProviderClient::new()?,
            journal: None,
            article_id: None,
        })
    }
}

#[async_trait]
impl Provider for Pensoft {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Pensoft",
            description: "Pensoft publishes over 60 open access biodiversity journals; \
                          articles carry semantically enriched occurrence data.",
            website: "https://pensoft.net/",
            supported_identifiers: vec![
                "https://doi.org/10.3897/{journal}.{volume}.e{article_id}",
                "10.3897/{journal}.{volume}.e{article_id}",
            ],
            doi_prefixes: vec!["10.3897"],
            examples: vec![
                "https://doi.org/10.3897/BDJ.2.e1068",
                "https://doi.org/10.3897/BDJ.13.e159973",
            ],
            notes: Some("Darwin Core archive per article; archive-only downloads."),
        }
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let candidate = extract_doi(reference).unwrap_or_else(|| String::from(reference));
        if let Some(captures) = doi_pattern().captures(&candidate) {
            self.journal = Some(captures[1].to_lowercase());
            self.article_id = Some(String::from(&captures[2]));
            return Ok(true);
        }
        Ok(false)
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        let (journal, article_id) = match (&self.journal, &self.article_id) {
            (Some(journal), Some(article_id)) => (journal.clone(), article_id.clone()),
            _ => return Err(ExtentError::provider("Pensoft", "provider not validated")),
        };
        if !opts.download_data {
            log::warn!(
                "Pensoft exposes no geospatial metadata; without downloading the \
                 occurrence archive there is nothing to extract"
            );
            return Ok(());
        }

        let archive = FileDescriptor::new(
            format!("pensoft_{}_{}.zip", journal, article_id),
            format!(
                "https://{}.pensoft.net/article/{}/download/dwc/",
                journal, article_id
            ),
            0,
        );
        let results =
            engine::download_batch(&self.client.http, &[archive], target, &opts.download).await?;
        if !results.iter().any(|r| r.success()) {
            return Err(ExtentError::provider(
                "Pensoft",
                format!(
                    "could not download the Darwin Core archive for {}.e{}",
                    journal, article_id
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_and_article_from_doi() {
        let mut pensoft = Pensoft::new().unwrap();
        assert!(tokio_test::block_on(
            pensoft.validate("https://doi.org/10.3897/BDJ.2.e1068")
        )
        .unwrap());
        assert_eq!(pensoft.journal.as_deref(), Some("bdj"));
        assert_eq!(pensoft.article_id.as_deref(), Some("1068"));

        let mut pensoft = Pensoft::new().unwrap();
        assert!(!tokio_test::block_on(pensoft.validate("10.3897/malformed")).unwrap());
    }
}
