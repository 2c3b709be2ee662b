use super::invenio_rdm::{InvenioRdmWorker, INVENIORDM_INSTANCES};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::Result;
use geoextent_core::model::Extent;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Zenodo runs on Invenio-RDM; this adapter embeds the shared worker but
/// validates only zenodo.org identifiers, including the legacy forms (bare
/// numeric IDs, /record/ URLs) that predate the platform migration.
pub struct Zenodo {
    worker: InvenioRdmWorker,
}

fn legacy_record_url() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i)(?:https://zenodo\.org/record/)?(\d+)$").expect("static pattern")
    })
}

/// zenodo DOIs carry the record id in the suffix, so they validate without
/// touching the resolver.
fn doi_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)10\.5281/zenodo\.(\d+)").expect("static pattern"))
}

impl Zenodo {
    pub fn new() -> Result<Zenodo> {
        let mut worker = InvenioRdmWorker::new()?;
        worker.instance = INVENIORDM_INSTANCES
            .iter()
            .find(|config| config.host_key == "zenodo.org");
        Ok(Zenodo { worker })
    }

    fn zenodo_hostnames(&self) -> &'static [&'static str] {
        self.worker
            .instance
            .map(|config| config.hostnames)
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for Zenodo {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Zenodo",
            description: "Zenodo is a free and open digital archive built by CERN and \
                          OpenAIRE, assigning persistent DOIs to research output of any \
                          size and format.",
            website: "https://zenodo.org/",
            supported_identifiers: vec![
                "https://zenodo.org/records/{record_id}",
                "https://zenodo.org/record/{record_id}",
                "https://doi.org/10.5281/zenodo.{record_id}",
                "10.5281/zenodo.{record_id}",
                "{record_id}",
            ],
            doi_prefixes: vec!["10.5281/zenodo"],
            examples: vec![
                "https://doi.org/10.5281/zenodo.4593540",
                "10.5281/zenodo.820562",
            ],
            notes: None,
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    /// restricted to zenodo.org on purpose: the generic adapter handles the
    /// other instances, and a bare numeric ID is only meaningful here.
    async fn validate(&mut self, reference: &str) -> Result<bool> {
        if let Some(captures) = legacy_record_url()
            .captures(reference.trim())
            .or_else(|| doi_suffix().captures(reference))
        {
            self.worker.record_id = Some(String::from(&captures[1]));
            return Ok(true);
        }

        let url = self.worker.client.resolve_url(reference).await;
        if self.zenodo_hostnames().iter().any(|p| url.starts_with(p)) {
            let record_id = url.trim_end_matches('/').rsplit('/').next().unwrap_or("");
            if !record_id.is_empty() {
                self.worker.record_id = Some(String::from(record_id));
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        self.worker.extent_from_metadata().await
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        self.worker.download(target, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_numeric_and_legacy_record_urls_validate_offline() {
        let mut zenodo = Zenodo::new().unwrap();
        assert!(tokio_test::block_on(zenodo.validate("820562")).unwrap());
        assert_eq!(zenodo.worker.record_id.as_deref(), Some("820562"));

        let mut zenodo = Zenodo::new().unwrap();
        assert!(
            tokio_test::block_on(zenodo.validate("https://zenodo.org/record/4593540")).unwrap()
        );
        assert_eq!(zenodo.worker.record_id.as_deref(), Some("4593540"));
    }

    #[test]
    fn zenodo_dois_validate_offline() {
        let mut zenodo = Zenodo::new().unwrap();
        assert!(tokio_test::block_on(zenodo.validate("10.5281/zenodo.820562")).unwrap());
        assert_eq!(zenodo.worker.record_id.as_deref(), Some("820562"));
        // a caltech-style slug is not a bare zenodo id
        assert!(!legacy_record_url().is_match("0ca1t-hzt77"));
    }
}
