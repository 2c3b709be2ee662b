pub mod arctic;
pub mod bgr;
pub mod client;
pub mod datacite;
pub mod dataverse;
pub mod deims;
pub mod dryad;
pub mod figshare;
pub mod fourtu;
pub mod gfz;
pub mod halodb;
pub mod invenio_rdm;
pub mod mendeley;
pub mod nfdi4earth;
pub mod opara;
pub mod osf;
pub mod pangaea;
pub mod pensoft;
pub mod radar;
pub mod senckenberg;
pub mod sidecar;
pub mod stac;
pub mod wikidata;
pub mod zenodo;

use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::Result;
use geoextent_core::model::{Extent, Followed, Tbox};
use serde::Serialize;
use std::path::Path;

/// static descriptor of one provider, for the `--providers` listing and for
/// dispatch diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub website: &'static str,
    pub supported_identifiers: Vec<&'static str>,
    pub doi_prefixes: Vec<&'static str>,
    pub examples: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'static str>,
}

/// one repository adapter. instances are single-use: `validate` fixes the
/// record identity, and `download` must only be called after a successful
/// `validate` on the same instance.
#[async_trait]
pub trait Provider: Send {
    fn info(&self) -> ProviderInfo;

    /// display name; multi-instance adapters report the resolved instance
    fn name(&self) -> String {
        String::from(self.info().name)
    }

    /// DOI prefixes for the offline fast-match phase of dispatch
    fn doi_prefixes(&self) -> Vec<&'static str> {
        self.info().doi_prefixes
    }

    /// whether the provider API exposes bbox/tbox directly
    fn supports_metadata_extraction(&self) -> bool {
        false
    }

    /// checks the reference and, on a match, stores the resolved record ID
    /// and host in the instance.
    async fn validate(&mut self, reference: &str) -> Result<bool>;

    /// extents straight from provider metadata, for the metadata-first
    /// path. None when the record metadata carries no extent.
    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        Ok(None)
    }

    /// writes data files (or a metadata sidecar) into `target`, which is
    /// then aggregated as a local directory.
    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()>;

    /// set after `download` when the adapter followed an external reference
    /// to another provider.
    fn followed(&self) -> Option<Followed> {
        None
    }

    /// temporal extent from the adapter's own metadata, used to fill in the
    /// aggregate when a followed provider yields none.
    fn metadata_tbox(&self) -> Option<Tbox> {
        None
    }
}

/// drops obvious placeholder values before treating a metadata field as a
/// followable reference.
pub fn is_placeholder_reference(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v.is_empty()
        || matches!(
            v.as_str(),
            "n/a" | "na" | "none" | "null" | "not applicable" | "tbd" | "-"
        )
}

/// sidecar filenames embed the record ID; anything outside [A-Za-z0-9_.-]
/// is replaced.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder_reference(""));
        assert!(is_placeholder_reference(" N/A "));
        assert!(is_placeholder_reference("not applicable"));
        assert!(!is_placeholder_reference("10.5281/zenodo.820562"));
        assert!(!is_placeholder_reference("https://example.org/data"));
    }

    #[test]
    fn id_sanitization() {
        assert_eq!(sanitize_id("10.5281/zenodo.1"), "10.5281_zenodo.1");
        assert_eq!(sanitize_id("plain-id_1.2"), "plain-id_1.2");
    }
}
