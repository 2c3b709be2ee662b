use geoextent_core::error::{ExtentError, Result};
use geoextent_download::ops::http;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::sync::OnceLock;

/// kind of remote reference, decided syntactically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    Doi,
    Link,
    Other,
}

pub fn doi_pattern() -> &'static Regex {
    static DOI: OnceLock<Regex> = OnceLock::new();
    DOI.get_or_init(|| {
        Regex::new(r"^(?:doi:\s*|(?:https?://)?(?:dx\.)?doi\.org/)?(10\.\d{4,}(?:\.\d+)*/\S+)$")
            .expect("static pattern")
    })
}

pub fn reference_kind(reference: &str) -> ReferenceKind {
    if doi_pattern().is_match(reference.trim()) {
        ReferenceKind::Doi
    } else if reference.trim_start().starts_with("https://")
        || reference.trim_start().starts_with("http://")
    {
        ReferenceKind::Link
    } else {
        ReferenceKind::Other
    }
}

/// pulls the bare DOI out of a DOI, DOI URL, or doi:-prefixed string.
pub fn extract_doi(reference: &str) -> Option<String> {
    doi_pattern()
        .captures(reference.trim())
        .map(|caps| String::from(&caps[1]))
}

/// percent-encodes a query-string value (RFC 3986 unreserved set kept).
pub fn urlencode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// per-provider HTTP state: one pooled session plus the throttle flag, both
/// living exactly as long as the provider instance.
pub struct ProviderClient {
    pub http: Client,
    pub throttle: bool,
}

impl ProviderClient {
    pub fn new() -> Result<ProviderClient> {
        Ok(ProviderClient {
            http: http::build_client()?,
            throttle: false,
        })
    }

    /// resolves a reference to the URL it lands on. DOIs go through the
    /// doi.org resolver (one redirect chain, timeout-bounded); resolution
    /// failures fall back to the raw DOI so offline matching still works.
    pub async fn resolve_url(&self, reference: &str) -> String {
        match reference_kind(reference) {
            ReferenceKind::Doi => {
                let doi = extract_doi(reference).unwrap_or_else(|| String::from(reference));
                let resolver_url = format!("https://doi.org/{}", doi);
                match http::get_with_retry(&self.http, &resolver_url, false).await {
                    Ok(response) if response.status().is_success() => {
                        response.url().to_string()
                    }
                    _ => {
                        log::debug!("DOI resolution failed for {}, using raw DOI", doi);
                        doi
                    }
                }
            }
            _ => String::from(reference.trim()),
        }
    }

    /// GET returning parsed JSON, with provider-aware error mapping:
    /// 401/403 become access errors, other failures name the provider.
    pub async fn get_json(&self, url: &str, provider: &str) -> Result<Value> {
        let response = http::get_with_retry(&self.http, url, self.throttle).await?;
        if let Some(error) = http::error_for_status(&response, provider) {
            return Err(error);
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ExtentError::provider(provider, format!("malformed response from {}: {}", url, e)))
    }

    /// GET returning the response body as text, with the same error mapping.
    pub async fn get_text(&self, url: &str, provider: &str) -> Result<String> {
        let response = http::get_with_retry(&self.http, url, self.throttle).await?;
        if let Some(error) = http::error_for_status(&response, provider) {
            return Err(error);
        }
        response
            .text()
            .await
            .map_err(|e| ExtentError::provider(provider, format!("reading body from {}: {}", url, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_recognition() {
        assert_eq!(reference_kind("10.5281/zenodo.820562"), ReferenceKind::Doi);
        assert_eq!(
            reference_kind("https://doi.org/10.5281/zenodo.820562"),
            ReferenceKind::Doi
        );
        assert_eq!(
            reference_kind("doi:10.17632/8h9295v4t3.2"),
            ReferenceKind::Doi
        );
        assert_eq!(
            reference_kind("https://deims.org/dataset/x"),
            ReferenceKind::Link
        );
        assert_eq!(reference_kind("Q64"), ReferenceKind::Other);
    }

    #[test]
    fn doi_extraction_strips_resolver_prefixes() {
        for raw in [
            "10.5281/zenodo.820562",
            "https://doi.org/10.5281/zenodo.820562",
            "http://dx.doi.org/10.5281/zenodo.820562",
            "doi:10.5281/zenodo.820562",
        ] {
            assert_eq!(extract_doi(raw).as_deref(), Some("10.5281/zenodo.820562"));
        }
        assert_eq!(extract_doi("not a doi"), None);
    }
}
