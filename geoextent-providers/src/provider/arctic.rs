use super::client::{extract_doi, ProviderClient};
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use serde_json::Value;
use std::path::Path;

const DOI_PREFIX: &str = "10.18739";
const SOLR_BASE: &str = "https://arcticdata.io/metacat/d1/mn/v2/query/solr/";

/// the Arctic Data Center runs on DataONE; its Solr index carries the ISO
/// 19115 bounding coordinates and temporal coverage per record.
pub struct ArcticDataCenter {
    client: ProviderClient,
    doi: Option<String>,
}

impl ArcticDataCenter {
    pub fn new() -> Result<ArcticDataCenter> {
        Ok(ArcticDataCenter {
            client: ProviderClient::new()?,
            doi: None,
        })
    }

    fn doi(&self) -> Result<&str> {
        self.doi
            .as_deref()
            .ok_or_else(|| ExtentError::provider("Arctic Data Center", "provider not validated"))
    }

    async fn solr_record(&self) -> Result<Value> {
        let query = format!(
            "{}?q=id:%22doi%3A{}%22&fl=id,title,southBoundCoord,northBoundCoord,\
             eastBoundCoord,westBoundCoord,beginDate,endDate&wt=json",
            SOLR_BASE,
            self.doi()?.replace('/', "%2F")
        );
        let response = self.client.get_json(&query, "Arctic Data Center").await?;
        response["response"]["docs"][0]
            .as_object()
            .map(|doc| Value::Object(doc.clone()))
            .ok_or_else(|| {
                ExtentError::provider(
                    "Arctic Data Center",
                    format!("no Solr record found for {}", self.doi().unwrap_or("?")),
                )
            })
    }

    fn parse_extent(doc: &Value) -> (Option<Bbox>, Option<(String, String)>) {
        let bbox = match (
            doc["southBoundCoord"].as_f64(),
            doc["westBoundCoord"].as_f64(),
            doc["northBoundCoord"].as_f64(),
            doc["eastBoundCoord"].as_f64(),
        ) {
            (Some(south), Some(west), Some(north), Some(east)) => {
                Some(Bbox::new(south, west, north, east))
            }
            _ => None,
        };
        let temporal = match (doc["beginDate"].as_str(), doc["endDate"].as_str()) {
            (Some(begin), Some(end)) => Some((String::from(begin), String::from(end))),
            (Some(single), None) | (None, Some(single)) => {
                Some((String::from(single), String::from(single)))
            }
            (None, None) => None,
        };
        (bbox, temporal)
    }
}

#[async_trait]
impl Provider for ArcticDataCenter {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Arctic Data Center",
            description: "The NSF Arctic Data Center is the primary repository for \
                          NSF-funded Arctic research data, with rich ISO 19115 coverage \
                          metadata.",
            website: "https://arcticdata.io/",
            supported_identifiers: vec![
                "https://arcticdata.io/catalog/view/{doi}",
                "https://doi.org/10.18739/{id}",
                "10.18739/{id}",
            ],
            doi_prefixes: vec!["10.18739"],
            examples: vec!["10.18739/A2KW57K57"],
            notes: Some("Metadata extraction via the DataONE Solr index."),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        // catalog URLs embed the DOI after /view/
        let candidate = match reference.split_once("/catalog/view/") {
            Some((_, rest)) => rest
                .replace("doi%3A", "")
                .replace("doi:", "")
                .replace("%2F", "/"),
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
        let doc = self.solr_record().await?;
        let (bbox, temporal) = Self::parse_extent(&doc);

        let mut extent = Extent::new("remote");
        if let Some(bbox) = bbox.filter(|b| b.is_valid_wgs84()) {
            extent.bbox = Some(bbox);
            extent.crs = Some(WGS84_EPSG.to_string());
        }
        extent.tbox = temporal
            .as_ref()
            .and_then(|(s, e)| Some(Tbox::new(dates::parse_date(s)?, dates::parse_date(e)?)));
        Ok(if extent.has_extent() { Some(extent) } else { None })
    }

    async fn download(&mut self, target: &Path, _opts: &RemoteOptions) -> Result<()> {
        let doc = self.solr_record().await?;
        let (bbox, temporal) = Self::parse_extent(&doc);

        let mut content = SidecarContent::new("Arctic Data Center", self.doi()?.to_string());
        content.title = doc["title"].as_str().map(String::from);
        if let Some(bbox) = bbox {
            content.geometries = vec![SidecarContent::bbox_geometry(
                bbox.min_lat,
                bbox.min_lon,
                bbox.max_lat,
                bbox.max_lon,
            )];
        }
        content.temporal = temporal;
        if sidecar::write_sidecar(target, "arcticdata", &content)?.is_none() {
            log::warn!(
                "Arctic Data Center record {} has no coverage metadata",
                self.doi()?
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn solr_document_parsing() {
        let doc = json!({
            "title": "sea ice observations",
            "southBoundCoord": 68.0,
            "westBoundCoord": -165.0,
            "northBoundCoord": 71.5,
            "eastBoundCoord": -150.0,
            "beginDate": "2015-01-01T00:00:00Z",
            "endDate": "2016-12-31T00:00:00Z",
        });
        let (bbox, temporal) = ArcticDataCenter::parse_extent(&doc);
        assert_eq!(bbox.unwrap(), Bbox::new(68.0, -165.0, 71.5, -150.0));
        assert!(temporal.unwrap().0.starts_with("2015-01-01"));
    }

    #[test]
    fn catalog_urls_and_dois_validate() {
        let mut adc = ArcticDataCenter::new().unwrap();
        assert!(tokio_test::block_on(adc.validate("10.18739/A2KW57K57")).unwrap());

        let mut adc = ArcticDataCenter::new().unwrap();
        assert!(tokio_test::block_on(
            adc.validate("https://arcticdata.io/catalog/view/doi%3A10.18739%2FA2KW57K57")
        )
        .unwrap());
        assert_eq!(adc.doi.as_deref(), Some("10.18739/A2KW57K57"));
    }
}
