use super::client::{extract_doi, ProviderClient};
use super::opara::uuid_pattern;
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const CSW_BASE: &str = "https://geoportal.bgr.de/smartfindersdi-csw/api";
const DOI_PREFIX: &str = "10.25928";

/// BGR's geoportal speaks CSW 2.0.2 with ISO 19139 records; the geographic
/// bounding box and temporal extent are pulled out of the XML response.
/// bare UUIDs are accepted, so this adapter is registered ahead of Opara.
pub struct Bgr {
    client: ProviderClient,
    record_uuid: Option<String>,
    doi: Option<String>,
}

fn portal_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)geoportal\.bgr\.de/.*(?:datasets/portal/|Id=)([0-9a-f-]{36})")
            .expect("static pattern")
    })
}

fn iso_decimal(xml: &str, tag: &str) -> Option<f64> {
    let pattern = format!(
        r"(?is)<gmd:{}>\s*<gco:Decimal>\s*([-0-9.]+)\s*</gco:Decimal>",
        tag
    );
    Regex::new(&pattern)
        .ok()?
        .captures(xml)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

fn iso_temporal(xml: &str) -> Option<(String, String)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)<gml:beginPosition>\s*([0-9T:.Z+-]+?)\s*</gml:beginPosition>.*?<gml:endPosition>\s*([0-9T:.Z+-]*?)\s*</gml:endPosition>",
        )
        .expect("static pattern")
    });
    let captures = re.captures(xml)?;
    let start = String::from(&captures[1]);
    let end = if captures[2].is_empty() {
        start.clone()
    } else {
        String::from(&captures[2])
    };
    Some((start, end))
}

fn iso_title(xml: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<gmd:title>\s*<gco:CharacterString>(.*?)</gco:CharacterString>")
            .expect("static pattern")
    });
    re.captures(xml).map(|c| String::from(c[1].trim()))
}

/// extracts the ISO 19139 bounding box (west/east/south/north decimals).
fn iso_bbox(xml: &str) -> Option<Bbox> {
    let west = iso_decimal(xml, "westBoundLongitude")?;
    let east = iso_decimal(xml, "eastBoundLongitude")?;
    let south = iso_decimal(xml, "southBoundLatitude")?;
    let north = iso_decimal(xml, "northBoundLatitude")?;
    Some(Bbox::new(south, west, north, east))
}

impl Bgr {
    pub fn new() -> Result<Bgr> {
        Ok(Bgr {
            client: ProviderClient::new()?,
            record_uuid: None,
            doi: None,
        })
    }

    async fn record_xml(&mut self) -> Result<String> {
        if self.record_uuid.is_none() {
            // the DOI landing page is the portal entry; resolve to find the uuid
            let doi = self
                .doi
                .clone()
                .ok_or_else(|| ExtentError::provider("BGR", "provider not validated"))?;
            let url = self.client.resolve_url(&doi).await;
            match portal_url_pattern().captures(&url) {
                Some(captures) => self.record_uuid = Some(captures[1].to_lowercase()),
                None => {
                    return Err(ExtentError::provider(
                        "BGR",
                        format!("DOI {} did not resolve to a geoportal record", doi),
                    ))
                }
            }
        }
        let uuid = self.record_uuid.as_deref().expect("set above");
        let url = format!(
            "{}?Service=CSW&Request=GetRecordById&Version=2.0.2&outputSchema=http://www.isotc211.org/2005/gmd&ElementSetName=full&Id={}",
            CSW_BASE, uuid
        );
        self.client.get_text(&url, "BGR").await
    }
}

#[async_trait]
impl Provider for Bgr {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "BGR",
            description: "The BGR geoportal of the German Federal Institute for \
                          Geosciences and Natural Resources serves geological and \
                          hydrogeological metadata over CSW 2.0.2.",
            website: "https://geoportal.bgr.de/",
            supported_identifiers: vec![
                "https://geoportal.bgr.de/mapapps/resources/apps/geoportal/index.html#/datasets/portal/{uuid}",
                "https://doi.org/10.25928/{id}",
                "10.25928/{id}",
                "{uuid}",
            ],
            doi_prefixes: vec!["10.25928"],
            examples: vec![
                "10.25928/HK1000",
                "b73b55f1-14ec-4b7c-aa59-49b997ce7bbd",
            ],
            notes: Some("ISO 19115/19139 metadata; accepts bare record UUIDs."),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let reference = reference.trim();
        if let Some(captures) = portal_url_pattern().captures(reference) {
            self.record_uuid = Some(captures[1].to_lowercase());
            return Ok(true);
        }
        if uuid_pattern().is_match(reference) {
            self.record_uuid = Some(reference.to_lowercase());
            return Ok(true);
        }
        match extract_doi(reference) {
            Some(doi) if doi.starts_with(DOI_PREFIX) => {
                self.doi = Some(doi);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        let xml = self.record_xml().await?;
        let mut extent = Extent::new("remote");
        if let Some(bbox) = iso_bbox(&xml).filter(|b| b.is_valid_wgs84()) {
            extent.bbox = Some(bbox);
            extent.crs = Some(WGS84_EPSG.to_string());
        }
        extent.tbox = iso_temporal(&xml)
            .and_then(|(s, e)| Some(Tbox::new(dates::parse_date(&s)?, dates::parse_date(&e)?)));
        Ok(if extent.has_extent() { Some(extent) } else { None })
    }

    async fn download(&mut self, target: &Path, _opts: &RemoteOptions) -> Result<()> {
        let xml = self.record_xml().await?;
        let id = self
            .record_uuid
            .clone()
            .or_else(|| self.doi.clone())
            .unwrap_or_default();

        let mut content = SidecarContent::new("BGR", id);
        content.title = iso_title(&xml);
        if let Some(bbox) = iso_bbox(&xml) {
            content.geometries = vec![SidecarContent::bbox_geometry(
                bbox.min_lat,
                bbox.min_lon,
                bbox.max_lat,
                bbox.max_lon,
            )];
        }
        content.temporal = iso_temporal(&xml);
        if sidecar::write_sidecar(target, "bgr", &content)?.is_none() {
            log::warn!("BGR record has no geographic bounding box in its ISO metadata");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <gmd:MD_Metadata>
          <gmd:title><gco:CharacterString>Hydrogeological map</gco:CharacterString></gmd:title>
          <gmd:EX_GeographicBoundingBox>
            <gmd:westBoundLongitude><gco:Decimal>5.8</gco:Decimal></gmd:westBoundLongitude>
            <gmd:eastBoundLongitude><gco:Decimal>15.1</gco:Decimal></gmd:eastBoundLongitude>
            <gmd:southBoundLatitude><gco:Decimal>47.2</gco:Decimal></gmd:southBoundLatitude>
            <gmd:northBoundLatitude><gco:Decimal>55.1</gco:Decimal></gmd:northBoundLatitude>
          </gmd:EX_GeographicBoundingBox>
          <gml:TimePeriod>
            <gml:beginPosition>2000-01-01</gml:beginPosition>
            <gml:endPosition>2016-12-31</gml:endPosition>
          </gml:TimePeriod>
        </gmd:MD_Metadata>"#;

    #[test]
    fn iso_bbox_and_temporal_extraction() {
        let bbox = iso_bbox(SAMPLE).unwrap();
        assert_eq!(bbox, Bbox::new(47.2, 5.8, 55.1, 15.1));
        let (start, end) = iso_temporal(SAMPLE).unwrap();
        assert_eq!(start, "2000-01-01");
        assert_eq!(end, "2016-12-31");
        assert_eq!(iso_title(SAMPLE).as_deref(), Some("Hydrogeological map"));
    }

    #[test]
    fn uuid_doi_and_portal_validation() {
        let mut bgr = Bgr::new().unwrap();
        assert!(tokio_test::block_on(
            bgr.validate("b73b55f1-14ec-4b7c-aa59-49b997ce7bbd")
        )
        .unwrap());

        let mut bgr = Bgr::new().unwrap();
        assert!(tokio_test::block_on(bgr.validate("10.25928/HK1000")).unwrap());

        let mut bgr = Bgr::new().unwrap();
        assert!(tokio_test::block_on(bgr.validate(
            "https://geoportal.bgr.de/mapapps/resources/apps/geoportal/index.html?lang=en#/datasets/portal/b73b55f1-14ec-4b7c-aa59-49b997ce7bbd"
        ))
        .unwrap());

        let mut bgr = Bgr::new().unwrap();
        assert!(!tokio_test::block_on(bgr.validate("10.5281/zenodo.1")).unwrap());
    }
}
