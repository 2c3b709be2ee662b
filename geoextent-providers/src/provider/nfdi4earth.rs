use super::client::ProviderClient;
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::follow;
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geo::BoundingRect;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, Followed, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use wkt::TryFromWkt;

const SPARQL_ENDPOINT: &str = "https://sparql.knowledgehub.nfdi4earth.de";
const CORDRA_BASE: &str = "https://cordra.knowledgehub.nfdi4earth.de";

const SPARQL_QUERY: &str = "\
PREFIX dct: <http://purl.org/dc/terms/>
PREFIX locn: <http://www.w3.org/ns/locn#>
PREFIX dcat: <http://www.w3.org/ns/dcat#>

SELECT ?title ?geometry ?startDate ?endDate ?landingPage
WHERE {
  <IRI> dct:title ?title .
  OPTIONAL { <IRI> dct:spatial ?spatial . ?spatial locn:geometry ?geometry }
  OPTIONAL { <IRI> dct:temporal ?temporal .
             ?temporal dcat:startDate ?startDate .
             ?temporal dcat:endDate ?endDate }
  OPTIONAL { <IRI> dcat:landingPage ?landingPage }
}";

/// normalized metadata of one Knowledge Hub object, however it was fetched.
#[derive(Clone, Debug, Default)]
struct HubMetadata {
    title: Option<String>,
    geometry_wkt: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    landing_page: Option<String>,
}

/// the NFDI4Earth Knowledge Hub is a Cordra-based registry for Earth
/// System Sciences with a SPARQL endpoint; records point at data hosted
/// elsewhere via their landing page.
pub struct Nfdi4Earth {
    client: ProviderClient,
    cordra_id: Option<String>,
    followed: Option<Followed>,
    metadata_tbox: Option<Tbox>,
}

fn onestop4all_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)https?://onestop4all\.nfdi4earth\.de/result/([\w-]+)/?$")
            .expect("static pattern")
    })
}

fn cordra_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)https?://cordra\.knowledgehub\.(?:nfdi4earth\.de|test\.n4e\.geo\.tu-dresden\.de)/objects/(n4e/[\w-]+)/?$",
        )
        .expect("static pattern")
    })
}

impl Nfdi4Earth {
    pub fn new() -> Result<Nfdi4Earth> {
        Ok(Nfdi4Earth {
            client: ProviderClient::new()?,
            cordra_id: None,
            followed: None,
            metadata_tbox: None,
        })
    }

    fn cordra_id(&self) -> Result<&str> {
        self.cordra_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("NFDI4Earth", "provider not validated"))
    }

    fn cordra_iri(&self) -> Result<String> {
        Ok(format!("{}/objects/{}", CORDRA_BASE, self.cordra_id()?))
    }

    async fn fetch_sparql(&self) -> Result<Option<HubMetadata>> {
        let query = SPARQL_QUERY.replace("IRI", &self.cordra_iri()?);
        let url = format!(
            "{}?query={}&format=json",
            SPARQL_ENDPOINT,
            super::client::urlencode(&query)
        );
        let response = self.client.get_json(&url, "NFDI4Earth").await?;
        let bindings = match response["results"]["bindings"].as_array() {
            Some(bindings) if !bindings.is_empty() => bindings.clone(),
            _ => return Ok(None),
        };

        let mut metadata = HubMetadata::default();
        for row in &bindings {
            let value = |key: &str| row[key]["value"].as_str().map(String::from);
            metadata.title = metadata.title.or_else(|| value("title"));
            metadata.geometry_wkt = metadata.geometry_wkt.or_else(|| value("geometry"));
            metadata.start_date = metadata.start_date.or_else(|| value("startDate"));
            metadata.end_date = metadata.end_date.or_else(|| value("endDate"));
            metadata.landing_page = metadata.landing_page.or_else(|| value("landingPage"));
        }
        Ok(Some(metadata))
    }

    async fn fetch_cordra(&self) -> Result<HubMetadata> {
        let data = self
            .client
            .get_json(&self.cordra_iri()?, "NFDI4Earth")
            .await?;
        let mut metadata = HubMetadata {
            title: data["title"]
                .as_str()
                .or_else(|| data["name"].as_str())
                .map(String::from),
            geometry_wkt: data["spatialCoverage"]["geometry"].as_str().map(String::from),
            landing_page: data["landingPage"].as_str().map(String::from),
            ..Default::default()
        };
        match &data["temporal"] {
            Value::Array(entries) => {
                for entry in entries {
                    metadata.start_date = metadata
                        .start_date
                        .or_else(|| entry["startDate"].as_str().map(String::from));
                    metadata.end_date = metadata
                        .end_date
                        .or_else(|| entry["endDate"].as_str().map(String::from));
                }
            }
            Value::Object(_) => {
                metadata.start_date = data["temporal"]["startDate"].as_str().map(String::from);
                metadata.end_date = data["temporal"]["endDate"].as_str().map(String::from);
            }
            _ => {}
        }
        Ok(metadata)
    }

    /// SPARQL first, Cordra REST as fallback.
    async fn fetch_metadata(&self) -> Result<HubMetadata> {
        match self.fetch_sparql().await {
            Ok(Some(metadata)) => {
                log::debug!("NFDI4Earth: metadata retrieved via SPARQL");
                return Ok(metadata);
            }
            Ok(None) => {}
            Err(e) => log::warn!(
                "NFDI4Earth: SPARQL endpoint failed ({}), trying Cordra REST fallback",
                e
            ),
        }
        self.fetch_cordra().await
    }

    fn temporal_of(metadata: &HubMetadata) -> Option<(String, String)> {
        let start = metadata.start_date.as_deref()?;
        let end = metadata.end_date.as_deref().unwrap_or(start);
        Some((String::from(start), String::from(end)))
    }

    fn tbox_of(metadata: &HubMetadata) -> Option<Tbox> {
        let (start, end) = Self::temporal_of(metadata)?;
        Some(Tbox::new(
            dates::parse_date(&start)?,
            dates::parse_date(&end)?,
        ))
    }
}

#[async_trait]
impl Provider for Nfdi4Earth {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "NFDI4Earth",
            description: "The NFDI4Earth Knowledge Hub is a Cordra-based registry for \
                          Earth System Sciences, queried through its SPARQL endpoint; \
                          the OneStop4All portal fronts it.",
            website: "https://onestop4all.nfdi4earth.de/",
            supported_identifiers: vec![
                "https://onestop4all.nfdi4earth.de/result/{id}",
                "https://cordra.knowledgehub.nfdi4earth.de/objects/n4e/{id}",
                "n4e/{id}",
            ],
            doi_prefixes: vec![],
            examples: vec![
                "https://onestop4all.nfdi4earth.de/result/dataset-a1b2c3",
                "https://cordra.knowledgehub.nfdi4earth.de/objects/n4e/dataset-a1b2c3",
            ],
            notes: Some(
                "Metadata-only registry; landing pages pointing at supported \
                 repositories are followed when enabled.",
            ),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let reference = reference.trim();
        if let Some(captures) = cordra_url_pattern().captures(reference) {
            self.cordra_id = Some(String::from(&captures[1]));
            return Ok(true);
        }
        if let Some(captures) = onestop4all_pattern().captures(reference) {
            self.cordra_id = Some(format!("n4e/{}", &captures[1]));
            return Ok(true);
        }
        if let Some(id) = reference.strip_prefix("n4e/") {
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                self.cordra_id = Some(String::from(reference));
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn metadata_extent(&mut self, _opts: &RemoteOptions) -> Result<Option<Extent>> {
        let metadata = self.fetch_metadata().await?;
        let mut extent = Extent::new("remote");

        if let Some(wkt) = &metadata.geometry_wkt {
            if let Ok(geometry) = geo_types::Geometry::<f64>::try_from_wkt_str(wkt) {
                if let Some(rect) = geometry.bounding_rect() {
                    let bbox = Bbox::from_corners(
                        (rect.min().x, rect.min().y),
                        (rect.max().x, rect.max().y),
                    );
                    if bbox.is_valid_wgs84() {
                        extent.bbox = Some(bbox);
                        extent.crs = Some(WGS84_EPSG.to_string());
                    }
                }
            }
        }
        extent.tbox = Self::tbox_of(&metadata);
        self.metadata_tbox = extent.tbox;
        Ok(if extent.has_extent() { Some(extent) } else { None })
    }

    async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        let metadata = self.fetch_metadata().await?;
        self.metadata_tbox = Self::tbox_of(&metadata);

        if opts.follow && opts.download_data {
            if let Some(landing_page) = metadata.landing_page.clone() {
                if let Some(followed) =
                    follow::try_follow(&[landing_page], "NFDI4Earth", target, opts).await
                {
                    self.followed = Some(followed);
                    return Ok(());
                }
                log::info!("NFDI4Earth: landing page could not be followed, using own metadata");
            }
        }

        let mut content = SidecarContent::new("NFDI4Earth", self.cordra_id()?.to_string());
        content.title = metadata.title.clone();
        if let Some(wkt) = &metadata.geometry_wkt {
            if let Ok(geometry) = geo_types::Geometry::<f64>::try_from_wkt_str(wkt) {
                let converted = geojson::Geometry::new(geojson::Value::from(&geometry));
                if let Ok(value) = serde_json::to_value(converted) {
                    content.geometries = vec![value];
                }
            } else {
                log::warn!("NFDI4Earth: failed to parse WKT geometry from metadata");
            }
        }
        content.temporal = Self::temporal_of(&metadata);
        if sidecar::write_sidecar(target, "nfdi4earth", &content)?.is_none() {
            log::warn!(
                "NFDI4Earth object {} has no spatial or temporal metadata",
                self.cordra_id()?
            );
        }
        Ok(())
    }

    fn followed(&self) -> Option<Followed> {
        self.followed.clone()
    }

    fn metadata_tbox(&self) -> Option<Tbox> {
        self.metadata_tbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_forms_resolve_to_cordra_ids() {
        let mut hub = Nfdi4Earth::new().unwrap();
        assert!(tokio_test::block_on(hub.validate(
            "https://cordra.knowledgehub.nfdi4earth.de/objects/n4e/dataset-a1b2c3"
        ))
        .unwrap());
        assert_eq!(hub.cordra_id.as_deref(), Some("n4e/dataset-a1b2c3"));

        let mut hub = Nfdi4Earth::new().unwrap();
        assert!(tokio_test::block_on(
            hub.validate("https://onestop4all.nfdi4earth.de/result/dataset-a1b2c3")
        )
        .unwrap());
        assert_eq!(hub.cordra_id.as_deref(), Some("n4e/dataset-a1b2c3"));

        let mut hub = Nfdi4Earth::new().unwrap();
        assert!(tokio_test::block_on(hub.validate("n4e/dataset-a1b2c3")).unwrap());

        let mut hub = Nfdi4Earth::new().unwrap();
        assert!(!tokio_test::block_on(hub.validate("10.5281/zenodo.1")).unwrap());
    }

    #[test]
    fn temporal_normalization() {
        let metadata = HubMetadata {
            start_date: Some(String::from("2014-08-21")),
            end_date: None,
            ..Default::default()
        };
        assert_eq!(
            Nfdi4Earth::temporal_of(&metadata),
            Some((String::from("2014-08-21"), String::from("2014-08-21")))
        );
    }
}
