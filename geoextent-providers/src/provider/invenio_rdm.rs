use super::client::ProviderClient;
use super::sidecar::{self, SidecarContent};
use super::{Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Bbox, Extent, Tbox, WGS84_EPSG};
use geoextent_core::ops::dates;
use geoextent_download::ops::{engine, select};
use geoextent_download::FileDescriptor;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

/// one registered Invenio-RDM installation.
pub struct InstanceConfig {
    pub host_key: &'static str,
    pub api: &'static str,
    pub doi_prefixes: &'static [&'static str],
    pub name: &'static str,
    pub hostnames: &'static [&'static str],
}

/// registry of known Invenio-RDM instances. zenodo.org is listed here for
/// the Zenodo adapter, which embeds the same worker but restricts its
/// validation to this single entry.
pub static INVENIORDM_INSTANCES: [InstanceConfig; 12] = [
    InstanceConfig {
        host_key: "zenodo.org",
        api: "https://zenodo.org/api/records/",
        doi_prefixes: &["10.5281/zenodo"],
        name: "Zenodo",
        hostnames: &[
            "https://zenodo.org/records/",
            "https://zenodo.org/record/",
            "https://zenodo.org/api/records/",
        ],
    },
    InstanceConfig {
        host_key: "data.caltech.edu",
        api: "https://data.caltech.edu/api/records/",
        doi_prefixes: &["10.22002"],
        name: "CaltechDATA",
        hostnames: &["https://data.caltech.edu/records/"],
    },
    InstanceConfig {
        host_key: "researchdata.tuwien.ac.at",
        api: "https://researchdata.tuwien.ac.at/api/records/",
        doi_prefixes: &["10.48436"],
        name: "TU Wien Research Data",
        hostnames: &["https://researchdata.tuwien.ac.at/records/"],
    },
    InstanceConfig {
        host_key: "freidata.uni-freiburg.de",
        api: "https://freidata.uni-freiburg.de/api/records/",
        doi_prefixes: &["10.60493"],
        name: "Frei-Data",
        hostnames: &["https://freidata.uni-freiburg.de/records/"],
    },
    InstanceConfig {
        host_key: "gkhub.earthobservations.org",
        api: "https://gkhub.earthobservations.org/api/records/",
        doi_prefixes: &["10.60566"],
        name: "GEO Knowledge Hub",
        hostnames: &["https://gkhub.earthobservations.org/records/"],
    },
    InstanceConfig {
        host_key: "repository.tugraz.at",
        api: "https://repository.tugraz.at/api/records/",
        doi_prefixes: &["10.3217"],
        name: "TU Graz Repository",
        hostnames: &["https://repository.tugraz.at/records/"],
    },
    InstanceConfig {
        host_key: "archive.materialscloud.org",
        api: "https://archive.materialscloud.org/api/records/",
        doi_prefixes: &["10.24435"],
        name: "Materials Cloud Archive",
        hostnames: &["https://archive.materialscloud.org/records/"],
    },
    InstanceConfig {
        host_key: "fdat.uni-tuebingen.de",
        api: "https://fdat.uni-tuebingen.de/api/records/",
        doi_prefixes: &["10.57754"],
        name: "FDAT",
        hostnames: &["https://fdat.uni-tuebingen.de/records/"],
    },
    InstanceConfig {
        host_key: "archive.nfdi4plants.org",
        api: "https://archive.nfdi4plants.org/api/records/",
        doi_prefixes: &["10.60534"],
        name: "DataPLANT ARChive",
        hostnames: &["https://archive.nfdi4plants.org/records/"],
    },
    InstanceConfig {
        host_key: "datarepository.kth.se",
        api: "https://datarepository.kth.se/api/records/",
        doi_prefixes: &["10.71775"],
        name: "KTH Data Repository",
        hostnames: &["https://datarepository.kth.se/records/"],
    },
    InstanceConfig {
        host_key: "prism.northwestern.edu",
        api: "https://prism.northwestern.edu/api/records/",
        doi_prefixes: &["10.18131"],
        name: "Prism",
        hostnames: &["https://prism.northwestern.edu/records/"],
    },
    InstanceConfig {
        host_key: "ultraviolet.library.nyu.edu",
        api: "https://ultraviolet.library.nyu.edu/api/records/",
        doi_prefixes: &["10.58153"],
        name: "NYU Ultraviolet",
        hostnames: &["https://ultraviolet.library.nyu.edu/records/"],
    },
];

/// record IDs are numeric (Zenodo legacy), alphanumeric slugs, or dotted
/// versions (Materials Cloud).
pub fn record_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?i)[a-z0-9][-a-z0-9.]*$").expect("static pattern"))
}

pub fn find_instance(url: &str) -> Option<&'static InstanceConfig> {
    INVENIORDM_INSTANCES
        .iter()
        .find(|config| config.hostnames.iter().any(|prefix| url.starts_with(prefix)))
}

/// the working half of every Invenio-RDM-family adapter: record lookup,
/// file listing across the platform's format generations, metadata
/// parsing, and the engine-backed download. adapters embed one of these
/// and contribute only their own validation.
pub struct InvenioRdmWorker {
    pub client: ProviderClient,
    pub instance: Option<&'static InstanceConfig>,
    pub record_id: Option<String>,
    record: Option<Value>,
}

impl InvenioRdmWorker {
    pub fn new() -> Result<InvenioRdmWorker> {
        Ok(InvenioRdmWorker {
            client: ProviderClient::new()?,
            instance: None,
            record_id: None,
            record: None,
        })
    }

    pub fn display_name(&self) -> &'static str {
        self.instance.map(|i| i.name).unwrap_or("InvenioRDM")
    }

    /// matches a resolved URL against the instance registry and captures
    /// the trailing record ID.
    pub fn validate_url(&mut self, url: &str) -> bool {
        let config = match find_instance(url) {
            Some(config) => config,
            None => return false,
        };
        let record_id = url.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        if record_id_pattern().is_match(record_id) {
            self.instance = Some(config);
            self.record_id = Some(String::from(record_id));
            true
        } else {
            false
        }
    }

    fn api_base(&self) -> Result<&'static str> {
        self.instance
            .map(|i| i.api)
            .ok_or_else(|| ExtentError::provider("InvenioRDM", "provider not validated"))
    }

    fn record_id(&self) -> Result<&str> {
        self.record_id
            .as_deref()
            .ok_or_else(|| ExtentError::provider("InvenioRDM", "provider not validated"))
    }

    /// GET /api/records/{id}, cached for the lifetime of the instance.
    pub async fn metadata(&mut self) -> Result<&Value> {
        if self.record.is_none() {
            let url = format!("{}{}", self.api_base()?, self.record_id()?);
            let record = self
                .client
                .get_json(&url, self.display_name())
                .await
                .map_err(|e| match e {
                    ExtentError::AccessDenied { .. } => e,
                    other => ExtentError::provider(
                        self.display_name(),
                        format!(
                            "record {} does not exist or is not accessible: {}",
                            self.record_id.as_deref().unwrap_or("?"),
                            other
                        ),
                    ),
                })?;
            self.record = Some(record);
        }
        Ok(self.record.as_ref().expect("populated above"))
    }

    /// file descriptors across the platform's wire-format generations:
    /// a legacy array with `links.self`, the current `entries` map with
    /// `links.content`, or a separate /files call as last resort.
    pub async fn files(&mut self) -> Result<Vec<FileDescriptor>> {
        let record = self.metadata().await?.clone();
        let mut files = parse_files_value(record.get("files"));
        if files.is_empty() {
            let url = format!("{}{}/files", self.api_base()?, self.record_id()?);
            match self.client.get_json(&url, self.display_name()).await {
                Ok(listing) => files = parse_files_value(Some(&listing)),
                Err(e) => log::warn!("failed to fetch the files endpoint: {}", e),
            }
        }
        Ok(files)
    }

    /// GeoJSON geometries from metadata.locations.features[].
    pub fn parse_locations(record: &Value) -> Vec<Value> {
        record["metadata"]["locations"]["features"]
            .as_array()
            .map(|features| {
                features
                    .iter()
                    .filter_map(|feature| {
                        let geometry = feature.get("geometry")?;
                        if geometry.get("type").is_some() && geometry.get("coordinates").is_some() {
                            Some(geometry.clone())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// temporal coverage from metadata.dates[] (EDTF, possibly a range) or
    /// the publication date.
    pub fn parse_temporal(record: &Value) -> Option<(String, String)> {
        if let Some(entries) = record["metadata"]["dates"].as_array() {
            for entry in entries {
                let date = entry["date"].as_str().unwrap_or("").trim();
                if date.is_empty() {
                    continue;
                }
                return Some(match date.split_once('/') {
                    Some((start, end)) => (String::from(start.trim()), String::from(end.trim())),
                    None => (String::from(date), String::from(date)),
                });
            }
        }
        let published = record["metadata"]["publication_date"].as_str()?;
        let date = published.get(..10).unwrap_or(published);
        Some((String::from(date), String::from(date)))
    }

    pub async fn extent_from_metadata(&mut self) -> Result<Option<Extent>> {
        let record = self.metadata().await?.clone();
        let geometries = Self::parse_locations(&record);
        let temporal = Self::parse_temporal(&record);

        let mut extent = Extent::new("remote");
        if let Some(bbox) = bbox_of_geometries(&geometries) {
            if bbox.is_valid_wgs84() {
                extent.bbox = Some(bbox);
                extent.crs = Some(WGS84_EPSG.to_string());
            }
        }
        extent.tbox = temporal.as_ref().and_then(|(start, end)| {
            Some(Tbox::new(
                dates::parse_date(start)?,
                dates::parse_date(end)?,
            ))
        });

        if extent.has_extent() {
            Ok(Some(extent))
        } else {
            Ok(None)
        }
    }

    /// metadata-only path: one sidecar from locations and dates.
    pub async fn download_metadata_only(&mut self, target: &Path) -> Result<()> {
        let record = self.metadata().await?.clone();
        let mut content = SidecarContent::new(
            self.display_name(),
            self.record_id.clone().unwrap_or_default(),
        );
        content.title = record["metadata"]["title"].as_str().map(String::from);
        content.geometries = Self::parse_locations(&record);
        content.temporal = Self::parse_temporal(&record);
        if sidecar::write_sidecar(target, "inveniordm", &content)?.is_none() {
            log::warn!(
                "{} record {} has no geolocation or temporal coverage in metadata, \
                 consider downloading the data files",
                self.display_name(),
                self.record_id.as_deref().unwrap_or("?")
            );
        }
        Ok(())
    }

    pub async fn download(&mut self, target: &Path, opts: &RemoteOptions) -> Result<()> {
        if !opts.download_data {
            return self.download_metadata_only(target).await;
        }

        let files = self.files().await?;
        if files.is_empty() {
            log::warn!(
                "no files found in {} record {}",
                self.display_name(),
                self.record_id.as_deref().unwrap_or("?")
            );
            return Ok(());
        }

        let selection = select::select_files(&files, &opts.download);
        if selection.selected.is_empty() {
            log::warn!("no files can be downloaded within the size limit");
            return Ok(());
        }

        log::info!(
            "starting download of {} files from {} record {}",
            selection.selected.len(),
            self.display_name(),
            self.record_id.as_deref().unwrap_or("?")
        );
        engine::download_batch(
            &self.client.http,
            &selection.selected,
            target,
            &opts.download,
        )
        .await?;
        Ok(())
    }
}

fn parse_files_value(files: Option<&Value>) -> Vec<FileDescriptor> {
    let mut result = vec![];
    match files {
        // legacy: an array of file objects with links.self
        Some(Value::Array(entries)) => {
            for entry in entries {
                let url = entry["links"]["self"].as_str();
                let name = entry["key"].as_str().or_else(|| {
                    url.and_then(|u| u.trim_end_matches('/').rsplit('/').nth(1))
                });
                let size = entry["size"].as_u64().unwrap_or(0);
                if let (Some(url), Some(name)) = (url, name) {
                    result.push(FileDescriptor::new(name, url, size));
                }
            }
        }
        // current: an object with an entries map keyed by filename
        Some(obj @ Value::Object(_)) => {
            let entries = &obj["entries"];
            if let Some(map) = entries.as_object() {
                for (name, entry) in map {
                    let url = entry["links"]["content"].as_str();
                    let size = entry["size"].as_u64().unwrap_or(0);
                    if let Some(url) = url {
                        result.push(FileDescriptor::new(name, url, size));
                    }
                }
            } else if let Some(list) = entries.as_array() {
                for entry in list {
                    let url = entry["links"]["content"]
                        .as_str()
                        .or_else(|| entry["links"]["self"].as_str());
                    let name = entry["key"].as_str().unwrap_or("unknown");
                    let size = entry["size"].as_u64().unwrap_or(0);
                    if let Some(url) = url {
                        result.push(FileDescriptor::new(name, url, size));
                    }
                }
            }
        }
        _ => {}
    }
    result
}

fn bbox_of_geometries(geometries: &[Value]) -> Option<Bbox> {
    let mut points = vec![];
    for geometry in geometries {
        collect_coordinates(&geometry["coordinates"], &mut points);
    }
    Bbox::from_points(points)
}

/// walks arbitrarily nested GeoJSON coordinate arrays, collecting (lon,
/// lat) pairs.
fn collect_coordinates(value: &Value, points: &mut Vec<(f64, f64)>) {
    match value {
        Value::Array(items) => {
            if items.len() >= 2 && items[0].is_number() && items[1].is_number() {
                if let (Some(lon), Some(lat)) = (items[0].as_f64(), items[1].as_f64()) {
                    points.push((lon, lat));
                }
            } else {
                for item in items {
                    collect_coordinates(item, points);
                }
            }
        }
        _ => {}
    }
}

/// generic adapter for the non-Zenodo instances; Zenodo has its own entry
/// with a stricter validator.
pub struct InvenioRdm {
    worker: InvenioRdmWorker,
}

impl InvenioRdm {
    pub fn new() -> Result<InvenioRdm> {
        Ok(InvenioRdm {
            worker: InvenioRdmWorker::new()?,
        })
    }
}

#[async_trait]
impl Provider for InvenioRdm {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "InvenioRDM",
            description: "Generic provider for InvenioRDM-based research data repositories; \
                          matches every registered institutional instance of the platform.",
            website: "https://inveniosoftware.org/products/rdm/",
            supported_identifiers: vec![
                "https://{instance}/records/{record_id}",
                "https://doi.org/{doi_prefix}/{record_id}",
                "{doi_prefix}/{record_id}",
            ],
            doi_prefixes: INVENIORDM_INSTANCES
                .iter()
                .filter(|i| i.host_key != "zenodo.org")
                .flat_map(|i| i.doi_prefixes.iter().copied())
                .collect(),
            examples: vec![
                "10.22002/D1.1705",
                "https://data.caltech.edu/records/0ca1t-hzt77",
                "10.48436/jpzv9-c8w75",
            ],
            notes: Some(
                "Handles S3 redirect bodies, presigned-URL responses, and direct binary \
                 downloads across instances. Supports metadata extraction from \
                 metadata.locations and metadata.dates.",
            ),
        }
    }

    fn name(&self) -> String {
        String::from(self.worker.display_name())
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        let url = self.worker.client.resolve_url(reference).await;
        Ok(self.worker.validate_url(&url))
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
    use serde_json::json;

    #[test]
    fn url_validation_matches_registered_instances() {
        let mut worker = InvenioRdmWorker::new().unwrap();
        assert!(worker.validate_url("https://data.caltech.edu/records/0ca1t-hzt77"));
        assert_eq!(worker.display_name(), "CaltechDATA");
        assert_eq!(worker.record_id.as_deref(), Some("0ca1t-hzt77"));

        let mut worker = InvenioRdmWorker::new().unwrap();
        assert!(!worker.validate_url("https://example.org/records/123"));
        assert!(worker.instance.is_none());
    }

    #[test]
    fn record_ids_cover_all_generations() {
        let pattern = record_id_pattern();
        for id in ["820562", "0ca1t-hzt77", "2022.126", "jpzv9-c8w75"] {
            assert!(pattern.is_match(id), "{} should be a record id", id);
        }
        assert!(!pattern.is_match("-leading-dash"));
        assert!(!pattern.is_match("has space"));
    }

    #[test]
    fn legacy_file_array_uses_links_self() {
        let files = json!([
            {"key": "map.tif", "size": 123, "links": {"self": "https://zenodo.org/api/files/x/map.tif"}},
            {"links": {}},
        ]);
        let parsed = parse_files_value(Some(&files));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "map.tif");
        assert_eq!(parsed[0].size, 123);
    }

    #[test]
    fn entries_map_uses_links_content() {
        let files = json!({
            "enabled": true,
            "entries": {
                "data.gpkg": {"size": 42, "links": {"content": "https://x/api/records/1/files/data.gpkg/content"}},
            },
        });
        let parsed = parse_files_value(Some(&files));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "data.gpkg");
        assert_eq!(parsed[0].url, "https://x/api/records/1/files/data.gpkg/content");
    }

    #[test]
    fn locations_and_dates_yield_a_metadata_extent() {
        let record = json!({
            "metadata": {
                "title": "test",
                "locations": {"features": [
                    {"geometry": {"type": "Point", "coordinates": [13.4, 52.5]}},
                    {"geometry": {"type": "Polygon", "coordinates": [[[7.6, 51.9], [7.65, 51.9], [7.65, 51.98], [7.6, 51.9]]]}},
                ]},
                "dates": [{"date": "2015/2018", "type": {"id": "collected"}}],
            },
        });
        let geometries = InvenioRdmWorker::parse_locations(&record);
        assert_eq!(geometries.len(), 2);
        let bbox = bbox_of_geometries(&geometries).unwrap();
        assert_eq!(bbox, Bbox::new(51.9, 7.6, 52.5, 13.4));
        assert_eq!(
            InvenioRdmWorker::parse_temporal(&record),
            Some((String::from("2015"), String::from("2018")))
        );
    }

    #[test]
    fn publication_date_is_the_temporal_fallback() {
        let record = json!({
            "metadata": {"publication_date": "2020-06-01"},
        });
        assert_eq!(
            InvenioRdmWorker::parse_temporal(&record),
            Some((String::from("2020-06-01"), String::from("2020-06-01")))
        );
    }
}
