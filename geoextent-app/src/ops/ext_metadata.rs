use geoextent_core::error::Result;
use serde_json::{json, Map, Value};

/// which bibliographic registries to query for a DOI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MetadataMethod {
    /// CrossRef first, DataCite as fallback
    #[default]
    Auto,
    /// query both and return every result
    All,
    Crossref,
    Datacite,
}

/// retrieves bibliographic metadata for the DOI embedded in `identifier`.
/// failures are soft: an empty list, not an error; extent extraction does
/// not depend on this.
pub async fn get_external_metadata(identifier: &str, method: MetadataMethod) -> Result<Vec<Value>> {
    let doi = match geoextent_providers::provider::client::extract_doi(identifier) {
        Some(doi) => doi,
        None => {
            log::debug!("no DOI found in identifier {}", identifier);
            return Ok(vec![]);
        }
    };
    let client = geoextent_download::ops::http::build_client()?;

    let mut results = vec![];
    match method {
        MetadataMethod::Auto => {
            if let Some(metadata) = crossref(&client, &doi).await {
                results.push(metadata);
            } else if let Some(metadata) = datacite(&client, &doi).await {
                results.push(metadata);
            }
        }
        MetadataMethod::All => {
            results.extend(crossref(&client, &doi).await);
            results.extend(datacite(&client, &doi).await);
        }
        MetadataMethod::Crossref => results.extend(crossref(&client, &doi).await),
        MetadataMethod::Datacite => results.extend(datacite(&client, &doi).await),
    }

    if results.is_empty() {
        log::warn!("could not retrieve external metadata for DOI {}", doi);
    }
    Ok(results)
}

async fn crossref(client: &reqwest::Client, doi: &str) -> Option<Value> {
    let url = format!("https://api.crossref.org/works/{}", doi);
    let response = geoextent_download::ops::http::get_with_retry(client, &url, false)
        .await
        .ok()?;
    if !response.status().is_success() {
        log::debug!("CrossRef returned {} for {}", response.status(), doi);
        return None;
    }
    let body: Value = response.json().await.ok()?;
    let message = &body["message"];

    let mut metadata = Map::new();
    metadata.insert(String::from("source"), json!("CrossRef"));
    metadata.insert(String::from("doi"), json!(doi));
    if let Some(title) = message["title"][0].as_str() {
        metadata.insert(String::from("title"), json!(title));
    }
    if let Some(authors) = message["author"].as_array() {
        let names: Vec<String> = authors
            .iter()
            .filter_map(|author| {
                let given = author["given"].as_str();
                let family = author["family"].as_str()?;
                Some(match given {
                    Some(given) => format!("{} {}", given, family),
                    None => String::from(family),
                })
            })
            .collect();
        if !names.is_empty() {
            metadata.insert(String::from("authors"), json!(names));
        }
    }
    if let Some(publisher) = message["publisher"].as_str() {
        metadata.insert(String::from("publisher"), json!(publisher));
    }
    if let Some(year) = message["published"]["date-parts"][0][0].as_i64() {
        metadata.insert(String::from("publication_year"), json!(year));
    }
    metadata.insert(
        String::from("url"),
        json!(message["URL"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| format!("https://doi.org/{}", doi))),
    );
    Some(Value::Object(metadata))
}

async fn datacite(client: &reqwest::Client, doi: &str) -> Option<Value> {
    let url = format!("https://api.datacite.org/dois/{}", doi);
    let response = geoextent_download::ops::http::get_with_retry(client, &url, false)
        .await
        .ok()?;
    if !response.status().is_success() {
        log::debug!("DataCite returned {} for {}", response.status(), doi);
        return None;
    }
    let body: Value = response.json().await.ok()?;
    let attributes = &body["data"]["attributes"];

    let mut metadata = Map::new();
    metadata.insert(String::from("source"), json!("DataCite"));
    metadata.insert(String::from("doi"), json!(doi));
    if let Some(title) = attributes["titles"][0]["title"].as_str() {
        metadata.insert(String::from("title"), json!(title));
    }
    if let Some(creators) = attributes["creators"].as_array() {
        let names: Vec<String> = creators
            .iter()
            .filter_map(|creator| creator["name"].as_str().map(String::from))
            .collect();
        if !names.is_empty() {
            metadata.insert(String::from("authors"), json!(names));
        }
    }
    let publisher = attributes["publisher"]
        .as_str()
        .map(String::from)
        .or_else(|| attributes["publisher"]["name"].as_str().map(String::from));
    if let Some(publisher) = publisher {
        metadata.insert(String::from("publisher"), json!(publisher));
    }
    if let Some(year) = attributes["publicationYear"].as_i64() {
        metadata.insert(String::from("publication_year"), json!(year));
    }
    metadata.insert(
        String::from("url"),
        json!(attributes["url"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| format!("https://doi.org/{}", doi))),
    );
    Some(Value::Object(metadata))
}
