use crate::error::{Error, Result};
use crate::http;
use crate::paginator::{self, Page, PageCursor, PageFetcher};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

const SEARCH_QUERY: &str = "@search?b_start=0&portal_type=DataSet&metadata_fields=UID&metadata_fields=dataset_full_format&metadata_fields=dataset_download_information";
const PREPACKAGED_FIELDS: &str = "&metadata_fields=downloadable_files";

/// The download-options key both indexes store their entries under.
pub const ITEMS_OPTION: &str = "items";

/// A dataset listed in the catalog, reduced to what selection needs.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogItem {
    pub uid: String,
    pub title: String,
    pub description: String,
    pub downloads: BTreeMap<String, Vec<DownloadDescriptor>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DownloadDescriptor {
    pub id: String,
    pub name: String,
    pub path: String,
    pub size: String,
    pub format: String,
}

impl CatalogItem {
    pub fn download_count(&self) -> usize {
        self.downloads.get(ITEMS_OPTION).map_or(0, Vec::len)
    }
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    batching: PageCursor,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize, Debug)]
struct SearchItem {
    #[serde(rename = "UID")]
    uid: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    title: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    description: String,
    #[serde(default)]
    dataset_download_information: serde_json::Value,
    #[serde(default)]
    downloadable_files: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct GeneratedDownload {
    #[serde(rename = "@id", default, deserialize_with = "http::null_as_default")]
    id: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    full_path: String,
    // Either a plain string or an object depending on the dataset.
    #[serde(default)]
    full_format: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct PrepackagedFile {
    #[serde(rename = "@id", default, deserialize_with = "http::null_as_default")]
    id: String,
    #[serde(default, deserialize_with = "http::null_as_default")]
    file: String,
    #[serde(default)]
    size: serde_json::Value,
    #[serde(default, deserialize_with = "http::null_as_default")]
    format: String,
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => map
            .get("title")
            .or_else(|| map.get("token"))
            .map(value_text)
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

/// Decodes the list-valued entries of a download-options object; the catalog
/// mixes them with schema metadata, which is skipped.
fn option_lists<T: DeserializeOwned>(uid: &str, value: serde_json::Value) -> Result<BTreeMap<String, Vec<T>>> {
    let serde_json::Value::Object(map) = value else {
        return Ok(BTreeMap::new());
    };
    map.into_iter()
        .filter(|(_, entries)| entries.is_array())
        .map(|(option, entries)| {
            let decoded = serde_json::from_value(entries).map_err(|e| {
                Error::Protocol(format!("invalid download option {option:?} for dataset {uid}: {e}"))
            })?;
            Ok((option, decoded))
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Index {
    Generated,
    Prepackaged,
}

impl SearchItem {
    fn into_catalog_item(self, index: Index) -> Result<CatalogItem> {
        let downloads = match index {
            Index::Generated => option_lists::<GeneratedDownload>(&self.uid, self.dataset_download_information)?
                .into_iter()
                .map(|(option, entries)| {
                    let descriptors = entries
                        .into_iter()
                        .map(|d| DownloadDescriptor {
                            id: d.id,
                            name: d.name,
                            path: d.full_path,
                            size: String::new(),
                            format: value_text(&d.full_format),
                        })
                        .collect();
                    (option, descriptors)
                })
                .collect(),
            Index::Prepackaged => option_lists::<PrepackagedFile>(&self.uid, self.downloadable_files)?
                .into_iter()
                .map(|(option, entries)| {
                    let descriptors = entries
                        .into_iter()
                        .map(|f| DownloadDescriptor {
                            id: f.id,
                            path: f.file.clone(),
                            name: f.file,
                            size: value_text(&f.size),
                            format: f.format,
                        })
                        .collect();
                    (option, descriptors)
                })
                .collect(),
        };
        Ok(CatalogItem {
            uid: self.uid,
            title: self.title,
            description: self.description,
            downloads,
        })
    }
}

/// Fetches catalog search pages over HTTP.
pub struct SearchPages<'a> {
    client: &'a Client,
    index: Index,
}

impl<'a> SearchPages<'a> {
    pub fn new(client: &'a Client, index: Index) -> Self {
        Self { client, index }
    }
}

impl PageFetcher for SearchPages<'_> {
    type Item = CatalogItem;

    async fn fetch_page(&self, url: &str) -> Result<Page<CatalogItem>> {
        let response: SearchResponse = http::get_json(self.client, url, http::accept_json()).await?;
        let items = response
            .items
            .into_iter()
            .map(|item| item.into_catalog_item(self.index))
            .collect::<Result<_>>()?;
        Ok(Page {
            items,
            cursor: response.batching,
        })
    }
}

pub fn search_url(api_url: &str, index: Index) -> String {
    match index {
        Index::Generated => format!("{api_url}{SEARCH_QUERY}"),
        Index::Prepackaged => format!("{api_url}{SEARCH_QUERY}{PREPACKAGED_FIELDS}"),
    }
}

pub async fn fetch_index(client: &Client, api_url: &str, index: Index) -> Result<Vec<CatalogItem>> {
    let url = search_url(api_url, index);
    paginator::fetch_all(&url, &SearchPages::new(client, index)).await
}

pub async fn fetch_generated_index(client: &Client, api_url: &str) -> Result<Vec<CatalogItem>> {
    fetch_index(client, api_url, Index::Generated).await
}

pub async fn fetch_prepackaged_index(client: &Client, api_url: &str) -> Result<Vec<CatalogItem>> {
    fetch_index(client, api_url, Index::Prepackaged).await
}

pub fn find_item<'a>(index: &'a [CatalogItem], uid: &str) -> Result<&'a CatalogItem> {
    index
        .iter()
        .find(|item| item.uid == uid)
        .ok_or_else(|| Error::Protocol(format!("no dataset with UID {uid}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page_body(this: &str, next: &str, last: &str, uids: &[&str]) -> serde_json::Value {
        let items: Vec<_> = uids
            .iter()
            .map(|uid| {
                serde_json::json!({
                    "@id": format!("https://example.org/{uid}"),
                    "UID": uid,
                    "title": format!("Dataset {uid}"),
                    "description": "",
                    "dataset_download_information": {
                        "items": [
                            {"@id": format!("{uid}-raster"), "name": "Raster", "full_path": "Raster/100m",
                             "full_format": {"title": "Geotiff", "token": "Geotiff"}},
                        ]
                    },
                    "downloadable_files": {
                        "schema": {"properties": {}},
                        "items": [
                            {"@id": format!("{uid}-file"), "file": "tile.zip", "size": "1.2 GB", "format": "zip"},
                        ]
                    }
                })
            })
            .collect();
        serde_json::json!({
            "@id": this,
            "batching": {"@id": this, "first": this, "last": last, "next": next},
            "items": items,
            "items_total": 3,
        })
    }

    async fn mount_pages(server: &MockServer) -> String {
        let api = format!("{}/api/", server.uri());
        let first = search_url(&api, Index::Generated);
        let second = format!("{api}@search?b_start=2");
        let last = second.clone();

        Mock::given(method("GET"))
            .and(path("/api/@search"))
            .and(query_param("b_start", "0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(&first, &second, &last, &["a", "b"])),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/@search"))
            .and(query_param("b_start", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(&second, &second, &last, &["c"])),
            )
            .expect(1)
            .mount(server)
            .await;
        api
    }

    #[tokio::test]
    async fn test_fetch_generated_index() {
        let server = MockServer::start().await;
        let api = mount_pages(&server).await;
        let client = http::client("Reclaimer/0.1").unwrap();

        let index = fetch_generated_index(&client, &api).await.unwrap();
        assert_eq!(index.len(), 3);

        let item = find_item(&index, "b").unwrap();
        assert_eq!(item.title, "Dataset b");
        assert_eq!(item.download_count(), 1);
        let option = &item.downloads[ITEMS_OPTION][0];
        assert_eq!(option.id, "b-raster");
        assert_eq!(option.path, "Raster/100m");
        assert_eq!(option.format, "Geotiff");
    }

    #[tokio::test]
    async fn test_prepackaged_descriptors() {
        let server = MockServer::start().await;
        let api = mount_pages(&server).await;
        let client = http::client("Reclaimer/0.1").unwrap();

        let index = fetch_index(&client, &api, Index::Prepackaged).await.unwrap();
        let option = &find_item(&index, "c").unwrap().downloads[ITEMS_OPTION][0];
        assert_eq!(option.id, "c-file");
        assert_eq!(option.name, "tile.zip");
        assert_eq!(option.size, "1.2 GB");
    }

    fn search_item(downloads: serde_json::Value) -> SearchItem {
        serde_json::from_value(serde_json::json!({
            "UID": "u1",
            "title": null,
            "description": null,
            "dataset_download_information": downloads,
        }))
        .unwrap()
    }

    #[test]
    fn test_null_fields_keep_entry() {
        let item = search_item(serde_json::json!({
            "items": [
                {"@id": "u1-a", "name": "Raster", "full_path": "Raster/100m", "full_format": "Geotiff"},
                {"@id": null, "name": null, "full_path": null, "full_format": null},
            ]
        }))
        .into_catalog_item(Index::Generated)
        .unwrap();

        assert_eq!(item.title, "");
        assert_eq!(item.download_count(), 2);
        let blank = &item.downloads[ITEMS_OPTION][1];
        assert_eq!(blank, &DownloadDescriptor::default());
    }

    #[test]
    fn test_null_prepackaged_format() {
        let item: SearchItem = serde_json::from_value(serde_json::json!({
            "UID": "u1",
            "downloadable_files": {
                "items": [{"@id": "f1", "file": "tile.zip", "size": null, "format": null}]
            }
        }))
        .unwrap();
        let item = item.into_catalog_item(Index::Prepackaged).unwrap();
        let file = &item.downloads[ITEMS_OPTION][0];
        assert_eq!(file.name, "tile.zip");
        assert_eq!(file.format, "");
        assert_eq!(file.size, "");
    }

    #[test]
    fn test_undecodable_option_is_reported() {
        let err = search_item(serde_json::json!({"items": [{"@id": "u1-a"}, "Raster"]}))
            .into_catalog_item(Index::Generated)
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ref msg) if msg.contains("u1")));
    }

    #[tokio::test]
    async fn test_bad_option_fails_index_fetch() {
        let server = MockServer::start().await;
        let api = format!("{}/api/", server.uri());
        let url = search_url(&api, Index::Generated);
        Mock::given(method("GET"))
            .and(path("/api/@search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "batching": {"@id": url, "first": url, "last": url, "next": url},
                "items": [{"UID": "u1", "dataset_download_information": {"items": [42]}}],
            })))
            .mount(&server)
            .await;
        let client = http::client("Reclaimer/0.1").unwrap();

        let err = fetch_generated_index(&client, &api).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_find_missing_uid() {
        assert!(matches!(find_item(&[], "nope"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_prepackaged_url_requests_files() {
        let url = search_url("https://land.copernicus.eu/api/", Index::Prepackaged);
        assert!(url.starts_with("https://land.copernicus.eu/api/@search?b_start=0"));
        assert!(url.ends_with("metadata_fields=downloadable_files"));
    }
}
