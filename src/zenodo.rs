use crate::download::{self, DownloadRequest};
use crate::error::{Error, Result};
use crate::http;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Creator {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct RecordMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub publication_date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub license: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct RecordFile {
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub links: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Record {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub metadata: RecordMetadata,
    #[serde(default)]
    pub files: Vec<RecordFile>,
}

pub async fn fetch_record(client: &Client, api_url: &str, record_id: &str) -> Result<Record> {
    let url = format!("{api_url}records/{record_id}");
    http::get_json(client, &url, http::accept_json()).await
}

/// Picks the file to download from `record`: the one whose key is `filename`,
/// or the first downloadable file when `filename` is empty. Returns the target
/// name (the key's base name) and its download URL.
pub fn select_file<'a>(record: &'a Record, filename: &str) -> Result<(String, &'a str)> {
    if record.files.is_empty() {
        return Err(Error::Protocol("record has no files".to_string()));
    }

    let (file, url) = record
        .files
        .iter()
        .filter(|file| filename.is_empty() || file.key == filename)
        .find_map(|file| Some((file, file.links.get("self")?.as_str())))
        .ok_or_else(|| Error::Protocol("no download URL found".to_string()))?;

    let target = Path::new(&file.key)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Protocol("download has no name".to_string()))?;
    Ok((target, url))
}

pub async fn fetch_data(
    client: &Client,
    api_url: &str,
    record_id: &str,
    filename: &str,
    extract: bool,
    output: &str,
    cwd: &Path,
) -> Result<Vec<PathBuf>> {
    let record = fetch_record(client, api_url, record_id).await?;
    let (target, url) = select_file(&record, filename)?;

    download::download_file(
        client,
        &DownloadRequest {
            url,
            target_filename: &target,
            extract,
            destination: output,
            cwd,
        },
    )
    .await
}

/// Renders a byte count the way the record listing shows it, e.g. `1.5 Mb`.
pub fn human_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["b", "Kb", "Mb", "Gb", "Tb"];
    let mut count = size as f64;
    let mut unit = 0;
    while unit < UNITS.len() - 1 && count >= 1024.0 {
        count /= 1024.0;
        unit += 1;
    }
    format!("{count:.1} {}", UNITS[unit])
}
