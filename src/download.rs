use crate::error::{Error, Result};
use crate::extract;
use crate::placement;
use futures_util::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const STAGING_PREFIX: &str = "reclaimer-";
const EXTRACTED_DIR: &str = "extracted";

/// One remote file to materialize on disk.
#[derive(Debug, Clone)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    pub target_filename: &'a str,
    pub extract: bool,
    /// File or directory to place the result at; empty means `cwd`.
    pub destination: &'a str,
    pub cwd: &'a Path,
}

/// Private scratch directory for one download. Removed when dropped, whether
/// the pipeline succeeded or not.
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new() -> Result<Self> {
        Self::new_in(std::env::temp_dir())
    }

    pub fn new_in<P: AsRef<Path>>(root: P) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir_in(root)?;
        debug!(path = %dir.path().display(), "created staging area");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Streams `url` into `path`, returning the number of bytes written.
pub async fn fetch_to_file(client: &Client, url: &str, path: &Path) -> Result<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::transport(url, e))?;
    let response = crate::http::expect_status(url, response, StatusCode::OK).await?;

    let mut file = File::create(path)?;
    let mut body = response.bytes_stream();
    let mut byte_count = 0_u64;
    while let Some(bytes) = body.try_next().await.map_err(|e| Error::transport(url, e))? {
        file.write_all(&bytes)?;
        byte_count += bytes.len() as u64;
    }
    file.sync_all()?;
    Ok(byte_count)
}

/// Downloads, optionally extracts, and places a single remote file.
///
/// Extraction only happens for `.zip` targets; for anything else the flag is
/// ignored with a warning. Nothing is written to the destination until the
/// download (and extraction) has finished in the staging area.
pub async fn download_file(client: &Client, request: &DownloadRequest<'_>) -> Result<Vec<PathBuf>> {
    download_file_in(client, request, &std::env::temp_dir()).await
}

/// [`download_file`], staging under `staging_root` instead of the system
/// temporary directory.
pub async fn download_file_in(
    client: &Client,
    request: &DownloadRequest<'_>,
    staging_root: &Path,
) -> Result<Vec<PathBuf>> {
    if request.url.is_empty() {
        return Err(Error::Protocol("no download URL provided".to_string()));
    }
    if request.target_filename.is_empty() {
        return Err(Error::Protocol("download has no name".to_string()));
    }

    let staging = StagingArea::new_in(staging_root)?;
    let archive_path = staging.path().join(request.target_filename);

    info!(url = %request.url, "downloading data...");
    let byte_count = fetch_to_file(client, request.url, &archive_path).await?;
    info!(bytes = byte_count, "download complete");

    let is_zip = extract::is_zip(request.target_filename);
    if request.extract && !is_zip {
        warn!(
            name = %request.target_filename,
            "ignoring extract argument as the download is not a zip archive"
        );
    }

    if request.extract && is_zip {
        let extracted_dir = staging.path().join(EXTRACTED_DIR);
        let produced = {
            let archive_path = archive_path.clone();
            let extracted_dir = extracted_dir.clone();
            tokio::task::spawn_blocking(move || extract::extract(&archive_path, &extracted_dir))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(format!("extraction task failed: {e}"))))??
        };
        placement::place(&extracted_dir, &produced, request.destination, request.cwd)
    } else {
        let produced = [PathBuf::from(request.target_filename)];
        placement::place(staging.path(), &produced, request.destination, request.cwd)
    }
}
