//! Copernicus Land Monitoring Service: catalog search and authenticated data requests.
pub mod auth;
pub mod catalog;
pub mod task;

pub use auth::{Credential, SessionToken};
pub use catalog::{CatalogItem, DownloadDescriptor, Index};
pub use task::{DataRequest, TaskHandle, TaskOrchestrator, TaskStatus, TaskStatusReport};

use crate::download::{self, DownloadRequest};
use crate::error::Result;
use reqwest::Client;
use std::path::{Path, PathBuf};

/// Where and how the finished data should land.
#[derive(Debug, Clone, Copy)]
pub struct Output<'a> {
    pub extract: bool,
    pub destination: &'a str,
    pub cwd: &'a Path,
}

/// Waits for `handle` to finish, then downloads and places its result.
pub async fn complete_download(
    client: &Client,
    orchestrator: &TaskOrchestrator<'_>,
    handle: &TaskHandle,
    output: Output<'_>,
) -> Result<Vec<PathBuf>> {
    let finished = orchestrator.wait_for_completion(handle).await?;
    let target = finished.target_filename()?;

    download::download_file(
        client,
        &DownloadRequest {
            url: &finished.download_url,
            target_filename: &target,
            extract: output.extract,
            destination: output.destination,
            cwd: output.cwd,
        },
    )
    .await
}

/// Submits `request`, then follows it through to placed files.
pub async fn fetch_data(
    client: &Client,
    orchestrator: &TaskOrchestrator<'_>,
    request: &DataRequest,
    output: Output<'_>,
) -> Result<Vec<PathBuf>> {
    let handle = orchestrator.submit(request).await?;
    complete_download(client, orchestrator, &handle, output).await
}
